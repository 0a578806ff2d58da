//! # `ResNet` Layer Block
//!
//! A [`LayerBlock`] is a sequence of [`ResidualBlock`]s; one encoder stage.
//!
//! [`LayerBlockMeta`] defines a common meta API for [`LayerBlock`]
//! and [`LayerBlockConfig`].
//!
//! [`LayerBlockConfig`] implements [`Config`], and provides
//! [`LayerBlockConfig::init`] to initialize a [`LayerBlock`].
//!
//! [`LayerBlock`] implements [`Module`], and provides
//! [`LayerBlock::forward`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::errors::{EncoderConfigError, expect_ok};
use crate::models::resnet::residual_block::{
    AbstractResidualBlockConfig, ResidualBlock, ResidualBlockConfig, ResidualBlockMeta,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`LayerBlock`] Meta API.
pub trait LayerBlockMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the layer block is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the layers.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// Applies each block's resolution arithmetic in turn.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2];
}

/// Per-stage schedule for [`LayerBlockConfig::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSchedule {
    /// Number of blocks.
    pub num_blocks: usize,

    /// Input planes of the first block.
    pub in_planes: usize,

    /// Block planes; the output is ``planes * expansion``.
    pub planes: usize,

    /// Requested stage stride.
    pub stride: usize,

    /// Dilation in effect before this stage.
    pub previous_dilation: usize,

    /// Replace the stride of this stage with dilation.
    pub dilate: bool,
}

impl LayerSchedule {
    /// Resolve stride / dilation replacement.
    ///
    /// # Returns
    ///
    /// ``(stride, dilation)`` for the stage; when `dilate` is set,
    /// ``dilation = previous_dilation * stride`` and ``stride = 1``.
    pub fn effective_stride_and_dilation(&self) -> (usize, usize) {
        if self.dilate {
            (1, self.previous_dilation * self.stride)
        } else {
            (self.stride, self.previous_dilation)
        }
    }
}

/// [`LayerBlock`] Configuration.
#[derive(Config, Debug)]
pub struct LayerBlockConfig {
    /// The component blocks.
    pub blocks: Vec<ResidualBlockConfig>,
}

impl From<Vec<ResidualBlockConfig>> for LayerBlockConfig {
    fn from(blocks: Vec<ResidualBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl LayerBlockMeta for LayerBlockConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }

    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        self.blocks
            .iter()
            .fold(input_resolution, |res, block| block.output_resolution(res))
    }
}

impl LayerBlockConfig {
    /// Build a stage config.
    ///
    /// The first block carries the stride, any downsample, and the previous
    /// dilation; subsequent blocks have stride 1 and the stage dilation.
    /// Only the final block is offered `last_activation`; the rest use relu.
    ///
    /// # Returns
    ///
    /// ``(config, dilation)``; the dilation in effect after the stage.
    pub fn build(
        schedule: &LayerSchedule,
        policy: &AbstractResidualBlockConfig,
        last_activation: Option<ActivationConfig>,
    ) -> (Self, usize) {
        let (stride, dilation) = schedule.effective_stride_and_dilation();
        let out_planes = schedule.planes * policy.kind.expansion();
        let n = schedule.num_blocks;

        let act_for = |idx: usize| {
            if idx + 1 == n {
                last_activation.clone()
            } else {
                Some(ActivationConfig::Relu)
            }
        };

        let blocks = (0..n)
            .map(|idx| {
                if idx == 0 {
                    policy.build_config(
                        schedule.in_planes,
                        schedule.planes,
                        stride,
                        schedule.previous_dilation,
                        act_for(idx),
                    )
                } else {
                    policy.build_config(out_planes, schedule.planes, 1, dilation, act_for(idx))
                }
            })
            .collect();

        (Self { blocks }, dilation)
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        if self.is_empty() {
            return Err(EncoderConfigError::ZeroParameter("blocks"));
        }

        for block in &self.blocks {
            block.try_validate()?;
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(EncoderConfigError::PlaneMismatch {
                    what: "block",
                    prev: idx - 1,
                    out_planes: prev.out_planes(),
                    next: idx,
                    in_planes: curr.in_planes(),
                });
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        expect_ok(self.try_validate())
    }

    /// Initialize a new [`LayerBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> LayerBlock<B> {
        self.expect_valid();

        LayerBlock {
            blocks: self
                .blocks
                .into_iter()
                .map(|block| block.init(device))
                .collect(),
        }
    }
}

/// Layer block.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    /// Internal blocks.
    pub blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlockMeta for LayerBlock<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }

    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        self.blocks
            .iter()
            .fold(input_resolution, |res, block| block.output_resolution(res))
    }
}

impl<B: Backend> LayerBlock<B> {
    /// Apply the layer block.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}
