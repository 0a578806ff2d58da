//! # Encoder Head
//!
//! ```text
//! [final pool] -> [flatten]
//! ```

use crate::errors::{EncoderConfigError, expect_ok};
use crate::models::resnet::output::BackboneOutput;
use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::{Backend, Config, Module, Tensor};
use serde::{Deserialize, Serialize};

/// The reduction applied to the final feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalPool {
    /// Adaptive average pool to ``1x1``.
    AvgPool,

    /// A ``1x1`` conv (with bias) to `out_channels`; resolution is kept.
    Conv1x1 {
        /// Output channels.
        out_channels: usize,
    },

    /// No pooling.
    Identity,
}

/// The final pool layer.
#[derive(Module, Debug)]
pub enum FinalPoolLayer<B: Backend> {
    /// Adaptive average pool to ``1x1``.
    AvgPool(AdaptiveAvgPool2d),

    /// ``1x1`` conv.
    Conv1x1(Conv2d<B>),
}

impl<B: Backend> FinalPoolLayer<B> {
    /// Apply the pool.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::AvgPool(pool) => pool.forward(input),
            Self::Conv1x1(conv) => conv.forward(input),
        }
    }
}

/// [`Head`] Meta API.
pub trait HeadMeta {
    /// Input feature channels.
    fn in_channels(&self) -> usize;

    /// Output feature channels.
    fn out_channels(&self) -> usize;

    /// Does the head pool to ``1x1``?
    fn pools_to_point(&self) -> bool;

    /// Is the output left spatial?
    fn spatial_output(&self) -> bool;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        if self.pools_to_point() {
            [1, 1]
        } else {
            input_resolution
        }
    }
}

/// [`Head`] Config.
#[derive(Config, Debug)]
pub struct HeadConfig {
    /// Input feature channels.
    pub in_channels: usize,

    /// The final pool.
    #[config(default = "FinalPool::AvgPool")]
    pub final_pool: FinalPool,

    /// Keep ``[batch, channels, height, width]`` output.
    #[config(default = false)]
    pub spatial_output: bool,
}

impl HeadMeta for HeadConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        match self.final_pool {
            FinalPool::Conv1x1 { out_channels } => out_channels,
            _ => self.in_channels,
        }
    }

    fn pools_to_point(&self) -> bool {
        self.final_pool == FinalPool::AvgPool
    }

    fn spatial_output(&self) -> bool {
        self.spatial_output
    }
}

impl HeadConfig {
    /// Check that the config can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        if self.in_channels == 0 {
            return Err(EncoderConfigError::ZeroParameter("head in_channels"));
        }
        if self.out_channels() == 0 {
            return Err(EncoderConfigError::ZeroParameter("final_pool out_channels"));
        }
        Ok(())
    }

    /// Initialize a [`Head`].
    ///
    /// # Panics
    ///
    /// If the config fails [`HeadConfig::try_validate`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Head<B> {
        expect_ok(self.try_validate());

        let pool = match self.final_pool {
            FinalPool::AvgPool => Some(FinalPoolLayer::AvgPool(
                AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            )),
            FinalPool::Conv1x1 { out_channels } => Some(FinalPoolLayer::Conv1x1(
                Conv2dConfig::new([self.in_channels, out_channels], [1, 1])
                    .with_padding(PaddingConfig2d::Explicit(0, 0))
                    .with_initializer(CONV_INTO_RELU_INITIALIZER)
                    .with_bias(true)
                    .init(device),
            )),
            FinalPool::Identity => None,
        };

        Head {
            in_channels: self.in_channels,
            out_channels: self.out_channels(),
            spatial_output: self.spatial_output,
            pool,
        }
    }
}

/// Encoder head; final pool and flattening.
#[derive(Module, Debug)]
pub struct Head<B: Backend> {
    /// Input feature channels.
    pub in_channels: usize,

    /// Output feature channels.
    pub out_channels: usize,

    /// Keep spatial output.
    pub spatial_output: bool,

    /// The optional final pool.
    pub pool: Option<FinalPoolLayer<B>>,
}

impl<B: Backend> HeadMeta for Head<B> {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn pools_to_point(&self) -> bool {
        matches!(self.pool, Some(FinalPoolLayer::AvgPool(_)))
    }

    fn spatial_output(&self) -> bool {
        self.spatial_output
    }
}

impl<B: Backend> Head<B> {
    /// Apply the pool, keeping the spatial layout.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = match &self.pool {
            Some(pool) => pool.forward(input),
            None => input,
        };

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }

    /// Forward Pass.
    ///
    /// # Returns
    ///
    /// [`BackboneOutput::Spatial`] if `spatial_output`, otherwise
    /// [`BackboneOutput::Flat`] ``[batch, out_channels * out_height * out_width]``.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> BackboneOutput<B> {
        self.to_output(self.forward_features(input))
    }

    /// Wrap [`Head::forward_features`] output; flattened unless `spatial_output`.
    pub fn to_output(
        &self,
        features: Tensor<B, 4>,
    ) -> BackboneOutput<B> {
        if self.spatial_output {
            BackboneOutput::Spatial(features)
        } else {
            BackboneOutput::Flat(features.flatten(1, 3))
        }
    }
}
