//! # Identity Block for `ResNet`
//!
//! An [`IdentityBlock`] keeps only the skip path of a [`super::basic_block::BasicBlock`]:
//!
//! ```text
//! act(downsample(x) or x)
//! ```
//!
//! Stacking identity blocks yields a shape-compatible encoder with no
//! residual branches; it is the ablation baseline for the basic encoder.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{EncoderConfigError, expect_ok};
use crate::models::resnet::basic_block::check_basic_block_support;
use crate::models::resnet::downsample::{
    ConvDownsample, ConvDownsampleConfig, ConvDownsampleMeta,
};
use crate::models::resnet::util::stride_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`IdentityBlock`] Meta trait.
pub trait IdentityBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_planes(&self) -> usize;

    /// The stride of the skip path.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`IdentityBlock`] Config.
#[derive(Config, Debug)]
pub struct IdentityBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub planes: usize,

    /// The stride of the downsample layer.
    #[config(default = 1)]
    pub stride: usize,

    /// Dilation rate; must be 1.
    #[config(default = 1)]
    pub dilation: usize,

    /// Conv groups; must be 1.
    #[config(default = 1)]
    pub groups: usize,

    /// Base width; must be 64.
    #[config(default = 64)]
    pub base_width: usize,

    /// Downsample norm config.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The output activation; `None` for linear.
    #[config(default = "Some(ActivationConfig::Relu)")]
    pub last_activation: Option<ActivationConfig>,
}

impl IdentityBlockMeta for IdentityBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl IdentityBlockConfig {
    /// Does this block need a projection on the skip path?
    pub fn needs_downsample(&self) -> bool {
        self.stride != 1 || self.in_planes != self.out_planes()
    }

    /// Check that the config can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        check_basic_block_support(self.groups, self.base_width, self.dilation)?;
        if self.in_planes == 0 {
            return Err(EncoderConfigError::ZeroParameter("in_planes"));
        }
        if self.planes == 0 {
            return Err(EncoderConfigError::ZeroParameter("planes"));
        }
        if self.stride == 0 {
            return Err(EncoderConfigError::ZeroParameter("stride"));
        }
        if self.needs_downsample() {
            self.normalization
                .clone()
                .with_num_features(self.out_planes())
                .try_validate()?;
        }
        Ok(())
    }

    /// Initialize an [`IdentityBlock`].
    ///
    /// # Panics
    ///
    /// If the config fails [`IdentityBlockConfig::try_validate`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> IdentityBlock<B> {
        expect_ok(self.try_validate());

        let downsample = if self.needs_downsample() {
            Some(
                ConvDownsampleConfig::new(self.in_planes, self.out_planes())
                    .with_stride(self.stride)
                    .with_norm(self.normalization.clone())
                    .init(device),
            )
        } else {
            None
        };

        IdentityBlock {
            in_planes: self.in_planes,
            downsample,
            act: self.last_activation.as_ref().map(|act| act.init(device)),
        }
    }
}

/// Identity Block for `ResNet`.
#[derive(Module, Debug)]
pub struct IdentityBlock<B: Backend> {
    /// Input planes; only observable here when there is no downsample.
    pub in_planes: usize,

    /// Optional `DownSample` layer.
    pub downsample: Option<ConvDownsample<B>>,

    /// Output activation.
    pub act: Option<Activation<B>>,
}

impl<B: Backend> IdentityBlockMeta for IdentityBlock<B> {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        match &self.downsample {
            Some(downsample) => downsample.out_channels(),
            None => self.in_planes,
        }
    }

    fn stride(&self) -> usize {
        match &self.downsample {
            Some(downsample) => downsample.stride(),
            None => 1,
        }
    }
}

impl<B: Backend> IdentityBlock<B> {
    /// Forward Pass.
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

        let x = match &self.downsample {
            Some(downsample) => downsample.forward(input),
            None => input,
        };
        let x = match &self.act {
            Some(act) => act.forward(x),
            None => x,
        };

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

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_identity_block_config() {
        let config = IdentityBlockConfig::new(8, 16).with_stride(2);
        assert_eq!(config.in_planes(), 8);
        assert_eq!(config.out_planes(), 16);
        assert!(config.needs_downsample());
        assert_eq!(config.output_resolution([6, 5]), [3, 3]);
        assert_eq!(config.try_validate(), Ok(()));

        assert_eq!(
            IdentityBlockConfig::new(8, 8).with_dilation(2).try_validate(),
            Err(EncoderConfigError::UnsupportedBasicDilation(2))
        );
        assert_eq!(
            IdentityBlockConfig::new(8, 8).with_groups(2).try_validate(),
            Err(EncoderConfigError::UnsupportedBasicWidth {
                groups: 2,
                base_width: 64
            })
        );
    }

    #[test]
    fn test_identity_block_passthrough() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: IdentityBlock<B> = IdentityBlockConfig::new(4, 4).init(&device);
        assert!(block.downsample.is_none());
        assert_eq!(block.out_planes(), 4);
        assert_eq!(block.stride(), 1);

        let input: Tensor<B, 4> = Tensor::random([2, 4, 3, 3], Distribution::Default, &device);
        let output = block.forward(input.clone());
        output
            .to_data()
            .assert_eq(&burn::tensor::activation::relu(input).to_data(), true);
    }

    #[test]
    fn test_identity_block_downsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: IdentityBlock<B> = IdentityBlockConfig::new(4, 8)
            .with_stride(2)
            .init(&device);
        assert_eq!(block.in_planes(), 4);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 2);

        let output = block.forward(Tensor::ones([2, 4, 7, 7], &device));
        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 8),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }
}
