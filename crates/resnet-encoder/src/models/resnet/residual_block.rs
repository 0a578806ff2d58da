//! # Residual Block Wrapper
//!
//! [`ResidualBlock`] dispatches over the three `ResNet` unit kinds;
//! [`BlockKind`] names them in high-level configs, and
//! [`AbstractResidualBlockConfig`] carries the policy shared by every
//! block of an encoder.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{EncoderConfigError, expect_ok};
use crate::models::resnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::resnet::bottleneck::{
    BOTTLENECK_EXPANSION, BottleneckBlock, BottleneckBlockConfig, BottleneckBlockMeta,
};
use crate::models::resnet::identity_block::{
    IdentityBlock, IdentityBlockConfig, IdentityBlockMeta,
};
use crate::models::resnet::util::stride_div_output_resolution;
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};
use serde::{Deserialize, Serialize};

/// The kind of residual unit an encoder is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// [`BasicBlock`]; two 3x3 convs.
    Basic,

    /// [`BottleneckBlock`]; 1x1, 3x3, 1x1 convs.
    Bottleneck,

    /// [`IdentityBlock`]; skip path only.
    Identity,
}

impl BlockKind {
    /// Output planes per configured plane.
    pub fn expansion(&self) -> usize {
        match self {
            Self::Basic | Self::Identity => 1,
            Self::Bottleneck => BOTTLENECK_EXPANSION,
        }
    }

    /// Does the block close with a configurable activation?
    ///
    /// Basic and identity blocks always close with relu.
    pub fn has_configurable_last_activation(&self) -> bool {
        matches!(self, Self::Bottleneck)
    }
}

/// [`ResidualBlock`] Meta API.
pub trait ResidualBlockMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// The stride of the block.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
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
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// Block policy shared by every block of an encoder.
///
/// Lifted to a concrete [`ResidualBlockConfig`] by
/// [`AbstractResidualBlockConfig::build_config`].
#[derive(Config, Debug)]
pub struct AbstractResidualBlockConfig {
    /// The block kind.
    pub kind: BlockKind,

    /// Groups of the bottleneck 3x3 conv.
    #[config(default = 1)]
    pub groups: usize,

    /// Base width of the bottleneck.
    #[config(default = 64)]
    pub base_width: usize,

    /// Norm policy; feature matched per layer.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// Zero the last norm of each residual branch.
    #[config(default = false)]
    pub zero_init_residual: bool,
}

impl AbstractResidualBlockConfig {
    /// Build a concrete block.
    ///
    /// `last_activation` is only taken by kinds with
    /// [`BlockKind::has_configurable_last_activation`]; the others get relu.
    pub fn build_config(
        &self,
        in_planes: usize,
        planes: usize,
        stride: usize,
        dilation: usize,
        last_activation: Option<ActivationConfig>,
    ) -> ResidualBlockConfig {
        let last_activation = if self.kind.has_configurable_last_activation() {
            last_activation
        } else {
            Some(ActivationConfig::Relu)
        };
        match self.kind {
            BlockKind::Basic => BasicBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .with_dilation(dilation)
                .with_groups(self.groups)
                .with_base_width(self.base_width)
                .with_normalization(self.normalization.clone())
                .with_last_activation(last_activation)
                .with_zero_init_residual(self.zero_init_residual)
                .into(),
            BlockKind::Bottleneck => BottleneckBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .with_dilation(dilation)
                .with_groups(self.groups)
                .with_base_width(self.base_width)
                .with_normalization(self.normalization.clone())
                .with_last_activation(last_activation)
                .with_zero_init_residual(self.zero_init_residual)
                .into(),
            BlockKind::Identity => IdentityBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .with_dilation(dilation)
                .with_groups(self.groups)
                .with_base_width(self.base_width)
                .with_normalization(self.normalization.clone())
                .with_last_activation(last_activation)
                .into(),
        }
    }
}

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub enum ResidualBlockConfig {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlockConfig),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlockConfig),

    /// A skip-path-only [`IdentityBlock`].
    Identity(IdentityBlockConfig),
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.in_planes(),
            Self::Bottleneck(config) => config.in_planes(),
            Self::Identity(config) => config.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.out_planes(),
            Self::Bottleneck(config) => config.out_planes(),
            Self::Identity(config) => config.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(config) => config.stride(),
            Self::Bottleneck(config) => config.stride(),
            Self::Identity(config) => config.stride(),
        }
    }
}

impl From<BasicBlockConfig> for ResidualBlockConfig {
    fn from(config: BasicBlockConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckBlockConfig> for ResidualBlockConfig {
    fn from(config: BottleneckBlockConfig) -> Self {
        Self::Bottleneck(config)
    }
}

impl From<IdentityBlockConfig> for ResidualBlockConfig {
    fn from(config: IdentityBlockConfig) -> Self {
        Self::Identity(config)
    }
}

impl ResidualBlockConfig {
    /// The [`BlockKind`] of this config.
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Basic(_) => BlockKind::Basic,
            Self::Bottleneck(_) => BlockKind::Bottleneck,
            Self::Identity(_) => BlockKind::Identity,
        }
    }

    /// Check that the config can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        match self {
            Self::Basic(config) => config.try_validate(),
            Self::Bottleneck(config) => config.try_validate(),
            Self::Identity(config) => config.try_validate(),
        }
    }

    /// Initialize a [`ResidualBlock`].
    ///
    /// # Panics
    ///
    /// If the config fails [`ResidualBlockConfig::try_validate`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        expect_ok(self.try_validate());
        match self {
            Self::Basic(config) => config.clone().init(device).into(),
            Self::Bottleneck(config) => config.clone().init(device).into(),
            Self::Identity(config) => config.clone().init(device).into(),
        }
    }
}

/// A `ResNet` [`BasicBlock`], [`BottleneckBlock`] or [`IdentityBlock`] wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlock<B>),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlock<B>),

    /// A skip-path-only [`IdentityBlock`].
    Identity(IdentityBlock<B>),
}

impl<B: Backend> From<BasicBlock<B>> for ResidualBlock<B> {
    fn from(block: BasicBlock<B>) -> Self {
        Self::Basic(block)
    }
}

impl<B: Backend> From<BottleneckBlock<B>> for ResidualBlock<B> {
    fn from(block: BottleneckBlock<B>) -> Self {
        Self::Bottleneck(block)
    }
}

impl<B: Backend> From<IdentityBlock<B>> for ResidualBlock<B> {
    fn from(block: IdentityBlock<B>) -> Self {
        Self::Identity(block)
    }
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.in_planes(),
            Self::Bottleneck(block) => block.in_planes(),
            Self::Identity(block) => block.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.out_planes(),
            Self::Bottleneck(block) => block.out_planes(),
            Self::Identity(block) => block.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(block) => block.stride(),
            Self::Bottleneck(block) => block.stride(),
            Self::Identity(block) => block.stride(),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
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
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
            Self::Identity(block) => block.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_block_kind() {
        assert_eq!(BlockKind::Basic.expansion(), 1);
        assert_eq!(BlockKind::Identity.expansion(), 1);
        assert_eq!(BlockKind::Bottleneck.expansion(), 4);

        assert!(BlockKind::Bottleneck.has_configurable_last_activation());
        assert!(!BlockKind::Basic.has_configurable_last_activation());
        assert!(!BlockKind::Identity.has_configurable_last_activation());
    }

    #[test]
    fn test_abstract_build_config() {
        let policy = AbstractResidualBlockConfig::new(BlockKind::Bottleneck)
            .with_zero_init_residual(true);

        let config = policy.build_config(64, 32, 2, 1, None);
        assert_eq!(config.kind(), BlockKind::Bottleneck);
        assert_eq!(config.in_planes(), 64);
        assert_eq!(config.out_planes(), 128);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([7, 7]), [4, 4]);
        match &config {
            ResidualBlockConfig::Bottleneck(inner) => {
                assert!(inner.zero_init_residual);
                assert!(inner.last_activation.is_none());
            }
            _ => panic!("Unexpected config type"),
        }

        let config = AbstractResidualBlockConfig::new(BlockKind::Identity)
            .build_config(8, 8, 1, 1, Some(ActivationConfig::Sigmoid));
        assert_eq!(config.kind(), BlockKind::Identity);
        assert_eq!(config.out_planes(), 8);
    }

    #[test]
    fn test_last_activation_only_on_bottleneck() {
        for requested in [None, Some(ActivationConfig::Sigmoid)] {
            match AbstractResidualBlockConfig::new(BlockKind::Basic)
                .build_config(8, 8, 1, 1, requested.clone())
            {
                ResidualBlockConfig::Basic(inner) => {
                    assert_eq!(inner.last_activation, Some(ActivationConfig::Relu))
                }
                _ => panic!("Unexpected config type"),
            }
            match AbstractResidualBlockConfig::new(BlockKind::Identity)
                .build_config(8, 8, 1, 1, requested.clone())
            {
                ResidualBlockConfig::Identity(inner) => {
                    assert_eq!(inner.last_activation, Some(ActivationConfig::Relu))
                }
                _ => panic!("Unexpected config type"),
            }
            match AbstractResidualBlockConfig::new(BlockKind::Bottleneck)
                .build_config(8, 8, 1, 1, requested.clone())
            {
                ResidualBlockConfig::Bottleneck(inner) => {
                    assert_eq!(inner.last_activation, requested)
                }
                _ => panic!("Unexpected config type"),
            }
        }
    }

    #[test]
    fn test_try_validate_dispatch() {
        let config = AbstractResidualBlockConfig::new(BlockKind::Basic)
            .with_groups(2)
            .build_config(8, 8, 1, 1, None);
        assert_eq!(
            config.try_validate(),
            Err(EncoderConfigError::UnsupportedBasicWidth {
                groups: 2,
                base_width: 64
            })
        );

        let config = AbstractResidualBlockConfig::new(BlockKind::Bottleneck)
            .with_groups(2)
            .build_config(8, 8, 1, 2, None);
        assert_eq!(config.try_validate(), Ok(()));
    }

    #[test]
    fn test_residual_block_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        for kind in [BlockKind::Basic, BlockKind::Bottleneck, BlockKind::Identity] {
            let config = AbstractResidualBlockConfig::new(kind).build_config(
                16,
                8,
                2,
                1,
                Some(ActivationConfig::Relu),
            );
            let block: ResidualBlock<B> = config.init(&device);

            assert_eq!(block.in_planes(), 16);
            assert_eq!(block.out_planes(), 8 * kind.expansion());
            assert_eq!(block.stride(), 2);

            let output = block.forward(Tensor::ones([2, 16, 6, 6], &device));
            assert_shape_contract!(
                ["batch", "out_planes", "out_height", "out_width"],
                &output,
                &[
                    ("batch", 2),
                    ("out_planes", 8 * kind.expansion()),
                    ("out_height", 3),
                    ("out_width", 3)
                ],
            );
        }
    }
}
