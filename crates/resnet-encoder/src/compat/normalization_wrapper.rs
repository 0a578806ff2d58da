//! # Feature Map Normalization
//!
//! Every conv in the encoder is followed by one of the ``burn::nn``
//! channel norms over ``[batch, channels, height, width]``:
//! * [`NormalizationConfig::Batch`] - [`BatchNorm`]
//! * [`NormalizationConfig::Group`] - [`GroupNorm`], the default
//! * [`NormalizationConfig::Instance`] - [`InstanceNorm`]
//!
//! Norm policies are chosen before channel counts are known; a policy is
//! fitted to its conv with [`NormalizationConfig::with_num_features`],
//! which also re-derives the group count (see [`default_group_count`]).

use crate::errors::{EncoderConfigError, expect_ok};
use burn::nn::{
    BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig, InstanceNorm, InstanceNormConfig,
};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Upper bound on derived group counts.
pub const MAX_NORM_GROUPS: usize = 32;

/// Group count for a group norm over `num_features` channels.
///
/// ``min(32, num_features / 4)``; zero below 4 features, which
/// [`NormalizationConfig::try_validate`] rejects.
pub fn default_group_count(num_features: usize) -> usize {
    (num_features / 4).min(MAX_NORM_GROUPS)
}

/// [`Normalization`] Config.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum NormalizationConfig {
    /// Batch statistics.
    Batch(BatchNormConfig),

    /// Per-sample statistics over channel groups.
    Group(GroupNormConfig),

    /// Per-sample, per-channel statistics.
    Instance(InstanceNormConfig),
}

impl Default for NormalizationConfig {
    /// Group norm; sized by [`NormalizationConfig::with_num_features`].
    fn default() -> Self {
        Self::Group(GroupNormConfig::new(0, 0))
    }
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl From<InstanceNormConfig> for NormalizationConfig {
    fn from(config: InstanceNormConfig) -> Self {
        Self::Instance(config)
    }
}

impl NormalizationConfig {
    /// Initialize the norm layer.
    ///
    /// # Panics
    ///
    /// If [`NormalizationConfig::try_validate`] fails.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        expect_ok(self.try_validate());
        match self {
            Self::Batch(config) => Normalization::Batch(config.init(device)),
            Self::Group(config) => Normalization::Group(config.init(device)),
            Self::Instance(config) => Normalization::Instance(config.init(device)),
        }
    }

    /// Fit the config to `num_features` channels.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            Self::Batch(mut config) => {
                config.num_features = num_features;
                Self::Batch(config)
            }
            Self::Group(mut config) => {
                config.num_channels = num_features;
                config.num_groups = default_group_count(num_features);
                Self::Group(config)
            }
            Self::Instance(mut config) => {
                config.num_channels = num_features;
                Self::Instance(config)
            }
        }
    }

    /// The normalized channel count.
    pub fn num_features(&self) -> usize {
        match self {
            Self::Batch(config) => config.num_features,
            Self::Group(config) => config.num_channels,
            Self::Instance(config) => config.num_channels,
        }
    }

    /// Check that the fitted config can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        let features = self.num_features();
        if features == 0 {
            return Err(EncoderConfigError::ZeroParameter("normalization features"));
        }
        match self {
            Self::Group(config) if config.num_groups == 0 => {
                Err(EncoderConfigError::GroupNormTooNarrow { features })
            }
            Self::Group(config) if features % config.num_groups != 0 => {
                Err(EncoderConfigError::GroupNormIndivisible {
                    features,
                    groups: config.num_groups,
                })
            }
            _ => Ok(()),
        }
    }
}

/// A channel norm layer; see [`NormalizationConfig`].
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Normalization<B: Backend> {
    /// [`BatchNorm`] over 2d feature maps.
    Batch(BatchNorm<B, 2>),

    /// [`GroupNorm`].
    Group(GroupNorm<B>),

    /// [`InstanceNorm`].
    Instance(InstanceNorm<B>),
}

impl<B: Backend> Normalization<B> {
    /// Forward Pass.
    ///
    /// Normalizes over dim 1; the output has the input shape.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Self::Batch(layer) => layer.forward(input),
            Self::Group(layer) => layer.forward(input),
            Self::Instance(layer) => layer.forward(input),
        }
    }

    /// The normalized channel count.
    pub fn num_features(&self) -> usize {
        match self {
            Self::Batch(layer) => layer.gamma.dims()[0],
            Self::Group(layer) => layer.num_channels,
            Self::Instance(layer) => layer.num_channels,
        }
    }

    /// Zero the affine scale; the layer then emits its shift, ``beta``.
    pub fn zero_init_gamma(self) -> Self {
        match self {
            Self::Batch(mut layer) => {
                layer.gamma = layer.gamma.map(|gamma| gamma.zeros_like());
                Self::Batch(layer)
            }
            Self::Group(mut layer) => {
                layer.gamma = layer.gamma.map(|p| p.map(|gamma| gamma.zeros_like()));
                Self::Group(layer)
            }
            Self::Instance(mut layer) => {
                layer.gamma = layer.gamma.map(|p| p.map(|gamma| gamma.zeros_like()));
                Self::Instance(layer)
            }
        }
    }
}
