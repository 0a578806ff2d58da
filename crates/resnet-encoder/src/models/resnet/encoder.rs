//! # `ResNet` Encoder
//!
//! [`ResNetEncoder`] is the configurable `ResNet` feature extraction backbone.
//!
//! [`ResNetEncoderConfig`] implements [`Config`], and provides a high-level
//! hyperparameter interface. It provides [`ResNetEncoderConfig::to_structure`]
//! to lower to a [`ResNetEncoderStructureConfig`].
//!
//! [`ResNetEncoderStructureConfig`] implements [`Config`], and provides
//! [`ResNetEncoderStructureConfig::init`] to initialize a [`ResNetEncoder`].
//!
//! [`ResNetEncoder`] implements [`Module`], and provides
//! [`ResNetEncoder::forward`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{EncoderConfigError, expect_ok};
use crate::models::resnet::head::{FinalPool, Head, HeadConfig, HeadMeta};
use crate::models::resnet::layer_block::{
    LayerBlock, LayerBlockConfig, LayerBlockMeta, LayerSchedule,
};
use crate::models::resnet::output::BackboneOutput;
use crate::models::resnet::residual_block::{AbstractResidualBlockConfig, BlockKind};
use crate::models::resnet::stem::{Stem, StemConfig, StemMeta};
use bimm_contracts::unpack_shape_contract;
use burn::prelude::{Backend, Config, Module, Tensor};
use serde::{Deserialize, Serialize};

/// Maximum number of encoder stages.
pub const MAX_STAGES: usize = 4;

/// The activation after the residual sum of the final block of stage 4.
///
/// Only bottleneck encoders with all four stages use it; every other block
/// closes with relu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastActivation {
    /// `relu`.
    Relu,

    /// Linear output.
    None,

    /// `sigmoid`.
    Sigmoid,
}

impl LastActivation {
    /// The equivalent activation config.
    pub fn to_activation(&self) -> Option<ActivationConfig> {
        match self {
            Self::Relu => Some(ActivationConfig::Relu),
            Self::None => None,
            Self::Sigmoid => Some(ActivationConfig::Sigmoid),
        }
    }
}

/// High-level [`ResNetEncoder`] configuration.
#[derive(Config, Debug)]
pub struct ResNetEncoderConfig {
    /// The residual block kind.
    pub block: BlockKind,

    /// Blocks per stage; 1 to 4 stages.
    pub layers: Vec<usize>,

    /// Planes per stage; at least as long as `layers`.
    #[config(default = "vec![64, 128, 256, 512]")]
    pub filters: Vec<usize>,

    /// Stride per stage; at least as long as `layers`.
    #[config(default = "vec![1, 2, 2, 2]")]
    pub strides: Vec<usize>,

    /// Input image channels.
    #[config(default = 3)]
    pub num_channels: usize,

    /// Zero the last norm of each residual branch.
    #[config(default = false)]
    pub zero_init_residual: bool,

    /// Groups of the bottleneck 3x3 convs.
    #[config(default = 1)]
    pub groups: usize,

    /// Multiplier on every filter width, stem included.
    #[config(default = 1)]
    pub widen: usize,

    /// Bottleneck base width.
    #[config(default = 64)]
    pub width_per_group: usize,

    /// Replace the stride of stages 2, 3 and 4 with dilation.
    ///
    /// Empty, or exactly 3 entries.
    #[config(default = "Vec::new()")]
    pub replace_stride_with_dilation: Vec<bool>,

    /// Norm policy for every norm layer.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation closing stage 4 of a bottleneck encoder.
    #[config(default = "LastActivation::Relu")]
    pub last_activation: LastActivation,

    /// Apply the stem max pool.
    #[config(default = true)]
    pub initial_maxpool: bool,

    /// The head pool.
    #[config(default = "FinalPool::AvgPool")]
    pub final_pool: FinalPool,

    /// Keep ``[batch, channels, height, width]`` output.
    #[config(default = false)]
    pub spatial_output: bool,

    /// Pad the input with a one pixel zero border.
    #[config(default = true)]
    pub initial_padding: bool,
}

impl ResNetEncoderConfig {
    /// The number of stages.
    pub fn num_stages(&self) -> usize {
        self.layers.len()
    }

    /// Stage `idx` replaces its stride with dilation.
    pub fn dilates_stage(
        &self,
        idx: usize,
    ) -> bool {
        idx > 0
            && self
                .replace_stride_with_dilation
                .get(idx - 1)
                .copied()
                .unwrap_or(false)
    }

    /// The output channels of the encoder.
    ///
    /// Assumes a valid config.
    pub fn out_channels(&self) -> usize {
        match self.final_pool {
            FinalPool::Conv1x1 { out_channels } => out_channels,
            _ => self.filters[self.num_stages() - 1] * self.widen * self.block.expansion(),
        }
    }

    /// Check the hyperparameters; does not check the lowered structure.
    fn try_validate_shallow(&self) -> Result<(), EncoderConfigError> {
        let stages = self.num_stages();
        if stages == 0 || stages > MAX_STAGES {
            return Err(EncoderConfigError::InvalidStageCount(stages));
        }
        for (name, list_len) in [("filters", self.filters.len()), ("strides", self.strides.len())]
        {
            if list_len < stages {
                return Err(EncoderConfigError::StageListTooShort {
                    name,
                    expected: stages,
                    actual: list_len,
                });
            }
        }
        if !(self.replace_stride_with_dilation.is_empty()
            || self.replace_stride_with_dilation.len() == MAX_STAGES - 1)
        {
            return Err(EncoderConfigError::MalformedDilationReplacement(
                self.replace_stride_with_dilation.clone(),
            ));
        }
        if let Some(stage) = self.layers.iter().position(|&n| n == 0) {
            return Err(EncoderConfigError::EmptyStage { stage });
        }
        if self.filters[..stages].contains(&0) {
            return Err(EncoderConfigError::ZeroParameter("filters"));
        }
        if self.strides[..stages].contains(&0) {
            return Err(EncoderConfigError::ZeroParameter("strides"));
        }
        if self.widen == 0 {
            return Err(EncoderConfigError::ZeroParameter("widen"));
        }
        Ok(())
    }

    /// Check that the config can be lowered and initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        self.try_to_structure()?.try_validate()
    }

    /// Lower to a [`ResNetEncoderStructureConfig`].
    pub fn try_to_structure(&self) -> Result<ResNetEncoderStructureConfig, EncoderConfigError> {
        self.try_validate_shallow()?;

        let stem = StemConfig::new(self.num_channels, self.filters[0] * self.widen)
            .with_initial_padding(self.initial_padding)
            .with_initial_maxpool(self.initial_maxpool)
            .with_normalization(self.normalization.clone());

        let policy = AbstractResidualBlockConfig::new(self.block)
            .with_groups(self.groups)
            .with_base_width(self.width_per_group)
            .with_normalization(self.normalization.clone())
            .with_zero_init_residual(self.zero_init_residual);

        let stages = self.num_stages();
        let mut in_planes = stem.out_channels();
        let mut dilation = 1;
        let mut layers = Vec::with_capacity(stages);
        for idx in 0..stages {
            let schedule = LayerSchedule {
                num_blocks: self.layers[idx],
                in_planes,
                planes: self.filters[idx] * self.widen,
                stride: self.strides[idx],
                previous_dilation: dilation,
                dilate: self.dilates_stage(idx),
            };
            let last_activation = if idx == MAX_STAGES - 1 {
                self.last_activation.to_activation()
            } else {
                Some(ActivationConfig::Relu)
            };

            let (layer, next_dilation) =
                LayerBlockConfig::build(&schedule, &policy, last_activation);

            in_planes = layer.out_planes();
            dilation = next_dilation;
            layers.push(layer);
        }

        let head = HeadConfig::new(in_planes)
            .with_final_pool(self.final_pool)
            .with_spatial_output(self.spatial_output);

        Ok(ResNetEncoderStructureConfig::new(stem, layers, head))
    }

    /// Lower to a [`ResNetEncoderStructureConfig`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn to_structure(&self) -> ResNetEncoderStructureConfig {
        expect_ok(self.try_to_structure())
    }

    /// Initialize a [`ResNetEncoder`].
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ResNetEncoder<B>, EncoderConfigError> {
        self.try_to_structure()?.try_init(device)
    }

    /// Initialize a [`ResNetEncoder`].
    ///
    /// # Panics
    ///
    /// If the config is invalid; with the [`EncoderConfigError`] message.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNetEncoder<B> {
        expect_ok(self.try_init(device))
    }
}

/// [`ResNetEncoder`] Structure Config.
///
/// This config defines the structure of a lowered encoder.
#[derive(Config, Debug)]
pub struct ResNetEncoderStructureConfig {
    /// The input stem.
    pub stem: StemConfig,

    /// The stages.
    pub layers: Vec<LayerBlockConfig>,

    /// The head.
    pub head: HeadConfig,
}

impl ResNetEncoderStructureConfig {
    /// The output channels of the encoder.
    pub fn out_channels(&self) -> usize {
        self.head.out_channels()
    }

    /// Check that the stages chain, and that every part can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        if self.layers.is_empty() || self.layers.len() > MAX_STAGES {
            return Err(EncoderConfigError::InvalidStageCount(self.layers.len()));
        }

        self.stem.try_validate()?;
        for layer in &self.layers {
            layer.try_validate()?;
        }
        self.head.try_validate()?;

        if self.stem.out_channels() != self.layers[0].in_planes() {
            return Err(EncoderConfigError::StemMismatch {
                stem_out: self.stem.out_channels(),
                layer_in: self.layers[0].in_planes(),
            });
        }
        for idx in 1..self.layers.len() {
            let prev = &self.layers[idx - 1];
            let curr = &self.layers[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(EncoderConfigError::PlaneMismatch {
                    what: "layer",
                    prev: idx - 1,
                    out_planes: prev.out_planes(),
                    next: idx,
                    in_planes: curr.in_planes(),
                });
            }
        }
        let body_out = self.layers[self.layers.len() - 1].out_planes();
        if self.head.in_channels() != body_out {
            return Err(EncoderConfigError::HeadMismatch {
                expected: self.head.in_channels(),
                actual: body_out,
            });
        }
        Ok(())
    }

    /// Initialize a [`ResNetEncoder`].
    pub fn try_init<B: Backend>(
        self,
        device: &B::Device,
    ) -> Result<ResNetEncoder<B>, EncoderConfigError> {
        self.try_validate()?;

        tracing::debug!(
            in_channels = self.stem.in_channels(),
            stem_channels = self.stem.out_channels(),
            out_channels = self.out_channels(),
            stages = self.layers.len(),
            "initializing resnet encoder"
        );
        for (idx, layer) in self.layers.iter().enumerate() {
            tracing::debug!(
                stage = idx,
                blocks = layer.len(),
                in_planes = layer.in_planes(),
                out_planes = layer.out_planes(),
                stride = layer.stride(),
                "resnet encoder stage"
            );
        }

        Ok(ResNetEncoder {
            stem: self.stem.init(device),
            layers: self
                .layers
                .into_iter()
                .map(|layer| layer.init(device))
                .collect(),
            head: self.head.init(device),
        })
    }

    /// Initialize a [`ResNetEncoder`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNetEncoder<B> {
        expect_ok(self.try_init(device))
    }
}

/// `ResNet` encoder backbone.
#[derive(Module, Debug)]
pub struct ResNetEncoder<B: Backend> {
    /// The input stem.
    pub stem: Stem<B>,

    /// The stages.
    pub layers: Vec<LayerBlock<B>>,

    /// The head.
    pub head: Head<B>,
}

impl<B: Backend> ResNetEncoder<B> {
    /// Input image channels.
    pub fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    /// Output feature channels.
    pub fn out_channels(&self) -> usize {
        self.head.out_channels()
    }

    /// Does the encoder produce [`BackboneOutput::Spatial`]?
    pub fn spatial_output(&self) -> bool {
        self.head.spatial_output()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]`` of [`ResNetEncoder::forward_features`].
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let res = self.stem.output_resolution(input_resolution);
        let res = self
            .layers
            .iter()
            .fold(res, |res, layer| layer.output_resolution(res));
        self.head.output_resolution(res)
    }

    /// The encoder feature map, before flattening.
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
        let [_batch] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.stem.forward(input);
        let x = self.layers.iter().fold(x, |x, layer| layer.forward(x));
        self.head.forward_features(x)
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// [`BackboneOutput::Spatial`] ``[batch, out_channels, out_height, out_width]``
    /// if the encoder has spatial output; otherwise
    /// [`BackboneOutput::Flat`] ``[batch, out_channels * out_height * out_width]``.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> BackboneOutput<B> {
        self.head.to_output(self.forward_features(input))
    }
}
