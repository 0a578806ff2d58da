//! # Skip Path Projection
//!
//! When a residual block changes stride or planes, the skip path is
//! projected with a strided 1x1 conv and a norm, without an activation.

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::EncoderConfigError;
use crate::layers::blocks::cna::{AbstractCNA2dConfig, CNA2d, CNA2dConfig, CNA2dMeta};
use crate::models::resnet::util::{conv1x1_config, stride_div_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ConvDownsample`] Meta API.
pub trait ConvDownsampleMeta {
    /// Input channels.
    fn in_channels(&self) -> usize;

    /// Output channels.
    fn out_channels(&self) -> usize;

    /// Projection stride.
    fn stride(&self) -> usize;

    /// ``ceil(input_resolution / stride)``.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`ConvDownsample`] Config.
#[derive(Config, Debug)]
pub struct ConvDownsampleConfig {
    /// Input channels.
    pub in_channels: usize,

    /// Output channels.
    pub out_channels: usize,

    /// Projection stride.
    #[config(default = 1)]
    pub stride: usize,

    /// Norm config; feature matched to `out_channels`.
    #[config(default = "NormalizationConfig::default()")]
    pub norm: NormalizationConfig,
}

impl ConvDownsampleMeta for ConvDownsampleConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ConvDownsampleConfig {
    /// The linear 1x1 conv / norm unit.
    pub fn to_cna(&self) -> CNA2dConfig {
        AbstractCNA2dConfig::new()
            .with_norm(self.norm.clone())
            .build_linear_config(conv1x1_config(
                self.in_channels,
                self.out_channels,
                self.stride,
            ))
    }

    /// Check that the config can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        if self.stride == 0 {
            return Err(EncoderConfigError::ZeroParameter("downsample stride"));
        }
        self.to_cna().try_validate()
    }

    /// Initialize a [`ConvDownsample`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvDownsample<B> {
        ConvDownsample {
            proj: self.to_cna().init(device),
        }
    }
}

/// Strided 1x1 conv / norm projection of the skip path.
#[derive(Module, Debug)]
pub struct ConvDownsample<B: Backend> {
    /// The linear conv / norm.
    pub proj: CNA2d<B>,
}

impl<B: Backend> ConvDownsampleMeta for ConvDownsample<B> {
    fn in_channels(&self) -> usize {
        self.proj.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.proj.out_channels()
    }

    fn stride(&self) -> usize {
        self.proj.stride()
    }
}

impl<B: Backend> ConvDownsample<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, ceil(in_height / stride), ceil(in_width / stride)]``
    pub fn forward(
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

        let x = self.proj.forward(input);
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
}
