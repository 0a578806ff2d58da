//! # Input Stem
//!
//! ```text
//! conv7x7(stride=2) -> norm -> relu -> [maxpool3x3(stride=2)]
//! ```
//!
//! The stem conv has padding 2; the optional one pixel zero border
//! ("initial padding") is folded into the conv as padding 3, which is
//! numerically identical to padding the input first.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::conv_shape::ConvWindow;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{EncoderConfigError, expect_ok};
use crate::layers::blocks::cna::{AbstractCNA2dConfig, CNA2d, CNA2dConfig, CNA2dMeta};
use crate::models::resnet::util::{CONV_INTO_RELU_INITIALIZER, scalar_to_array};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Stem conv kernel size.
pub const STEM_KERNEL_SIZE: usize = 7;

/// Stem conv stride.
pub const STEM_STRIDE: usize = 2;

/// Stem conv padding, without the initial border.
pub const STEM_PADDING: usize = 2;

/// The stem max pool window.
pub const STEM_POOL_WINDOW: ConvWindow = ConvWindow::new(3, 2).with_padding(1);

/// [`Stem`] Meta API.
pub trait StemMeta {
    /// Input image channels.
    fn in_channels(&self) -> usize;

    /// Output feature channels.
    fn out_channels(&self) -> usize;

    /// Effective conv padding.
    fn conv_padding(&self) -> usize;

    /// Is the max pool present?
    fn has_pool(&self) -> bool;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input is too small for the stem.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let res = ConvWindow::new(STEM_KERNEL_SIZE, STEM_STRIDE)
            .with_padding(self.conv_padding())
            .expect_output_resolution(input_resolution);
        if self.has_pool() {
            STEM_POOL_WINDOW.expect_output_resolution(res)
        } else {
            res
        }
    }
}

/// [`Stem`] Config.
#[derive(Config, Debug)]
pub struct StemConfig {
    /// Input image channels.
    pub in_channels: usize,

    /// Output feature channels.
    pub out_channels: usize,

    /// Pad the input with a one pixel zero border.
    #[config(default = true)]
    pub initial_padding: bool,

    /// Apply the 3x3, stride 2 max pool.
    #[config(default = true)]
    pub initial_maxpool: bool,

    /// Norm config; feature matched to `out_channels`.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,
}

impl StemMeta for StemConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn conv_padding(&self) -> usize {
        if self.initial_padding {
            STEM_PADDING + 1
        } else {
            STEM_PADDING
        }
    }

    fn has_pool(&self) -> bool {
        self.initial_maxpool
    }
}

impl StemConfig {
    /// The lowered conv/norm/act config.
    pub fn to_cna(&self) -> CNA2dConfig {
        let padding = self.conv_padding();
        AbstractCNA2dConfig::new()
            .with_norm(self.normalization.clone())
            .with_act(ActivationConfig::Relu)
            .build_config(
                Conv2dConfig::new(
                    [self.in_channels, self.out_channels],
                    scalar_to_array(STEM_KERNEL_SIZE),
                )
                .with_stride(scalar_to_array(STEM_STRIDE))
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_initializer(CONV_INTO_RELU_INITIALIZER)
                .with_bias(false),
            )
    }

    /// The lowered pool config, if any.
    pub fn to_pool(&self) -> Option<MaxPool2dConfig> {
        if self.initial_maxpool {
            Some(
                MaxPool2dConfig::new(scalar_to_array(STEM_POOL_WINDOW.kernel))
                    .with_strides(scalar_to_array(STEM_POOL_WINDOW.stride))
                    .with_padding(PaddingConfig2d::Explicit(
                        STEM_POOL_WINDOW.padding,
                        STEM_POOL_WINDOW.padding,
                    )),
            )
        } else {
            None
        }
    }

    /// Check that the config can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        if self.in_channels == 0 {
            return Err(EncoderConfigError::ZeroParameter("num_channels"));
        }
        self.to_cna().try_validate()
    }

    /// Initialize a [`Stem`].
    ///
    /// # Panics
    ///
    /// If the config fails [`StemConfig::try_validate`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Stem<B> {
        expect_ok(self.try_validate());
        Stem {
            conv_padding: self.conv_padding(),
            cna: self.to_cna().init(device),
            pool: self.to_pool().map(|pool| pool.init()),
        }
    }
}

/// `ResNet` input stem.
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    /// Effective conv padding.
    pub conv_padding: usize,

    /// The 7x7 conv/norm/relu.
    pub cna: CNA2d<B>,

    /// The optional max pool.
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> StemMeta for Stem<B> {
    fn in_channels(&self) -> usize {
        self.cna.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.cna.out_channels()
    }

    fn conv_padding(&self) -> usize {
        self.conv_padding
    }

    fn has_pool(&self) -> bool {
        self.pool.is_some()
    }
}

impl<B: Backend> Stem<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
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

        let x = self.cna.forward(input);
        let x = match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_stem_config() {
        let config = StemConfig::new(3, 64);
        assert_eq!(config.conv_padding(), 3);
        assert!(config.has_pool());
        assert_eq!(config.output_resolution([64, 64]), [16, 16]);
        assert_eq!(config.try_validate(), Ok(()));

        let config = config.with_initial_padding(false).with_initial_maxpool(false);
        assert_eq!(config.conv_padding(), 2);
        assert!(config.to_pool().is_none());
        assert_eq!(config.output_resolution([64, 64]), [31, 31]);

        assert_eq!(
            StemConfig::new(0, 64).try_validate(),
            Err(EncoderConfigError::ZeroParameter("num_channels"))
        );
        assert_eq!(
            StemConfig::new(3, 2).try_validate(),
            Err(EncoderConfigError::GroupNormTooNarrow { features: 2 })
        );
    }

    #[test]
    fn test_stem_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        for (initial_padding, initial_maxpool) in
            [(true, true), (true, false), (false, true), (false, false)]
        {
            let stem: Stem<B> = StemConfig::new(3, 16)
                .with_initial_padding(initial_padding)
                .with_initial_maxpool(initial_maxpool)
                .init(&device);

            assert_eq!(stem.in_channels(), 3);
            assert_eq!(stem.out_channels(), 16);
            assert_eq!(stem.has_pool(), initial_maxpool);
            assert_eq!(stem.conv_padding(), if initial_padding { 3 } else { 2 });

            let [out_height, out_width] = stem.output_resolution([33, 40]);

            let input = Tensor::random([2, 3, 33, 40], Distribution::Default, &device);
            let output = stem.forward(input);

            assert_shape_contract!(
                ["batch", "out_channels", "out_height", "out_width"],
                &output,
                &[
                    ("batch", 2),
                    ("out_channels", 16),
                    ("out_height", out_height),
                    ("out_width", out_width)
                ],
            );
        }
    }
}
