//! # Bottleneck Residual Block
//!
//! ```text
//! conv1x1 -> norm -> relu
//!   -> conv3x3(stride, groups, dilation) -> norm -> relu
//!   -> conv1x1 -> norm -> (+ skip) -> [act]
//! ```
//!
//! The inner width is ``planes * base_width / 64 * groups``; the output
//! is expanded to ``4 * planes`` channels. Wide variants raise
//! `base_width`, grouped (`ResNeXt` style) variants raise `groups`.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{EncoderConfigError, expect_ok};
use crate::layers::blocks::cna::{AbstractCNA2dConfig, CNA2d, CNA2dConfig, CNA2dMeta};
use crate::models::resnet::downsample::{ConvDownsample, ConvDownsampleConfig};
use crate::models::resnet::util::{
    conv1x1_config, conv3x3_config, stride_div_output_resolution,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Output expansion of the bottleneck block.
pub const BOTTLENECK_EXPANSION: usize = 4;

/// Shared shape queries for [`BottleneckBlock`] and [`BottleneckBlockConfig`].
pub trait BottleneckBlockMeta {
    /// Input channels.
    fn in_planes(&self) -> usize;

    /// Nominal width; scales the inner width and output channels.
    fn planes(&self) -> usize;

    /// Groups of the inner 3x3 conv.
    fn groups(&self) -> usize;

    /// Control factor for `width()`.
    fn base_width(&self) -> usize;

    /// Dilation rate of the inner 3x3 conv.
    fn dilation(&self) -> usize;

    /// Inner width of the bottleneck.
    ///
    /// ``planes * base_width / 64 * groups``
    fn width(&self) -> usize {
        self.planes() * self.base_width() / 64 * self.groups()
    }

    /// Output channels, ``planes * 4``.
    fn out_planes(&self) -> usize {
        self.planes() * BOTTLENECK_EXPANSION
    }

    /// Stride of the inner 3x3 conv and of the skip projection.
    fn stride(&self) -> usize;

    /// ``ceil([in_height, in_width] / stride)``.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`BottleneckBlock`] Config.
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// Input channels.
    pub in_planes: usize,

    /// Nominal width.
    pub planes: usize,

    /// The stride of the inner conv, and of the downsample layer.
    #[config(default = 1)]
    pub stride: usize,

    /// Dilation rate of the inner conv.
    #[config(default = 1)]
    pub dilation: usize,

    /// Groups of the inner conv.
    #[config(default = 1)]
    pub groups: usize,

    /// Base width used to determine the inner width.
    #[config(default = 64)]
    pub base_width: usize,

    /// Norm policy for every conv in the block.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// The activation applied after the residual sum; `None` for linear.
    #[config(default = "Some(ActivationConfig::Relu)")]
    pub last_activation: Option<ActivationConfig>,

    /// Zero the scale of the last norm, so the block starts as its skip path.
    #[config(default = false)]
    pub zero_init_residual: bool,
}

impl BottleneckBlockMeta for BottleneckBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn groups(&self) -> usize {
        self.groups
    }

    fn base_width(&self) -> usize {
        self.base_width
    }

    fn dilation(&self) -> usize {
        self.dilation
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BottleneckBlockConfig {
    /// Does this block need a projection on the skip path?
    pub fn needs_downsample(&self) -> bool {
        self.stride != 1 || self.in_planes != self.out_planes()
    }

    /// Check that the config can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        for (name, value) in [
            ("in_planes", self.in_planes),
            ("planes", self.planes),
            ("stride", self.stride),
            ("dilation", self.dilation),
            ("groups", self.groups),
        ] {
            if value == 0 {
                return Err(EncoderConfigError::ZeroParameter(name));
            }
        }
        let width = self.width();
        if width == 0 {
            return Err(EncoderConfigError::ZeroParameter("bottleneck width"));
        }
        for features in [width, self.out_planes()] {
            self.normalization
                .clone()
                .with_num_features(features)
                .try_validate()?;
        }
        Ok(())
    }

    /// Initialize a [`BottleneckBlock`].
    ///
    /// # Panics
    ///
    /// If the config fails [`BottleneckBlockConfig::try_validate`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        expect_ok(self.try_validate());

        let in_planes = self.in_planes();
        let width = self.width();
        let out_planes = self.out_planes();
        let stride = self.stride();

        let downsample = if self.needs_downsample() {
            Some(
                ConvDownsampleConfig::new(in_planes, out_planes)
                    .with_stride(stride)
                    .with_norm(self.normalization.clone()),
            )
        } else {
            None
        };

        let cna_builder = AbstractCNA2dConfig {
            norm: self.normalization.clone(),
            act: ActivationConfig::Relu,
        };

        let cna1: CNA2dConfig = cna_builder.build_config(conv1x1_config(in_planes, width, 1));

        let cna2: CNA2dConfig = cna_builder.build_config(conv3x3_config(
            width,
            width,
            stride,
            self.groups,
            self.dilation,
        ));

        let cna3: CNA2dConfig = cna_builder
            .build_config(conv1x1_config(width, out_planes, 1))
            .with_act(self.last_activation.clone());

        let cna3 = cna3.init(device);

        BottleneckBlock {
            downsample: downsample.as_ref().map(|cfg| cfg.init(device)),
            cna1: cna1.init(device),
            cna2: cna2.init(device),
            cna3: if self.zero_init_residual {
                cna3.zero_init_norm()
            } else {
                cna3
            },
        }
    }
}

/// Reduce / transform / expand convs around a residual sum.
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// Skip path projection, when shapes change.
    pub downsample: Option<ConvDownsample<B>>,

    /// 1x1 reduction to the inner width.
    pub cna1: CNA2d<B>,

    /// Strided, grouped, dilated 3x3.
    pub cna2: CNA2d<B>,

    /// 1x1 expansion; the skip is summed before its activation.
    pub cna3: CNA2d<B>,
}

impl<B: Backend> BottleneckBlockMeta for BottleneckBlock<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn planes(&self) -> usize {
        self.cna3.out_channels() / BOTTLENECK_EXPANSION
    }

    fn groups(&self) -> usize {
        self.cna2.groups()
    }

    fn base_width(&self) -> usize {
        self.width() * 64 / (self.planes() * self.groups())
    }

    fn dilation(&self) -> usize {
        self.cna2.dilation()
    }

    fn width(&self) -> usize {
        self.cna1.out_channels()
    }

    fn out_planes(&self) -> usize {
        self.cna3.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna2.stride()
    }
}

impl<B: Backend> BottleneckBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes=planes*4, out_height, out_width]`` tensor.
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

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cna1.forward(input);
        let x = self.cna2.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "width", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("width", self.width()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        let x = self.cna3.hook_forward(x, |x| x + identity);

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
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::BatchNormConfig;
    use burn::tensor::Distribution;

    #[test]
    fn test_bottleneck_config() {
        let config = BottleneckBlockConfig::new(64, 16);
        assert_eq!(config.in_planes(), 64);
        assert_eq!(config.width(), 16);
        assert_eq!(config.out_planes(), 64);
        assert_eq!(config.stride(), 1);
        assert!(!config.needs_downsample());
        assert_eq!(config.try_validate(), Ok(()));

        let config = config.with_groups(2).with_base_width(128).with_stride(2);
        assert_eq!(config.width(), 64);
        assert_eq!(config.out_planes(), 64);
        assert!(config.needs_downsample());
        assert_eq!(config.output_resolution([9, 9]), [5, 5]);

        assert_eq!(
            BottleneckBlockConfig::new(64, 16)
                .with_base_width(2)
                .try_validate(),
            Err(EncoderConfigError::ZeroParameter("bottleneck width"))
        );
        assert_eq!(
            BottleneckBlockConfig::new(8, 2).try_validate(),
            Err(EncoderConfigError::GroupNormTooNarrow { features: 2 })
        );
    }

    #[test]
    fn test_bottleneck_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(16, 8)
            .with_groups(2)
            .with_dilation(2)
            .init(&device);

        assert_eq!(block.in_planes(), 16);
        assert_eq!(block.planes(), 8);
        assert_eq!(block.width(), 16);
        assert_eq!(block.groups(), 2);
        assert_eq!(block.base_width(), 64);
        assert_eq!(block.dilation(), 2);
        assert_eq!(block.out_planes(), 32);
        assert_eq!(block.stride(), 1);
        assert!(block.downsample.is_some());
    }

    #[test]
    fn test_bottleneck_forward_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 16;
        let planes = 8;

        for (stride, dilation) in [(1, 1), (2, 1), (1, 2)] {
            let block: BottleneckBlock<B> = BottleneckBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .with_dilation(dilation)
                .with_normalization(BatchNormConfig::new(0).into())
                .init(&device);

            let [out_height, out_width] = block.output_resolution([7, 10]);

            let input = Tensor::random(
                [batch_size, in_planes, 7, 10],
                Distribution::Default,
                &device,
            );
            let output = block.forward(input);

            assert_shape_contract!(
                ["batch", "out_planes", "out_height", "out_width"],
                &output,
                &[
                    ("batch", batch_size),
                    ("out_planes", planes * 4),
                    ("out_height", out_height),
                    ("out_width", out_width)
                ],
            );
        }
    }

    #[test]
    fn test_bottleneck_zero_init_residual() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(32, 8)
            .with_zero_init_residual(true)
            .with_last_activation(Some(ActivationConfig::Sigmoid))
            .init(&device);
        assert!(block.downsample.is_none());

        let input: Tensor<B, 4> = Tensor::random([2, 32, 4, 4], Distribution::Default, &device);
        let output = block.forward(input.clone());
        output.to_data().assert_eq(
            &burn::tensor::activation::sigmoid(input).to_data(),
            true,
        );
    }
}
