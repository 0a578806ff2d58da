//! # Two-conv Residual Block
//!
//! ```text
//! conv3x3(stride) -> norm -> relu -> conv3x3 -> norm -> (+ skip) -> [act]
//! ```
//!
//! The skip path is projected by a [`ConvDownsample`] when the block
//! changes stride or width. Only ``groups = 1``, ``base_width = 64`` and
//! ``dilation = 1`` are accepted.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::errors::{EncoderConfigError, expect_ok};
use crate::layers::blocks::cna::{AbstractCNA2dConfig, CNA2d, CNA2dConfig, CNA2dMeta};
use crate::models::resnet::downsample::{ConvDownsample, ConvDownsampleConfig};
use crate::models::resnet::util::{conv3x3_config, stride_div_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Reject widths and dilations which the basic 3x3 pair cannot express.
///
/// Shared by [`BasicBlockConfig`] and the identity block.
pub(crate) fn check_basic_block_support(
    groups: usize,
    base_width: usize,
    dilation: usize,
) -> Result<(), EncoderConfigError> {
    if groups != 1 || base_width != 64 {
        return Err(EncoderConfigError::UnsupportedBasicWidth { groups, base_width });
    }
    if dilation > 1 {
        return Err(EncoderConfigError::UnsupportedBasicDilation(dilation));
    }
    Ok(())
}

/// Shared shape queries for [`BasicBlock`] and [`BasicBlockConfig`].
pub trait BasicBlockMeta {
    /// Input channels.
    fn in_planes(&self) -> usize;

    /// Block width.
    fn planes(&self) -> usize;

    /// Output channels; the block does not expand, so ``planes``.
    fn out_planes(&self) -> usize {
        self.planes()
    }

    /// Stride of the first conv and of the skip projection.
    fn stride(&self) -> usize;

    /// ``ceil([in_height, in_width] / stride)``.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`BasicBlock`] Config.
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// Input channels.
    pub in_planes: usize,

    /// Block width and output channels.
    pub planes: usize,

    /// The stride of the first conv, and of the downsample layer.
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

impl BasicBlockMeta for BasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BasicBlockConfig {
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
        self.normalization
            .clone()
            .with_num_features(self.out_planes())
            .try_validate()
    }

    /// Initialize a [`BasicBlock`].
    ///
    /// # Panics
    ///
    /// If the config fails [`BasicBlockConfig::try_validate`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        expect_ok(self.try_validate());

        let in_planes = self.in_planes();
        let planes = self.planes();
        let stride = self.stride();

        let downsample = if self.needs_downsample() {
            Some(
                ConvDownsampleConfig::new(in_planes, self.out_planes())
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

        let cna1: CNA2dConfig =
            cna_builder.build_config(conv3x3_config(in_planes, planes, stride, 1, 1));

        let cna2: CNA2dConfig = cna_builder
            .build_config(conv3x3_config(planes, planes, 1, 1, 1))
            .with_act(self.last_activation.clone());

        let cna2 = cna2.init(device);

        BasicBlock {
            downsample: downsample.as_ref().map(|cfg| cfg.init(device)),
            cna1: cna1.init(device),
            cna2: if self.zero_init_residual {
                cna2.zero_init_norm()
            } else {
                cna2
            },
        }
    }
}

/// Two 3x3 convs around a residual sum.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// Skip path projection, when shapes change.
    pub downsample: Option<ConvDownsample<B>>,

    /// Strided 3x3 conv / norm / relu.
    pub cna1: CNA2d<B>,

    /// 3x3 conv / norm; the skip is summed before its activation.
    pub cna2: CNA2d<B>,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn planes(&self) -> usize {
        self.cna2.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna1.stride()
    }
}

impl<B: Backend> BasicBlock<B> {
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

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cna1.forward(input);
        let x = self.cna2.hook_forward(x, |x| x + identity);

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
    use burn::tensor::Distribution;

    #[test]
    fn test_basic_block_config() {
        let config = BasicBlockConfig::new(16, 32);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 1);
        assert!(config.needs_downsample());
        assert_eq!(config.output_resolution([16, 16]), [16, 16]);
        assert!(matches!(config.last_activation, Some(ActivationConfig::Relu)));
        assert_eq!(config.try_validate(), Ok(()));

        let config = config.with_stride(2).with_last_activation(None);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
        assert_eq!(config.output_resolution([15, 15]), [8, 8]);

        assert!(!BasicBlockConfig::new(8, 8).needs_downsample());
    }

    #[test]
    fn test_basic_block_guards() {
        assert_eq!(
            BasicBlockConfig::new(8, 8).with_groups(2).try_validate(),
            Err(EncoderConfigError::UnsupportedBasicWidth {
                groups: 2,
                base_width: 64
            })
        );
        assert_eq!(
            BasicBlockConfig::new(8, 8).with_base_width(32).try_validate(),
            Err(EncoderConfigError::UnsupportedBasicWidth {
                groups: 1,
                base_width: 32
            })
        );
        assert_eq!(
            BasicBlockConfig::new(8, 8).with_dilation(2).try_validate(),
            Err(EncoderConfigError::UnsupportedBasicDilation(2))
        );
        assert_eq!(
            BasicBlockConfig::new(8, 8).with_stride(0).try_validate(),
            Err(EncoderConfigError::ZeroParameter("stride"))
        );
    }

    #[test]
    #[should_panic(expected = "BasicBlock only supports groups=1 and base_width=64")]
    fn test_basic_block_init_panics() {
        type B = NdArray<f32>;
        let device = Default::default();
        let _block: BasicBlock<B> = BasicBlockConfig::new(8, 8).with_groups(4).init(&device);
    }

    #[test]
    fn test_basic_block_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(8, 8).init(&device);

        assert_eq!(block.in_planes(), 8);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 1);
        assert!(block.downsample.is_none());
        assert_eq!(block.output_resolution([16, 16]), [16, 16]);
    }

    #[test]
    fn test_basic_block_forward_no_downsample_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;
        let planes = 8;
        let in_height = 8;
        let in_width = 6;

        let block: BasicBlock<B> = BasicBlockConfig::new(planes, planes).init(&device);

        let input = Tensor::random(
            [batch_size, planes, in_height, in_width],
            Distribution::Default,
            &device,
        );
        let output = block.forward(input.clone());

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", planes),
                ("out_height", in_height),
                ("out_width", in_width)
            ],
        );

        let expected = {
            let x = block.cna1.forward(input.clone());
            block.cna2.hook_forward(x, |x| x + input)
        };
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_basic_block_forward_downsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 4;
        let planes = 8;

        let block: BasicBlock<B> = BasicBlockConfig::new(in_planes, planes)
            .with_stride(2)
            .init(&device);

        assert!(block.downsample.is_some());

        let [out_height, out_width] = block.output_resolution([9, 8]);
        assert_eq!([out_height, out_width], [5, 4]);

        let input = Tensor::ones([batch_size, in_planes, 9, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", planes),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );
    }

    #[test]
    fn test_basic_block_zero_init_residual() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(8, 8)
            .with_zero_init_residual(true)
            .init(&device);

        // relu(0 + x) == relu(x)
        let input: Tensor<B, 4> = Tensor::random([2, 8, 5, 5], Distribution::Default, &device);
        let output = block.forward(input.clone());
        output
            .to_data()
            .assert_eq(&burn::tensor::activation::relu(input).to_data(), true);
    }

    #[test]
    fn test_basic_block_last_activation() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(8, 8)
            .with_last_activation(None)
            .with_zero_init_residual(true)
            .init(&device);
        assert!(block.cna2.act.is_none());

        // A linear block with a zeroed branch is the identity.
        let input: Tensor<B, 4> =
            Tensor::random([1, 8, 4, 4], Distribution::Normal(0.0, 1.0), &device);
        let output = block.forward(input.clone());
        output.to_data().assert_eq(&input.to_data(), true);
    }
}
