//! # `ResNet` Utilities
use crate::compat::conv_shape::ConvWindow;
use burn::nn::conv::Conv2dConfig;
use burn::nn::{Initializer, PaddingConfig2d};

/// Kaiming normal init for convolutions which feed a `relu`.
///
/// ``std = sqrt(2 / fan_out)``
pub const CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: core::f64::consts::SQRT_2,
    fan_out_only: true,
};

/// Expand a scalar into a square ``[x, x]`` array.
#[inline(always)]
pub fn scalar_to_array(x: usize) -> [usize; 2] {
    [x, x]
}

/// Get the output resolution of a strided residual unit.
///
/// Every residual conv path (3x3 with ``padding = dilation``, and the
/// 1x1 downsample) shares the same arithmetic:
/// ``out = (in - 1) / stride + 1``; which is ``ceil(in / stride)``.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in, width_in]``.
///
/// # Returns
///
/// ``[height_out, width_out]``
#[inline(always)]
pub fn stride_div_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    ConvWindow::new(1, stride).expect_output_resolution(input_resolution)
}

/// A 3x3 conv with ``padding = dilation``; no bias.
///
/// Preserves resolution at stride 1, for any dilation.
pub fn conv3x3_config(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
    groups: usize,
    dilation: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_planes, out_planes], scalar_to_array(3))
        .with_stride(scalar_to_array(stride))
        .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
        .with_dilation(scalar_to_array(dilation))
        .with_groups(groups)
        .with_initializer(CONV_INTO_RELU_INITIALIZER)
        .with_bias(false)
}

/// A 1x1 conv; no bias.
pub fn conv1x1_config(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_planes, out_planes], scalar_to_array(1))
        .with_stride(scalar_to_array(stride))
        .with_padding(PaddingConfig2d::Explicit(0, 0))
        .with_initializer(CONV_INTO_RELU_INITIALIZER)
        .with_bias(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_to_array() {
        assert_eq!(scalar_to_array(3), [3, 3]);
    }

    #[test]
    fn test_stride_div_output_resolution() {
        assert_eq!(stride_div_output_resolution([16, 16], 1), [16, 16]);
        assert_eq!(stride_div_output_resolution([16, 12], 2), [8, 6]);
        assert_eq!(stride_div_output_resolution([15, 7], 2), [8, 4]);
        assert_eq!(stride_div_output_resolution([12, 24], 3), [4, 8]);
    }

    #[test]
    fn test_conv_configs() {
        let conv = conv3x3_config(8, 16, 2, 4, 2);
        assert_eq!(conv.channels, [8, 16]);
        assert_eq!(conv.kernel_size, [3, 3]);
        assert_eq!(conv.stride, [2, 2]);
        assert_eq!(conv.dilation, [2, 2]);
        assert_eq!(conv.groups, 4);
        assert!(matches!(conv.padding, PaddingConfig2d::Explicit(2, 2)));
        assert!(!conv.bias);

        let conv = conv1x1_config(8, 32, 2);
        assert_eq!(conv.kernel_size, [1, 1]);
        assert_eq!(conv.stride, [2, 2]);
        assert!(!conv.bias);
    }

    #[test]
    fn test_initializer() {
        assert!(matches!(
            CONV_INTO_RELU_INITIALIZER,
            Initializer::KaimingNormal {
                fan_out_only: true,
                ..
            }
        ));
    }
}
