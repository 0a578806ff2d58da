//! # Convolution Window Arithmetic
//!
//! Output sizes of square convolution and pooling windows.
//!
//! ```text
//! out = floor((in + 2 * padding - dilation * (kernel - 1) - 1) / stride) + 1
//! ```
//!
//! See the [pytorch conv2d](https://docs.pytorch.org/docs/stable/generated/torch.nn.Conv2d.html)
//! shape notes; max pooling shares the arithmetic.

/// A square conv / pool window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvWindow {
    /// Kernel size.
    pub kernel: usize,

    /// Stride.
    pub stride: usize,

    /// Padding, added to both sides.
    pub padding: usize,

    /// Dilation.
    pub dilation: usize,
}

impl ConvWindow {
    /// A window with no padding and no dilation.
    pub const fn new(
        kernel: usize,
        stride: usize,
    ) -> Self {
        Self {
            kernel,
            stride,
            padding: 0,
            dilation: 1,
        }
    }

    /// Set the padding.
    pub const fn with_padding(
        self,
        padding: usize,
    ) -> Self {
        Self { padding, ..self }
    }

    /// Set the dilation.
    pub const fn with_dilation(
        self,
        dilation: usize,
    ) -> Self {
        Self { dilation, ..self }
    }

    /// The input span covered by one output position.
    pub const fn receptive_span(&self) -> usize {
        self.dilation * (self.kernel - 1) + 1
    }

    /// The output size along one axis; `None` when the window never fits.
    ///
    /// # Panics
    ///
    /// On a zero kernel, stride, or dilation.
    pub fn output_size(
        &self,
        input_size: usize,
    ) -> Option<usize> {
        assert!(
            self.kernel > 0 && self.stride > 0 && self.dilation > 0,
            "degenerate window: {self:?}"
        );
        let padded = input_size + 2 * self.padding;
        let span = self.receptive_span();
        if input_size == 0 || padded < span {
            None
        } else {
            Some((padded - span) / self.stride + 1)
        }
    }

    /// The output resolution of a ``[height, width]`` input.
    ///
    /// # Panics
    ///
    /// If the window does not fit either axis.
    pub fn expect_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        input_resolution.map(|size| match self.output_size(size) {
            Some(out) => out,
            None => panic!("{self:?} does not fit input resolution {input_resolution:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size() {
        let conv3x3 = ConvWindow::new(3, 1).with_padding(1);
        assert_eq!(conv3x3.output_size(8), Some(8));
        assert_eq!(ConvWindow { stride: 2, ..conv3x3 }.output_size(7), Some(4));

        assert_eq!(ConvWindow::new(1, 2).output_size(7), Some(4));

        let dilated = ConvWindow::new(3, 1).with_padding(2).with_dilation(2);
        assert_eq!(dilated.receptive_span(), 5);
        assert_eq!(dilated.output_size(9), Some(9));

        let stem = ConvWindow::new(7, 2);
        assert_eq!(stem.with_padding(3).output_size(64), Some(32));
        assert_eq!(stem.with_padding(2).output_size(64), Some(31));
        assert_eq!(stem.output_size(2), None);
        assert_eq!(stem.output_size(0), None);
    }

    #[test]
    fn test_expect_output_resolution() {
        let pool = ConvWindow::new(3, 2).with_padding(1);
        assert_eq!(pool.expect_output_resolution([31, 16]), [16, 8]);
    }

    #[test]
    #[should_panic(expected = "does not fit input resolution")]
    fn test_expect_output_resolution_panics() {
        ConvWindow::new(7, 1).expect_output_resolution([8, 3]);
    }
}
