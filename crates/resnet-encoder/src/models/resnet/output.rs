//! # Backbone Output
use burn::prelude::{Backend, Tensor};

/// The encodings produced by a backbone.
#[derive(Debug, Clone)]
pub enum BackboneOutput<B: Backend> {
    /// Flattened ``[batch, channels * height * width]`` encodings.
    Flat(Tensor<B, 2>),

    /// Spatial ``[batch, channels, height, width]`` encodings.
    Spatial(Tensor<B, 4>),
}

impl<B: Backend> BackboneOutput<B> {
    /// Is this a spatial output?
    pub fn is_spatial(&self) -> bool {
        matches!(self, Self::Spatial(_))
    }

    /// The dims of the encodings.
    pub fn dims(&self) -> Vec<usize> {
        match self {
            Self::Flat(x) => x.dims().to_vec(),
            Self::Spatial(x) => x.dims().to_vec(),
        }
    }

    /// The per-example encoding size.
    pub fn encoding_size(&self) -> usize {
        self.dims().iter().skip(1).product()
    }

    /// Flatten to ``[batch, channels * height * width]``.
    pub fn into_flat(self) -> Tensor<B, 2> {
        match self {
            Self::Flat(x) => x,
            Self::Spatial(x) => x.flatten(1, 3),
        }
    }

    /// The spatial encodings, if present.
    pub fn into_spatial(self) -> Option<Tensor<B, 4>> {
        match self {
            Self::Flat(_) => None,
            Self::Spatial(x) => Some(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_backbone_output() {
        type B = NdArray<f32>;
        let device = Default::default();

        let x: Tensor<B, 4> = Tensor::ones([2, 3, 4, 5], &device);

        let output = BackboneOutput::Spatial(x.clone());
        assert!(output.is_spatial());
        assert_eq!(output.dims(), vec![2, 3, 4, 5]);
        assert_eq!(output.encoding_size(), 60);
        assert_eq!(output.clone().into_flat().dims(), [2, 60]);
        assert!(output.into_spatial().is_some());

        let output = BackboneOutput::Flat(x.flatten::<2>(1, 3));
        assert!(!output.is_spatial());
        assert_eq!(output.encoding_size(), 60);
        assert!(output.into_spatial().is_none());
    }
}
