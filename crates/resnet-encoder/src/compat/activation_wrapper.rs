//! # Activation Layer Wrapper
//!
//! Residual blocks pick their post-sum activation from configuration;
//! [`ActivationConfig`] is the serializable choice, and [`Activation`]
//! the initialized ``burn::nn`` layer.
//!
//! The encoder config only selects relu, sigmoid, or no activation (see
//! `LastActivation`). The remaining variants are reachable when building
//! blocks directly, through
//! [`AbstractCNA2dConfig::act`](crate::layers::blocks::cna::AbstractCNA2dConfig)
//! or a block config's `last_activation`.
use burn::nn::{Gelu, LeakyRelu, LeakyReluConfig, PRelu, PReluConfig, Relu, Sigmoid, Tanh};
use burn::prelude::{Backend, Module, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// [`Activation`] Configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum ActivationConfig {
    /// ``max(x, 0)``.
    #[default]
    Relu,

    /// ``max(x, 0) + negative_slope * min(x, 0)``.
    LeakyRelu {
        /// Slope for negative inputs.
        negative_slope: f64,
    },

    /// Gaussian error linear unit.
    Gelu,

    /// Logistic sigmoid.
    Sigmoid,

    /// Hyperbolic tangent.
    Tanh,

    /// Leaky relu with a learned slope.
    PRelu {
        /// Initial slope.
        alpha: f64,

        /// Slope count; ``1`` shares the slope, otherwise one per channel.
        num_parameters: usize,
    },
}

impl fmt::Display for ActivationConfig {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ActivationConfig {
    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::LeakyRelu { .. } => "leaky_relu",
            Self::Gelu => "gelu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::PRelu { .. } => "prelu",
        }
    }

    /// Does the layer carry parameters?
    pub fn is_learnable(&self) -> bool {
        matches!(self, Self::PRelu { .. })
    }

    /// Initialize the activation layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Activation<B> {
        match *self {
            Self::Relu => Activation::Relu(Relu),
            Self::LeakyRelu { negative_slope } => Activation::LeakyRelu(
                LeakyReluConfig::new()
                    .with_negative_slope(negative_slope)
                    .init(),
            ),
            Self::Gelu => Activation::Gelu(Gelu),
            Self::Sigmoid => Activation::Sigmoid(Sigmoid),
            Self::Tanh => Activation::Tanh(Tanh),
            Self::PRelu {
                alpha,
                num_parameters,
            } => Activation::PRelu(
                PReluConfig::new()
                    .with_alpha(alpha)
                    .with_num_parameters(num_parameters)
                    .init(device),
            ),
        }
    }
}

/// Activation Layer Wrapper.
#[derive(Module, Debug)]
pub enum Activation<B: Backend> {
    /// [`Relu`] layer.
    Relu(Relu),

    /// [`LeakyRelu`] layer.
    LeakyRelu(LeakyRelu),

    /// [`Gelu`] layer.
    Gelu(Gelu),

    /// [`Sigmoid`] layer.
    Sigmoid(Sigmoid),

    /// [`Tanh`] layer.
    Tanh(Tanh),

    /// [`PRelu`] layer.
    PRelu(PRelu<B>),
}

impl<B: Backend> Activation<B> {
    /// Forward pass.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Self::Relu(layer) => layer.forward(input),
            Self::LeakyRelu(layer) => layer.forward(input),
            Self::Gelu(layer) => layer.forward(input),
            Self::Sigmoid(layer) => layer.forward(input),
            Self::Tanh(layer) => layer.forward(input),
            Self::PRelu(layer) => layer.forward(input),
        }
    }

    /// The config which (re)builds this layer.
    ///
    /// A learned [`PRelu`] slope is reported as its initial value.
    pub fn to_config(&self) -> ActivationConfig {
        match self {
            Self::Relu(_) => ActivationConfig::Relu,
            Self::LeakyRelu(layer) => ActivationConfig::LeakyRelu {
                negative_slope: layer.negative_slope,
            },
            Self::Gelu(_) => ActivationConfig::Gelu,
            Self::Sigmoid(_) => ActivationConfig::Sigmoid,
            Self::Tanh(_) => ActivationConfig::Tanh,
            Self::PRelu(layer) => ActivationConfig::PRelu {
                alpha: layer.alpha_value,
                num_parameters: layer.alpha.val().dims()[0],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::activation;

    type B = NdArray<f32>;

    #[test]
    fn test_names() {
        assert_eq!(ActivationConfig::default(), ActivationConfig::Relu);
        assert_eq!(ActivationConfig::Relu.to_string(), "relu");
        assert_eq!(
            ActivationConfig::LeakyRelu {
                negative_slope: 0.2
            }
            .name(),
            "leaky_relu"
        );
        assert!(!ActivationConfig::Sigmoid.is_learnable());
        assert!(
            ActivationConfig::PRelu {
                alpha: 0.25,
                num_parameters: 1
            }
            .is_learnable()
        );
    }

    #[test]
    fn test_stateless_forward() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::from_data(
            [[[[-2.0, -0.5], [0.0, 0.5]], [[1.0, 2.0], [-1.0, 3.0]]]],
            &device,
        );

        let cases: Vec<(ActivationConfig, Tensor<B, 4>)> = vec![
            (ActivationConfig::Relu, activation::relu(input.clone())),
            (ActivationConfig::Gelu, activation::gelu(input.clone())),
            (ActivationConfig::Sigmoid, activation::sigmoid(input.clone())),
            (ActivationConfig::Tanh, activation::tanh(input.clone())),
            (
                ActivationConfig::LeakyRelu {
                    negative_slope: 0.1,
                },
                activation::leaky_relu(input.clone(), 0.1),
            ),
        ];

        for (config, expected) in cases {
            let layer: Activation<B> = config.init(&device);
            assert_eq!(layer.to_config(), config);
            layer
                .forward(input.clone())
                .to_data()
                .assert_eq(&expected.to_data(), true);
        }
    }

    #[test]
    fn test_prelu_per_channel() {
        let device = Default::default();
        let config = ActivationConfig::PRelu {
            alpha: 0.5,
            num_parameters: 2,
        };
        let layer: Activation<B> = config.init(&device);
        assert_eq!(layer.to_config(), config);
        assert_eq!(layer.num_params(), 2);

        let input: Tensor<B, 4> = Tensor::from_data([[[[-2.0]], [[4.0]]]], &device);
        let expected: Tensor<B, 4> = Tensor::from_data([[[[-1.0]], [[4.0]]]], &device);
        layer
            .forward(input)
            .to_data()
            .assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_config_serde() {
        let config = ActivationConfig::LeakyRelu {
            negative_slope: 0.25,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ActivationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
