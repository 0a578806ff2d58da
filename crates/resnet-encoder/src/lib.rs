#![warn(missing_docs)]
//!# resnet-encoder - ResNet Image Encoder Backbones
//!
//! Configurable `ResNet` feature extractors built on ``burn``.
//!
//! ## Notable Components
//!
//! * [`compat`] - compat code, ported or planned for an upcoming release of ``burn``.
//!   * [`compat::activation_wrapper::Activation`] - activation layer abstraction wrapper.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//!   * [`compat::conv_shape`] - convolution output size arithmetic.
//! * [`errors`] - configuration validation errors.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::cna`] - ``Conv2d + Norm + Activation`` block.
//! * [`prefabs`] - named config builders.
//! * [`models`] - complete model families.
//!   * [`models::resnet`] - `ResNet` encoders.
//!     * [`models::resnet::encoder`] - the [`models::resnet::encoder::ResNetEncoder`] backbone.
//!     * [`models::resnet::prefabs`] - named, well-known encoder configurations.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;
pub mod errors;
pub mod layers;
pub mod models;
pub mod prefabs;
