//! # Compatibility Layers
//!
//! Wrappers over ``burn`` layers which are not yet abstracted upstream.

pub mod activation_wrapper;
pub mod conv_shape;
pub mod normalization_wrapper;
