//! # `ResNet` Encoders
//!
//! The encoder is assembled bottom-up:
//! * [`stem`] - input conv/norm/act and optional max pool.
//! * [`layer_block`] - stages of [`residual_block`]s; each one of:
//!   * [`basic_block`] - two 3x3 convolutions.
//!   * [`bottleneck`] - 1x1 / 3x3 / 1x1 convolutions, 4x expansion.
//!   * [`identity_block`] - the skip path alone.
//! * [`head`] - final pooling and flattening.
//!
//! [`encoder::ResNetEncoderConfig`] lowers the high-level hyperparameters
//! into this structure; [`prefabs`] names the well-known variants.

pub mod basic_block;
pub mod bottleneck;
pub mod downsample;
pub mod encoder;
pub mod head;
pub mod identity_block;
pub mod layer_block;
pub mod output;
pub mod prefabs;
pub mod residual_block;
pub mod stem;
pub mod util;
