//! # Reusable Layers

pub mod blocks;
