//! # Model Families

pub mod resnet;
