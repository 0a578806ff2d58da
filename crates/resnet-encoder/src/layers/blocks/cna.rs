//! # `CNA2d` - conv / norm / activation unit.
//!
//! ```text
//! conv -> norm -> [hook] -> [act]
//! ```
//!
//! Every convolution in the encoder is followed by a norm. Residual blocks
//! use the hook to add the skip path before the final activation; skip
//! projections leave the activation off entirely.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::errors::EncoderConfigError;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Tensor};

/// Norm / activation policy, applied to many convolutions.
///
/// The norm feature size is filled in from each conv's output channels.
#[derive(Config, Debug)]
pub struct AbstractCNA2dConfig {
    /// Norm policy.
    #[config(default = "NormalizationConfig::default()")]
    pub norm: NormalizationConfig,

    /// Activation policy.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,
}

impl AbstractCNA2dConfig {
    /// Pair a conv with this policy.
    pub fn build_config(
        &self,
        conv: Conv2dConfig,
    ) -> CNA2dConfig {
        self.build_linear_config(conv)
            .with_act(Some(self.act.clone()))
    }

    /// Pair a conv with the norm policy only; no activation.
    pub fn build_linear_config(
        &self,
        conv: Conv2dConfig,
    ) -> CNA2dConfig {
        CNA2dConfig::new(conv, self.norm.clone())
            .with_act(None)
            .match_norm_features()
    }
}

/// [`CNA2d`] Meta API.
///
/// Encoder convolutions are square; `stride` and `dilation` report the
/// height component.
pub trait CNA2dMeta {
    /// Input channels.
    fn in_channels(&self) -> usize;

    /// Output channels.
    fn out_channels(&self) -> usize;

    /// Conv groups.
    fn groups(&self) -> usize;

    /// Conv stride.
    fn stride(&self) -> usize;

    /// Conv dilation.
    fn dilation(&self) -> usize;

    /// Is the activation absent?
    fn is_linear(&self) -> bool;
}

/// [`CNA2d`] Config.
#[derive(Config, Debug)]
pub struct CNA2dConfig {
    /// The conv.
    pub conv: Conv2dConfig,

    /// The norm; resized to the conv output on init.
    pub norm: NormalizationConfig,

    /// The activation; `None` for a linear output.
    #[config(default = "Some(ActivationConfig::Relu)")]
    pub act: Option<ActivationConfig>,
}

impl CNA2dMeta for CNA2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }

    fn dilation(&self) -> usize {
        self.conv.dilation[0]
    }

    fn is_linear(&self) -> bool {
        self.act.is_none()
    }
}

impl CNA2dConfig {
    /// Check that the config can be initialized.
    pub fn try_validate(&self) -> Result<(), EncoderConfigError> {
        let [in_channels, out_channels] = self.conv.channels;
        if in_channels == 0 {
            return Err(EncoderConfigError::ZeroParameter("conv in_channels"));
        }
        if out_channels == 0 {
            return Err(EncoderConfigError::ZeroParameter("conv out_channels"));
        }
        if self.conv.groups == 0 {
            return Err(EncoderConfigError::ZeroParameter("conv groups"));
        }
        self.norm
            .clone()
            .with_num_features(out_channels)
            .try_validate()
    }

    /// Resize the norm to the conv output channels.
    pub fn match_norm_features(self) -> Self {
        let norm = self.norm.with_num_features(self.conv.channels[1]);
        Self { norm, ..self }
    }

    /// Initialize a [`CNA2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CNA2d<B> {
        let Self { conv, norm, act } = self.match_norm_features();
        CNA2d {
            conv: conv.init(device),
            norm: norm.init(device),
            act: act.map(|act| act.init(device)),
        }
    }
}

/// Conv / norm / optional activation.
#[derive(Module, Debug)]
pub struct CNA2d<B: Backend> {
    /// The conv.
    pub conv: Conv2d<B>,

    /// The norm.
    pub norm: Normalization<B>,

    /// The optional activation.
    pub act: Option<Activation<B>>,
}

impl<B: Backend> CNA2dMeta for CNA2d<B> {
    fn in_channels(&self) -> usize {
        // weight: [out, in / groups, kh, kw]
        self.conv.weight.dims()[1] * self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.dims()[0]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }

    fn dilation(&self) -> usize {
        self.conv.dilation[0]
    }

    fn is_linear(&self) -> bool {
        self.act.is_none()
    }
}

impl<B: Backend> CNA2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.hook_forward(input, |x| x)
    }

    /// Forward Pass, with `hook` applied between the norm and activation.
    ///
    /// The hook must preserve the shape of its input.
    pub fn hook_forward<F>(
        &self,
        input: Tensor<B, 4>,
        hook: F,
    ) -> Tensor<B, 4>
    where
        F: FnOnce(Tensor<B, 4>) -> Tensor<B, 4>,
    {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.norm.forward(self.conv.forward(input));
        let [out_height, out_width] = unpack_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &["out_height", "out_width"],
            &[("batch", batch), ("out_channels", self.out_channels())]
        );

        let x = hook(x);
        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        match &self.act {
            Some(act) => act.forward(x),
            None => x,
        }
    }

    /// Zero the norm scale; the unit then emits the norm shift (zero).
    pub fn zero_init_norm(self) -> Self {
        Self {
            norm: self.norm.zero_init_gamma(),
            ..self
        }
    }
}
