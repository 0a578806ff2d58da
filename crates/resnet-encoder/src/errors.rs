//! # Configuration Errors
//!
//! Encoder construction is a pure function of its configuration;
//! every failure is a rejected configuration, reported before any
//! weights are allocated.

use thiserror::Error;

/// Errors raised while validating or lowering an encoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncoderConfigError {
    /// Basic and identity blocks have no grouped / widened convolutions.
    #[error(
        "BasicBlock only supports groups=1 and base_width=64; got groups={groups}, base_width={base_width}"
    )]
    UnsupportedBasicWidth {
        /// Requested conv groups.
        groups: usize,
        /// Requested base width.
        base_width: usize,
    },

    /// Basic and identity blocks have no dilated convolutions.
    #[error("Dilation > 1 not supported in BasicBlock; got dilation={0}")]
    UnsupportedBasicDilation(usize),

    /// The stride/dilation replacement list must cover stages 2..=4.
    #[error(
        "replace_stride_with_dilation should be empty or a 3-element list, got {0:?}"
    )]
    MalformedDilationReplacement(Vec<bool>),

    /// Encoders have between one and four stages.
    #[error("layers should describe 1 to 4 stages, got {0}")]
    InvalidStageCount(usize),

    /// A per-stage list is shorter than the stage list.
    #[error("{name} has {actual} entries, but {expected} stages are configured")]
    StageListTooShort {
        /// The name of the short list.
        name: &'static str,
        /// The number of stages.
        expected: usize,
        /// The list length.
        actual: usize,
    },

    /// A stage must hold at least one block.
    #[error("stage {stage} has no blocks")]
    EmptyStage {
        /// Stage index.
        stage: usize,
    },

    /// A size / count parameter which must be positive was zero.
    #[error("{0} must be > 0")]
    ZeroParameter(&'static str),

    /// Group normalization needs at least one group of four features.
    #[error("group norm over {features} features requires at least 4 features")]
    GroupNormTooNarrow {
        /// The feature count.
        features: usize,
    },

    /// Group normalization needs the features to split evenly.
    #[error("group norm over {features} features does not divide into {groups} groups")]
    GroupNormIndivisible {
        /// The feature count.
        features: usize,
        /// The group count.
        groups: usize,
    },

    /// Adjacent blocks or stages do not chain.
    #[error("{what}[{prev}].out_planes({out_planes}) != {what}[{next}].in_planes({in_planes})")]
    PlaneMismatch {
        /// The kind of sequence; "block" or "layer".
        what: &'static str,
        /// Index of the producing element.
        prev: usize,
        /// Output planes of the producing element.
        out_planes: usize,
        /// Index of the consuming element.
        next: usize,
        /// Input planes of the consuming element.
        in_planes: usize,
    },

    /// The first stage does not consume what the stem produces.
    #[error("stem produces {stem_out} channels, but layer[0] expects {layer_in}")]
    StemMismatch {
        /// The stem output channels.
        stem_out: usize,
        /// The first stage input planes.
        layer_in: usize,
    },

    /// The head does not consume what the last stage produces.
    #[error("head expects {expected} input channels, but the encoder body produces {actual}")]
    HeadMismatch {
        /// The head input channels.
        expected: usize,
        /// The body output channels.
        actual: usize,
    },

    /// No prefab is registered under the name.
    #[error("unknown encoder prefab \"{0}\"")]
    UnknownPreFab(String),
}

/// Panic with the error message if `result` is an error.
///
/// The panicking surface used by the `init` / `expect_valid` family.
pub(crate) fn expect_ok<T>(result: Result<T, EncoderConfigError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{}", err),
    }
}
