//! # Well-Known `ResNet` Encoder Prefabs
//!
//! Each constructor returns the [`ResNetEncoderConfig`] and the nominal
//! output channel count of the variant; the small ``resnet18s_*`` variants
//! have no nominal count and return `None`.
//!
//! Overrides are applied with the config's `with_*` setters:
//!
//! ```rust,ignore
//! let (config, _) = resnet50();
//! let config = config.with_spatial_output(true);
//! ```
//!
//! [`PREFAB_ENCODER_MAP`] names every variant; see [`lookup_prefab`].

use crate::errors::EncoderConfigError;
use crate::models::resnet::encoder::ResNetEncoderConfig;
use crate::models::resnet::head::FinalPool;
use crate::models::resnet::residual_block::BlockKind;
use crate::prefabs::{PreFabConfig, StaticPreFabConfig};

/// Two-stage 18-layer family base; no max pool, unpadded stem, spatial output.
fn resnet18s_base(final_pool: FinalPool) -> ResNetEncoderConfig {
    ResNetEncoderConfig::new(BlockKind::Basic, vec![2, 2])
        .with_filters(vec![64, 128])
        .with_strides(vec![1, 2])
        .with_initial_maxpool(false)
        .with_initial_padding(false)
        .with_spatial_output(true)
        .with_final_pool(final_pool)
}

/// ``resnet18s_a``: two stages, no final pool.
pub fn resnet18s_a() -> (ResNetEncoderConfig, Option<usize>) {
    (resnet18s_base(FinalPool::Identity), None)
}

/// ``resnet18s_b``: two stages, ``1x1`` conv pool to 32 channels.
pub fn resnet18s_b() -> (ResNetEncoderConfig, Option<usize>) {
    (resnet18s_base(FinalPool::Conv1x1 { out_channels: 32 }), None)
}

/// ``resnet18s_c``: two stages, ``1x1`` conv pool to 48 channels.
pub fn resnet18s_c() -> (ResNetEncoderConfig, Option<usize>) {
    (resnet18s_base(FinalPool::Conv1x1 { out_channels: 48 }), None)
}

/// ``resnet18s_d``: two stages, ``1x1`` conv pool to 64 channels.
pub fn resnet18s_d() -> (ResNetEncoderConfig, Option<usize>) {
    (resnet18s_base(FinalPool::Conv1x1 { out_channels: 64 }), None)
}

/// ``resnet18s_e``: two stages, ``1x1`` conv pool to 48 channels.
pub fn resnet18s_e() -> (ResNetEncoderConfig, Option<usize>) {
    (resnet18s_base(FinalPool::Conv1x1 { out_channels: 48 }), None)
}

/// ``resnet18s_f``: two stages, ``1x1`` conv pool to 32 channels.
pub fn resnet18s_f() -> (ResNetEncoderConfig, Option<usize>) {
    (resnet18s_base(FinalPool::Conv1x1 { out_channels: 32 }), None)
}

/// ``resnet18s_g``: four stages at 1/4 resolution over 6-channel input.
pub fn resnet18s_g() -> (ResNetEncoderConfig, Option<usize>) {
    (
        ResNetEncoderConfig::new(BlockKind::Basic, vec![2, 2, 2, 2])
            .with_filters(vec![64, 128, 128, 128])
            .with_strides(vec![1, 2, 1, 1])
            .with_num_channels(6)
            .with_zero_init_residual(true)
            .with_initial_maxpool(false)
            .with_final_pool(FinalPool::Conv1x1 { out_channels: 64 })
            .with_spatial_output(true)
            .with_initial_padding(true),
        None,
    )
}

/// ``resnet18``.
pub fn resnet18() -> (ResNetEncoderConfig, Option<usize>) {
    (
        ResNetEncoderConfig::new(BlockKind::Basic, vec![2, 2, 2, 2]),
        Some(512),
    )
}

/// ``resnet18`` with skip-only blocks.
pub fn resnet18_id() -> (ResNetEncoderConfig, Option<usize>) {
    (
        ResNetEncoderConfig::new(BlockKind::Identity, vec![2, 2, 2, 2]),
        Some(512),
    )
}

/// ``resnet34``.
pub fn resnet34() -> (ResNetEncoderConfig, Option<usize>) {
    (
        ResNetEncoderConfig::new(BlockKind::Basic, vec![3, 4, 6, 3]),
        Some(512),
    )
}

/// ``resnet50``.
pub fn resnet50() -> (ResNetEncoderConfig, Option<usize>) {
    (
        ResNetEncoderConfig::new(BlockKind::Bottleneck, vec![3, 4, 6, 3]),
        Some(2048),
    )
}

/// ``resnet101``.
pub fn resnet101() -> (ResNetEncoderConfig, Option<usize>) {
    (
        ResNetEncoderConfig::new(BlockKind::Bottleneck, vec![3, 4, 23, 3]),
        Some(2048),
    )
}

fn wide_resnet50(widen: usize) -> ResNetEncoderConfig {
    ResNetEncoderConfig::new(BlockKind::Bottleneck, vec![3, 4, 6, 3]).with_widen(widen)
}

/// ``resnet50``, 2x wide.
pub fn resnet50x2() -> (ResNetEncoderConfig, Option<usize>) {
    (wide_resnet50(2), Some(4096))
}

/// ``resnet50``, 4x wide.
pub fn resnet50x4() -> (ResNetEncoderConfig, Option<usize>) {
    (wide_resnet50(4), Some(8192))
}

/// ``resnet50``, 5x wide.
pub fn resnet50x5() -> (ResNetEncoderConfig, Option<usize>) {
    (wide_resnet50(5), Some(10240))
}

/// ``resnet200``, 2x wide.
pub fn resnet200x2() -> (ResNetEncoderConfig, Option<usize>) {
    (
        ResNetEncoderConfig::new(BlockKind::Bottleneck, vec![3, 24, 36, 3]).with_widen(2),
        Some(4096),
    )
}

/// A named encoder prefab.
#[derive(Debug)]
pub struct EncoderPreFab {
    /// The config prefab.
    pub prefab: StaticPreFabConfig<ResNetEncoderConfig>,

    /// The nominal output channels, if the variant has one.
    pub nominal_out_channels: Option<usize>,
}

impl EncoderPreFab {
    /// The prefab name.
    pub fn name(&self) -> &'static str {
        self.prefab.name
    }

    /// Build the config and nominal output channels.
    pub fn build(&self) -> (ResNetEncoderConfig, Option<usize>) {
        (self.prefab.new_config(), self.nominal_out_channels)
    }

    /// Convert to a [`PreFabConfig`].
    pub fn to_prefab(&self) -> PreFabConfig<ResNetEncoderConfig> {
        self.prefab.to_prefab()
    }
}

macro_rules! encoder_prefab {
    ($name:ident, $nominal:expr, $description:literal) => {
        EncoderPreFab {
            prefab: StaticPreFabConfig {
                name: stringify!($name),
                description: $description,
                builder: {
                    fn build() -> ResNetEncoderConfig {
                        $name().0
                    }
                    build
                },
            },
            nominal_out_channels: $nominal,
        }
    };
}

/// Every named encoder prefab.
pub static PREFAB_ENCODER_MAP: &[EncoderPreFab] = &[
    encoder_prefab!(resnet18s_a, None, "2-stage ResNet18, spatial, no final pool"),
    encoder_prefab!(resnet18s_b, None, "2-stage ResNet18, spatial, 1x1 pool to 32"),
    encoder_prefab!(resnet18s_c, None, "2-stage ResNet18, spatial, 1x1 pool to 48"),
    encoder_prefab!(resnet18s_d, None, "2-stage ResNet18, spatial, 1x1 pool to 64"),
    encoder_prefab!(resnet18s_e, None, "2-stage ResNet18, spatial, 1x1 pool to 48"),
    encoder_prefab!(resnet18s_f, None, "2-stage ResNet18, spatial, 1x1 pool to 32"),
    encoder_prefab!(resnet18s_g, None, "4-stage ResNet18, 6-channel input, 1/4 resolution"),
    encoder_prefab!(resnet18, Some(512), "ResNet18"),
    encoder_prefab!(resnet18_id, Some(512), "ResNet18 with identity blocks"),
    encoder_prefab!(resnet34, Some(512), "ResNet34"),
    encoder_prefab!(resnet50, Some(2048), "ResNet50"),
    encoder_prefab!(resnet101, Some(2048), "ResNet101"),
    encoder_prefab!(resnet50x2, Some(4096), "ResNet50, 2x wide"),
    encoder_prefab!(resnet50x4, Some(8192), "ResNet50, 4x wide"),
    encoder_prefab!(resnet50x5, Some(10240), "ResNet50, 5x wide"),
    encoder_prefab!(resnet200x2, Some(4096), "ResNet200, 2x wide"),
];

/// The names of every encoder prefab.
pub fn prefab_names() -> Vec<&'static str> {
    PREFAB_ENCODER_MAP.iter().map(|p| p.name()).collect()
}

/// Find an encoder prefab by name.
pub fn lookup_prefab(name: &str) -> Result<&'static EncoderPreFab, EncoderConfigError> {
    PREFAB_ENCODER_MAP
        .iter()
        .find(|p| p.name() == name)
        .ok_or_else(|| EncoderConfigError::UnknownPreFab(name.to_string()))
}
