#![recursion_limit = "256"]

use burn::backend::NdArray;
use burn::module::Module;
use burn::prelude::Tensor;
use burn::tensor::Distribution;
use clap::{Parser, arg};
use resnet_encoder::models::resnet::encoder::ResNetEncoder;
use resnet_encoder::models::resnet::prefabs::{PREFAB_ENCODER_MAP, lookup_prefab};
use tracing_subscriber::EnvFilter;

// $ --prefab=resnet18s_g --channels=6 --height=64 --width=64
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Name of the encoder prefab.
    #[arg(short, long, default_value = "resnet18")]
    prefab: String,

    /// List the prefabs and exit.
    #[arg(long, default_value_t = false)]
    list: bool,

    /// Batch size of the probe input.
    #[arg(short, long, default_value_t = 2)]
    batch_size: usize,

    /// Override the prefab input channels.
    #[arg(long)]
    channels: Option<usize>,

    /// Probe input height.
    #[arg(long, default_value_t = 64)]
    height: usize,

    /// Probe input width.
    #[arg(long, default_value_t = 64)]
    width: usize,

    /// Keep spatial output.
    #[arg(long, default_value_t = false)]
    spatial: bool,

    /// Print the lowered structure config.
    #[arg(long, default_value_t = false)]
    structure: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.list {
        for prefab in PREFAB_ENCODER_MAP {
            println!("{:<12} {}", prefab.name(), prefab.prefab.description);
        }
        return Ok(());
    }

    type B = NdArray<f32>;
    let device = Default::default();

    let (mut config, nominal) = lookup_prefab(&args.prefab)?.build();
    if let Some(channels) = args.channels {
        config.num_channels = channels;
    }
    if args.spatial {
        config.spatial_output = true;
    }

    println!("{}", serde_json::to_string_pretty(&config)?);
    if args.structure {
        println!("{}", serde_json::to_string_pretty(&config.try_to_structure()?)?);
    }

    let encoder: ResNetEncoder<B> = config.try_init(&device)?;
    tracing::info!(
        prefab = %args.prefab,
        params = encoder.num_params(),
        "initialized encoder"
    );

    let input: Tensor<B, 4> = Tensor::random(
        [args.batch_size, encoder.in_channels(), args.height, args.width],
        Distribution::Default,
        &device,
    );
    let features = encoder.forward_features(input.clone());
    let output = encoder.forward(input);

    println!("prefab:          {}", args.prefab);
    println!("nominal out:     {:?}", nominal);
    println!("out channels:    {}", encoder.out_channels());
    println!(
        "out resolution:  {:?}",
        encoder.output_resolution([args.height, args.width])
    );
    println!("features dims:   {:?}", features.dims());
    println!("output dims:     {:?}", output.dims());
    println!("encoding size:   {}", output.encoding_size());

    Ok(())
}
