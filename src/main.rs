use clap::{Parser, Subcommand};
use iiif_raster::cache::{self, DerivativeCache};
use iiif_raster::config::{self, Config, MAX_SHARPEN};
use iiif_raster::imaging::{
    DeriveParams, Filter, Quality, RustBackend, ScaleMode, Sharpen, WorkerPool, derive,
};
use iiif_raster::output::{self, ScaleOutcome};
use iiif_raster::{logging, metadata};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "iiif-raster")]
#[command(about = "Scale images and read chunked-format metadata")]
#[command(long_about = "\
Scale images and read chunked-format metadata

Derivatives are produced by a separable weighted-contribution resampler
with selectable kernels and an optional unsharp mask. Metadata is read by
forward-only walkers over GIF blocks, JPEG segments and JPEG2000 boxes,
without decoding pixels.

Settings are read from iiif-raster.toml in the working directory if present
(or --config). Run 'iiif-raster gen-config' for a documented example.")]
#[command(version)]
struct Cli {
    /// Config file (default: iiif-raster.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive; overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Clone, Debug)]
struct ScaleArgs {
    /// Source image
    input: PathBuf,

    /// Output image; the extension picks the format
    output: PathBuf,

    /// Target width
    #[arg(long)]
    width: Option<u32>,

    /// Target height
    #[arg(long)]
    height: Option<u32>,

    /// Scale by percent of the source size
    #[arg(long, conflicts_with_all = ["width", "height"])]
    percent: Option<f64>,

    /// Use width and height exactly, ignoring the aspect ratio
    #[arg(long, requires_all = ["width", "height"])]
    exact: bool,

    /// Kernel name (see `filters`); default picks by scale direction
    #[arg(long)]
    filter: Option<Filter>,

    /// Unsharp-mask amount applied after scaling
    #[arg(long)]
    sharpen: Option<f32>,

    /// Encoder quality, 1-100
    #[arg(long)]
    quality: Option<u32>,

    /// Tag the output as linear light
    #[arg(long)]
    linear: bool,

    /// Bypass the derivative cache
    #[arg(long)]
    no_cache: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Produce a scaled derivative of an image
    Scale(ScaleArgs),
    /// Print metadata read from the image's chunks
    Info {
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List resampling kernels
    Filters,
    /// Print a stock iiif-raster.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(cli.config.as_deref())?;
    logging::init(cli.log_level.as_deref().unwrap_or(&config.log.level))?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Scale(args) => run_scale(&args, &config)?,
        Command::Info { input, json } => {
            let info = metadata::read_info(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                output::print_info_output(&input, &info);
            }
        }
        Command::Filters => output::print_filters(),
        Command::GenConfig => {}
    }

    Ok(())
}

fn run_scale(args: &ScaleArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let params = derive_params(args, config)?;
    let pool = WorkerPool::install_shared(config::effective_threads(&config.processing))?;
    let backend = RustBackend::new();

    if !config.cache.enabled || args.no_cache {
        let derivative = derive(&backend, &params, pool)?;
        output::print_scale_output(&args.input, &args.output, &ScaleOutcome::Rendered(derivative));
        return Ok(());
    }

    let mut cache = DerivativeCache::open(&config.cache.directory)?;
    let source_hash = cache::hash_file(&params.source)?;
    let params_hash = cache::hash_derive_params(&params);

    let outcome = match cache.restore(&source_hash, &params_hash, &params.output)? {
        Some(hit) => ScaleOutcome::Cached {
            size: (hit.width, hit.height),
        },
        None => {
            let derivative = derive(&backend, &params, pool)?;
            cache.store(&source_hash, &params_hash, &params.output, derivative.size)?;
            ScaleOutcome::Rendered(derivative)
        }
    };
    output::print_scale_output(&args.input, &args.output, &outcome);
    println!("{}", output::format_cache_stats(&cache.stats));
    Ok(())
}

/// CLI flags win over the `[scale]` config section.
fn derive_params(args: &ScaleArgs, config: &Config) -> Result<DeriveParams, String> {
    let sharpen = match args.sharpen {
        Some(amount) if !amount.is_finite() || !(0.0..=MAX_SHARPEN).contains(&amount) => {
            return Err(format!("--sharpen must be between 0 and {MAX_SHARPEN}, got {amount}"));
        }
        Some(amount) => Sharpen(amount),
        None => config.scale.sharpen(),
    };
    if let Some(q) = args.quality
        && !(1..=100).contains(&q)
    {
        return Err(format!("--quality must be between 1 and 100, got {q}"));
    }

    Ok(DeriveParams {
        source: args.input.clone(),
        output: args.output.clone(),
        mode: scale_mode(args)?,
        filter: args.filter,
        policy: config.scale.filter_policy(),
        sharpen,
        linear_output: args.linear || config.scale.linear_output,
        quality: args.quality.map(Quality::new).unwrap_or(config.scale.quality()),
    })
}

fn scale_mode(args: &ScaleArgs) -> Result<ScaleMode, String> {
    let mode = match (args.width, args.height, args.percent) {
        (Some(width), Some(height), _) if args.exact => ScaleMode::Exact { width, height },
        (Some(width), Some(height), _) => ScaleMode::Fit { width, height },
        (Some(w), None, _) => ScaleMode::Width(w),
        (None, Some(h), _) => ScaleMode::Height(h),
        (None, None, Some(p)) if p.is_finite() && p > 0.0 => ScaleMode::Percent(p),
        (None, None, Some(p)) => return Err(format!("--percent must be positive, got {p}")),
        (None, None, None) => ScaleMode::Full,
    };
    if matches!(args.width, Some(0)) || matches!(args.height, Some(0)) {
        return Err("--width and --height must be at least 1".to_string());
    }
    Ok(mode)
}
