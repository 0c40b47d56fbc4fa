//! georefine CLI: tile planning, refinement screening, parameter presets.
//!
//! Log lines go to stderr. `--verbose` raises the georefine crates to debug
//! level; `GEOREFINE_LOG` takes `env_logger` style directives (or
//! `tracing-subscriber` ones with the `tracing` feature) and overrides both.
//! Ctrl-C during `screen` stops the loop before its next step and exits
//! with an error instead of a report.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use georefine::core::Ellipsoid;
use georefine::raster::{
    plan_export, GeoBounds, MetresPerUnit, MetricExtent, RasterExportConfig, RasterIoError,
    TilingError,
};
use georefine::refine::{CancelFlag, RefineIoError, RefinementParams, RefinementPreset};
use georefine::screen::{screen_file_with_cancel, ScreenError};
use log::{info, LevelFilter};

const LOG_ENV: &str = "GEOREFINE_LOG";

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("failed to install logger: {0}")]
    Logger(String),
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error(transparent)]
    RasterIo(#[from] RasterIoError),
    #[error(transparent)]
    Tiling(#[from] TilingError),
    #[error("failed to read parameters: {0}")]
    Params(#[from] RefineIoError),
    #[error(transparent)]
    Screen(#[from] ScreenError),
    #[error("failed to write {path}: {source}")]
    WriteReport {
        path: String,
        #[source]
        source: RefineIoError,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "georefine")]
#[command(about = "Camera-position accuracy refinement and raster tile planning")]
#[command(version)]
struct Cli {
    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan orthomosaic and DEM export tiles, printed as JSON.
    Tiles(TilesArgs),

    /// Run the refinement loop over an exported pose snapshot.
    Screen(ScreenArgs),

    /// Print a parameter preset as JSON.
    Params {
        #[arg(long, value_enum, default_value_t = PresetArg::RtkRatio)]
        preset: PresetArg,
    },
}

#[derive(Debug, Clone, Args)]
struct TilesArgs {
    /// Footprint width in metres.
    #[arg(long)]
    size_x: Option<f64>,

    /// Footprint height in metres.
    #[arg(long)]
    size_y: Option<f64>,

    /// Geographic footprint as `west,south,east,north` in degrees (WGS84).
    /// Pixel steps are then reported in degrees.
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["size_x", "size_y"])]
    bounds: Option<Vec<f64>>,

    /// Export configuration (JSON); flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Orthomosaic ground sample distance in metres.
    #[arg(long)]
    ortho_gsd: Option<f64>,

    /// Elevation-model ground sample distance in metres.
    #[arg(long)]
    dem_gsd: Option<f64>,

    /// Maximum tile edge in pixels.
    #[arg(long)]
    max_pix: Option<u32>,

    /// Rounding bias added before computing tile counts.
    #[arg(long)]
    block_offset: Option<f64>,
}

#[derive(Debug, Clone, Args)]
struct ScreenArgs {
    /// Pose snapshot (JSON).
    #[arg(long)]
    input: PathBuf,

    #[arg(long, value_enum, default_value_t = PresetArg::RtkRatio)]
    preset: PresetArg,

    /// Parameter file (JSON); replaces the preset.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    RtkRatio,
    RtkLinear,
    RtkOrientation,
}

impl From<PresetArg> for RefinementPreset {
    fn from(value: PresetArg) -> Self {
        match value {
            PresetArg::RtkRatio => RefinementPreset::RtkRatio,
            PresetArg::RtkLinear => RefinementPreset::RtkLinear,
            PresetArg::RtkOrientation => RefinementPreset::RtkOrientation,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Level for targets under `georefine*`; everything else stays at warn.
fn crate_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: bool) -> CliResult<()> {
    use std::io::Write;

    // Module filters match by prefix, so this also covers georefine_refine
    // and georefine_raster.
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module("georefine", crate_level(verbose))
        .parse_env(env_logger::Env::new().filter(LOG_ENV))
        .format(|buf, record| {
            let target = record.target();
            let module = target.split_once("::").map_or(target, |(_, rest)| rest);
            writeln!(buf, "[{:>5} {module}] {}", record.level(), record.args())
        })
        .try_init()
        .map_err(|err| CliError::Logger(err.to_string()))
}

#[cfg(feature = "tracing")]
fn init_logging(verbose: bool) -> CliResult<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let level = crate_level(verbose).as_str().to_ascii_lowercase();
        EnvFilter::new(format!("warn,georefine={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| CliError::Logger(err.to_string()))
}

/// Flag raised by the first Ctrl-C.
fn interrupt_flag() -> CliResult<CancelFlag> {
    let flag = CancelFlag::new();
    let on_interrupt = flag.clone();
    ctrlc::set_handler(move || {
        eprintln!("received Ctrl-C, stopping before the next step");
        on_interrupt.cancel();
    })?;
    Ok(flag)
}

fn run(cli: Cli) -> CliResult<()> {
    init_logging(cli.verbose)?;
    match cli.command {
        Commands::Tiles(args) => run_tiles(&args),
        Commands::Screen(args) => run_screen(&args),
        Commands::Params { preset } => {
            let params = RefinementPreset::from(preset).params();
            println!("{}", serde_json::to_string_pretty(&params)?);
            Ok(())
        }
    }
}

fn export_config(args: &TilesArgs) -> CliResult<RasterExportConfig> {
    let mut config = match &args.config {
        Some(path) => RasterExportConfig::load_json(path)?,
        None => RasterExportConfig::default(),
    };
    if args.ortho_gsd.is_some() {
        config.ortho_gsd = args.ortho_gsd;
    }
    if args.dem_gsd.is_some() {
        config.dem_gsd = args.dem_gsd;
    }
    if let Some(max) = args.max_pix {
        config.tiling.max_tile_pixels = max;
    }
    if let Some(offset) = args.block_offset {
        config.tiling.block_offset = offset;
    }
    if config.ortho_gsd.is_none() && config.dem_gsd.is_none() {
        return Err(CliError::Usage(
            "nothing to plan; provide --ortho-gsd and/or --dem-gsd".to_string(),
        ));
    }
    Ok(config)
}

fn footprint(args: &TilesArgs) -> CliResult<(MetricExtent, MetresPerUnit)> {
    match (&args.bounds, args.size_x, args.size_y) {
        (Some(b), _, _) => {
            let &[west, south, east, north] = b.as_slice() else {
                return Err(CliError::Usage(format!(
                    "--bounds takes 4 values (west,south,east,north), got {}",
                    b.len()
                )));
            };
            if !(west < east && south < north) {
                return Err(CliError::Usage(format!(
                    "--bounds must satisfy west < east and south < north, got {west},{south},{east},{north}"
                )));
            }
            let bounds = GeoBounds::new(west, south, east, north);
            let ellipsoid = Ellipsoid::WGS84;
            Ok((
                bounds.metric_extent(&ellipsoid),
                bounds.metres_per_degree(&ellipsoid),
            ))
        }
        (None, Some(size_x), Some(size_y)) => {
            Ok((MetricExtent { size_x, size_y }, MetresPerUnit::METRIC))
        }
        _ => Err(CliError::Usage(
            "provide either --size-x and --size-y or --bounds".to_string(),
        )),
    }
}

fn run_tiles(args: &TilesArgs) -> CliResult<()> {
    let config = export_config(args)?;
    let (extent, scale) = footprint(args)?;
    info!("footprint {:.1} m x {:.1} m", extent.size_x, extent.size_y);
    let plan = plan_export(&extent, &scale, &config)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn run_screen(args: &ScreenArgs) -> CliResult<()> {
    let params = match &args.params {
        Some(path) => RefinementParams::load_json(path)?,
        None => RefinementPreset::from(args.preset).params(),
    };
    let report = screen_file_with_cancel(&args.input, params, interrupt_flag()?)?;
    info!(
        "{} of {} poses kept, {} disabled",
        report.report.enabled,
        report.report.eligible,
        report.disabled_poses.len()
    );
    match &args.output {
        Some(path) => {
            report
                .write_json(path)
                .map_err(|source| CliError::WriteReport {
                    path: path.display().to_string(),
                    source,
                })?;
            info!("report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
