//! canopycover: plot-level canopy cover from georeferenced field imagery.
//!
//! Segments plants from soil in each input image, clips the mask to the
//! plots of a GeoJSON catalog (or uses the whole image when no catalog
//! is given), and writes the per-plot canopy cover percentages as CSV
//! together with a `result.json` manifest.
//!
//! # Usage
//!
//! ```text
//! canopycover [OPTIONS] <INPUTS>...
//! canopycover --plots plots.geojson --working-space out/ --timestamp 2017-06-01T14:03:22 images/
//! ```
//!
//! The exit code is `0` when at least one plot received a percentage.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod logger;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use canopy_export::TraitsOptions;
use canopy_io::{FileSource, discover_inputs, load_catalog, write_diagnostics, write_outputs};
use canopy_pipeline::{Clock, Orchestrator, PipelineConfig, PlotCatalog, Provenance, SmoothingKernel};

/// Plot-level canopy cover from georeferenced field imagery.
///
/// Accepts GeoTIFF, PNG and JPEG images, or directories containing them.
/// Single-band binary images are treated as pre-computed plant masks.
#[derive(Parser)]
#[command(name = "canopycover", version)]
struct Cli {
    /// Image files or directories of images (directories are not searched recursively).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// GeoJSON FeatureCollection of plot boundaries.
    ///
    /// Without it, each image is measured as a single whole-image plot.
    #[arg(long)]
    plots: Option<PathBuf>,

    /// Directory receiving the CSV files and result.json.
    #[arg(long, default_value = ".")]
    working_space: PathBuf,

    /// Citation author written to every record.
    #[arg(long)]
    citation_author: Option<String>,

    /// Citation title written to every record.
    #[arg(long)]
    citation_title: Option<String>,

    /// Citation year (defaults to the year of --timestamp).
    #[arg(long)]
    citation_year: Option<String>,

    /// Species for plots whose catalog entry has none.
    #[arg(long, alias = "germplasm-name")]
    species: Option<String>,

    /// Capture timestamp in ISO 8601 (YYYY-MM-DDTHH:MM:SS).
    #[arg(long)]
    timestamp: Option<String>,

    /// Box smoothing radius applied to the segmentation mask (0 disables).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_RADIUS)]
    blur_radius: u32,

    /// Use Gaussian smoothing with this sigma instead of the box filter.
    #[arg(long, conflicts_with = "blur_radius")]
    gaussian_sigma: Option<f32>,

    /// Largest share of no-data pixels a plot may contain (0.0-1.0).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MAX_NODATA_FRACTION)]
    max_nodata_fraction: f64,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline and provenance flags are
    /// ignored. The JSON must be a valid `PipelineConfig` serialization;
    /// omitted fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Keep no-data (-1) and failed (-9999) rows in the trait CSV.
    #[arg(long)]
    include_sentinels: bool,

    /// Print a per-stage timing report and write diagnostics.json.
    #[arg(long)]
    diagnostics: bool,

    /// Log filter (e.g. `debug`, `canopy_pipeline=trace`); overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).context("parsing --config-json");
    }

    let smoothing = cli.gaussian_sigma.map_or(
        SmoothingKernel::Box {
            radius: cli.blur_radius,
        },
        |sigma| SmoothingKernel::Gaussian { sigma },
    );

    let unknown = || Provenance::UNKNOWN.to_string();
    let provenance = Provenance {
        citation_author: cli.citation_author.clone().unwrap_or_else(unknown),
        citation_title: cli.citation_title.clone().unwrap_or_else(unknown),
        citation_year: cli.citation_year.clone(),
        species: cli.species.clone().unwrap_or_else(unknown),
        timestamp: cli.timestamp.clone(),
        ..Provenance::default()
    };

    Ok(PipelineConfig {
        smoothing,
        max_nodata_fraction: cli.max_nodata_fraction,
        provenance,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.log_level.as_deref());

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = config_from_cli(cli)?;
    let orchestrator = Orchestrator::new(config).context("invalid pipeline configuration")?;

    let catalog = match &cli.plots {
        Some(path) => load_catalog(path)
            .with_context(|| format!("loading plot catalog {}", path.display()))?,
        None => PlotCatalog::empty(),
    };

    let sources: Vec<FileSource> = discover_inputs(&cli.inputs)
        .context("finding input images")?
        .into_iter()
        .map(FileSource::new)
        .collect();
    info!(images = sources.len(), plots = catalog.len(), "starting run");

    let (batch, diagnostics) = orchestrator.run_with_diagnostics(&sources, &catalog, &StdClock);

    if cli.diagnostics {
        eprintln!("{}", diagnostics.report());
        let path = write_diagnostics(&cli.working_space, &diagnostics)
            .context("writing diagnostics")?;
        info!(path = %path.display(), "wrote diagnostics");
    }

    let options = TraitsOptions {
        include_sentinels: cli.include_sentinels,
    };
    let manifest =
        write_outputs(&cli.working_space, &batch, options).context("writing outputs")?;
    println!("{}", manifest.to_json()?);

    Ok(if manifest.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
