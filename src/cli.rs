//! Command-line interface components.

use crate::composite::{CompositeHeader, LayoutVersion};
use crate::config::{DEFAULT_CLUTTER_SUBSTITUTE, DEFAULT_NA_SUBSTITUTE, PipelineConfig};
use crate::error::RadolanError;
use crate::models::{NestingMode, OutputMode, ProcessingStats};
use crate::processor::{GridOutput, Pipeline, PipelineOutput, ProgressBarSink, collect_stats};
use crate::projection::{ProjectionSpec, StereographicEngine};
use crate::stack::Selection;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "radolan")]
#[command(about = "Stage, decode and stack DWD RADOLAN binary radar composites")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Archives (tar, tar.gz, nested) or single composite files
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory members are staged into (defaults to the user cache directory)
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// 1-based member positions to keep, e.g. 1,3,5
    #[arg(long, value_name = "LIST")]
    pub select: Option<Selection>,

    /// Return individual layers instead of one stack per archive
    #[arg(long)]
    pub layers: bool,

    /// Named projection to attach (radolan, rw, seasonal, none)
    #[arg(long, value_name = "NAME", conflicts_with = "crs")]
    pub projection: Option<String>,

    /// Custom PROJ definition, used together with --extent
    #[arg(long, value_name = "PROJ", requires = "extent")]
    pub crs: Option<String>,

    /// Custom extent as xmin,xmax,ymin,ymax
    #[arg(long, value_name = "EXTENT", requires = "crs", allow_hyphen_values = true)]
    pub extent: Option<String>,

    /// Reproject grids onto a geographic lon/lat grid
    #[arg(long)]
    pub geographic: bool,

    /// Substitute for no-data cells
    #[arg(long, default_value_t = DEFAULT_NA_SUBSTITUTE, allow_negative_numbers = true)]
    pub na: f64,

    /// Substitute for clutter cells
    #[arg(long, default_value_t = DEFAULT_CLUTTER_SUBSTITUTE, allow_negative_numbers = true)]
    pub clutter: f64,

    /// Cell bit layout (composite-v1, radolan-secondary)
    #[arg(long, value_name = "VERSION", default_value = "composite-v1")]
    pub layout: LayoutVersion,

    /// Number of concurrent workers (defaults to the CPU count)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Glob restricting the staged members, e.g. "*---bin"
    #[arg(long, value_name = "GLOB")]
    pub pattern: Option<String>,

    /// Treat archives as archives of archives without inspecting them
    #[arg(long)]
    pub nested: bool,

    /// Print composite headers only, without decoding payloads
    #[arg(long)]
    pub inspect: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Projection requested on the command line, if any
    pub fn projection_spec(&self) -> Result<Option<ProjectionSpec>> {
        if let (Some(crs), Some(extent)) = (&self.crs, &self.extent) {
            return Ok(Some(ProjectionSpec::Custom {
                crs: crs.clone(),
                extent: parse_extent(extent)?,
            }));
        }

        match self.projection.as_deref() {
            None | Some("none") => Ok(None),
            Some(name) => name
                .parse()
                .map(Some)
                .map_err(|e: String| anyhow::anyhow!(e)),
        }
    }

    /// Build the pipeline configuration from the arguments
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::default()
            .with_substitutes(self.na, self.clutter)
            .with_layout(self.layout);

        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(dir) = &self.staging_dir {
            config = config.with_staging_root(dir);
        }
        if let Some(selection) = &self.select {
            config = config.with_selection(selection.clone());
        }
        if self.layers {
            config = config.with_output_mode(OutputMode::Layers);
        }
        if let Some(projection) = self.projection_spec()? {
            config = config.with_projection(projection);
        }
        if self.geographic {
            config = config.with_reprojection();
        }
        if let Some(pattern) = &self.pattern {
            config = config.with_member_pattern(pattern);
        }
        if self.nested {
            config = config.with_nesting(NestingMode::Nested);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn parse_extent(text: &str) -> Result<[f64; 4]> {
    let values = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid extent value '{part}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    match values.as_slice() {
        &[xmin, xmax, ymin, ymax] => Ok([xmin, xmax, ymin, ymax]),
        _ => bail!("Extent needs four values (xmin,xmax,ymin,ymax), got {}", values.len()),
    }
}

/// Set up structured logging based on CLI arguments
pub fn setup_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("radolan_ingest={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();

    debug!("Logging initialized at level: {}", level);
}

/// Run the command described by `args`
pub async fn run(args: Args, cancellation: CancellationToken) -> Result<ProcessingStats> {
    let config = args.to_config()?;
    let mut pipeline = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .with_cancellation(cancellation);
    if args.geographic {
        pipeline = pipeline.with_engine(Arc::new(StereographicEngine::new()));
    }

    if args.inspect {
        return inspect(&pipeline, &args.inputs).await;
    }

    println!("{}", "Starting RADOLAN ingestion".bright_green().bold());
    println!(
        "  {} {}",
        "Staging:".bright_cyan(),
        pipeline.config().staging_root.display()
    );
    println!(
        "  {} {}",
        "Inputs:".bright_cyan(),
        args.inputs.len().to_string().bright_white().bold()
    );

    let start = Instant::now();
    let pipeline = pipeline.with_progress(Arc::new(ProgressBarSink::new()));
    let results = pipeline.run(&args.inputs).await;
    let stats = collect_stats(&results, start.elapsed());

    print_results(&results);
    print_summary(&stats);

    if stats.archives_processed == 0 && stats.archives_failed > 0 {
        bail!("All {} inputs failed", stats.archives_failed);
    }
    Ok(stats)
}

async fn inspect(pipeline: &Pipeline, inputs: &[PathBuf]) -> Result<ProcessingStats> {
    let start = Instant::now();
    let mut stats = ProcessingStats::default();

    for input in inputs {
        println!("\n{} {}", "Input:".bright_cyan(), input.display());
        match pipeline.inspect(input).await {
            Ok(headers) => {
                stats.archives_processed += 1;
                for (member, header) in headers {
                    match header {
                        Ok(header) => {
                            stats.layers_decoded += 1;
                            print_header(&member, &header);
                        }
                        Err(e) => {
                            stats.layers_failed += 1;
                            println!("  {} {}: {}", "✗".bright_red(), short(&member), e);
                        }
                    }
                }
            }
            Err(e) => {
                stats.archives_failed += 1;
                println!("  {} {}", "✗".bright_red(), e);
            }
        }
    }

    stats.processing_time_ms = start.elapsed().as_millis();
    Ok(stats)
}

fn short(path: &Path) -> String {
    crate::filesystem::file_name_string(path)
}

fn print_header(member: &Path, header: &CompositeHeader) {
    println!(
        "  {} {} {} {}x{} E-{} {} bytes, {} radars",
        short(member).bright_white(),
        header.product.bright_yellow(),
        header.timestamp.format("%Y-%m-%d %H:%M UTC"),
        header.rows,
        header.cols,
        -header.precision,
        header.declared_length,
        header.radars.len()
    );
}

fn print_results(results: &BTreeMap<PathBuf, Result<PipelineOutput, RadolanError>>) {
    println!();
    for (input, result) in results {
        match result {
            Ok(output) => print_output(input, output),
            Err(e) => println!("{} {}: {}", "✗".bright_red(), short(input), e),
        }
    }
}

fn print_output(input: &Path, output: &PipelineOutput) {
    match &output.grids {
        GridOutput::Stack(stack) => {
            let (rows, cols) = stack.dims();
            let summary = stack.summary();
            println!(
                "{} {}: {} layers of {}x{}",
                "✓".bright_green(),
                short(input),
                stack.len().to_string().bright_white().bold(),
                rows,
                cols
            );
            if let (Some(first), Some(last)) = (
                stack.metadata.timestamps.first(),
                stack.metadata.timestamps.last(),
            ) {
                println!("    {} {} .. {}", "Period:".bright_cyan(), first, last);
            }
            println!(
                "    {} {} valid, {} no-data, {} clutter",
                "Cells:".bright_cyan(),
                summary.valid_cells,
                summary.no_data_cells,
                summary.clutter_cells
            );
            if let (Some(min), Some(max), Some(mean)) = (summary.min, summary.max, summary.mean) {
                println!(
                    "    {} min {:.2}, max {:.2}, mean {:.3}",
                    "Values:".bright_cyan(),
                    min,
                    max,
                    mean
                );
            }
            if let Some(crs) = &stack.spatial.crs {
                println!("    {} {}", "CRS:".bright_cyan(), crs);
            }
        }
        GridOutput::Layers(batch) => {
            println!(
                "{} {}: {} layers, {} failed",
                "✓".bright_green(),
                short(input),
                batch.layers.len().to_string().bright_white().bold(),
                batch.failures.len()
            );
            for failure in &batch.failures {
                println!(
                    "    {} {}: {}",
                    "✗".bright_red(),
                    short(&failure.member),
                    failure.error
                );
            }
        }
    }
}

fn print_summary(stats: &ProcessingStats) {
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}",
        "Inputs processed:".bright_cyan(),
        stats.archives_processed
    );
    if stats.archives_failed > 0 {
        println!(
            "  {} {}",
            "Inputs failed:".bright_red(),
            stats.archives_failed
        );
    }
    println!(
        "  {} {}",
        "Members extracted:".bright_cyan(),
        stats.members_extracted
    );
    println!("  {} {}", "Layers decoded:".bright_cyan(), stats.layers_decoded);
    if stats.layers_failed > 0 {
        println!("  {} {}", "Layers failed:".bright_red(), stats.layers_failed);
    }
    println!(
        "  {} {:.2}s",
        "Processing time:".bright_cyan(),
        stats.processing_time_ms as f64 / 1000.0
    );
}
