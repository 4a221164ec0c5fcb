//! Batch ingestion pipeline.
//!
//! Orchestrates staging, decoding, stacking and projection for a batch of
//! inputs. Inputs are processed concurrently; a failing input never aborts
//! its siblings, and every input gets its own entry in the result map.

pub mod progress;

#[cfg(test)]
pub mod tests;

pub use progress::{ChannelProgress, NoProgress, ProgressBarSink, ProgressEvent, ProgressSink};

use crate::composite::{CompositeDecoder, CompositeHeader, read_header};
use crate::config::PipelineConfig;
use crate::error::{RadolanError, Result};
use crate::filesystem::{archive_stem, file_name_string, is_archive_name};
use crate::grid::GridLayer;
use crate::models::{FileKind, OutputMode, ProcessingStats};
use crate::projection::{GeoEngine, Projector};
use crate::stack::{GridStack, assemble};
use crate::staging::{StagingReport, stage_archive};

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A member that could not be decoded in layer mode
#[derive(Debug)]
pub struct MemberFailure {
    pub member: PathBuf,
    pub error: RadolanError,
}

/// Layers of one input, decoded independently
#[derive(Debug, Default)]
pub struct LayerBatch {
    /// Successfully decoded layers in member order
    pub layers: Vec<GridLayer>,
    pub failures: Vec<MemberFailure>,
}

/// Grids produced for one input
#[derive(Debug)]
pub enum GridOutput {
    Stack(GridStack),
    Layers(LayerBatch),
}

/// Result of processing one input
#[derive(Debug)]
pub struct PipelineOutput {
    pub input: PathBuf,
    /// Staging outcome; empty for bare composites
    pub staging: StagingReport,
    pub grids: GridOutput,
}

impl PipelineOutput {
    pub fn stack(&self) -> Option<&GridStack> {
        match &self.grids {
            GridOutput::Stack(stack) => Some(stack),
            GridOutput::Layers(_) => None,
        }
    }

    pub fn layers(&self) -> Option<&LayerBatch> {
        match &self.grids {
            GridOutput::Layers(batch) => Some(batch),
            GridOutput::Stack(_) => None,
        }
    }

    /// Number of decoded layers
    pub fn layer_count(&self) -> usize {
        match &self.grids {
            GridOutput::Stack(stack) => stack.len(),
            GridOutput::Layers(batch) => batch.layers.len(),
        }
    }

    /// Number of members that failed to decode
    pub fn failed_count(&self) -> usize {
        match &self.grids {
            GridOutput::Stack(_) => 0,
            GridOutput::Layers(batch) => batch.failures.len(),
        }
    }
}

/// Accepted input with the directory it stages into
#[derive(Debug, Clone)]
struct InputJob {
    input: PathBuf,
    staging_dir: Option<PathBuf>,
}

/// Ingestion pipeline for RADOLAN binary grids
pub struct Pipeline {
    config: PipelineConfig,
    decoder: CompositeDecoder,
    projector: Projector,
    progress: Arc<dyn ProgressSink>,
    cancellation: CancellationToken,
    decode_permits: Arc<Semaphore>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("projector", &self.projector)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline after validating `config`
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decoder: CompositeDecoder::new(config.cell_layout()),
            projector: Projector::new(None).with_fill(config.na_substitute),
            progress: Arc::new(NoProgress),
            cancellation: CancellationToken::new(),
            decode_permits: Arc::new(Semaphore::new(config.workers)),
            config,
        })
    }

    /// Inject the engine used for geographic reprojection
    pub fn with_engine(mut self, engine: Arc<dyn GeoEngine>) -> Self {
        self.projector = Projector::new(Some(engine)).with_fill(self.config.na_substitute);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop scheduling work once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every input, returning one result per distinct input path
    pub async fn run(&self, inputs: &[PathBuf]) -> BTreeMap<PathBuf, Result<PipelineOutput>> {
        let jobs = self.plan(inputs);
        self.progress.emit(ProgressEvent::BatchStarted { inputs: jobs.len() });
        info!("Processing {} inputs with {} workers", jobs.len(), self.config.workers);

        let results: BTreeMap<PathBuf, Result<PipelineOutput>> = stream::iter(jobs)
            .map(|(input, job)| async move {
                let result = match job {
                    Ok(job) => self.process_input(job).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &result {
                    warn!("Failed to process {}: {}", input.display(), e);
                }
                self.progress.emit(ProgressEvent::ArchiveFinished {
                    archive: input.clone(),
                    succeeded: result.is_ok(),
                });
                (input, result)
            })
            .buffer_unordered(self.config.workers)
            .collect()
            .await;

        let failed = results.values().filter(|r| r.is_err()).count();
        self.progress.emit(ProgressEvent::BatchFinished {
            succeeded: results.len() - failed,
            failed,
        });
        results
    }

    /// Stage an input (if it is an archive) and read only the member headers
    pub async fn inspect(&self, input: &Path) -> Result<Vec<(PathBuf, Result<CompositeHeader>)>> {
        let job = self.accept(input, &mut HashMap::new())?;
        let (_, members) = self.stage(&job).await?;

        task::spawn_blocking(move || {
            members
                .into_iter()
                .map(|member| {
                    let header = read_header(&member);
                    (member, header)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(RadolanError::from)
    }

    /// Detect file kinds and staging directories once, at batch entry
    fn plan(&self, inputs: &[PathBuf]) -> Vec<(PathBuf, Result<InputJob>)> {
        let mut seen_stems = HashMap::new();
        let mut seen_inputs = std::collections::HashSet::new();
        inputs
            .iter()
            .filter(|input| seen_inputs.insert((*input).clone()))
            .map(|input| (input.clone(), self.accept(input, &mut seen_stems)))
            .collect()
    }

    fn accept(&self, input: &Path, seen_stems: &mut HashMap<String, PathBuf>) -> Result<InputJob> {
        match FileKind::from_path(input) {
            Some(FileKind::BinaryGrid) => {}
            Some(kind) => {
                return Err(RadolanError::UnsupportedFileKind {
                    path: input.to_path_buf(),
                    kind: kind.to_string(),
                });
            }
            None => {
                return Err(RadolanError::UnsupportedFileKind {
                    path: input.to_path_buf(),
                    kind: "unknown".to_string(),
                });
            }
        }

        if !is_archive_name(&file_name_string(input)) {
            return Ok(InputJob {
                input: input.to_path_buf(),
                staging_dir: None,
            });
        }

        let stem = archive_stem(input);
        if let Some(first) = seen_stems.get(&stem) {
            return Err(RadolanError::configuration(format!(
                "{} would share staging directory '{}' with {}",
                input.display(),
                stem,
                first.display()
            )));
        }
        seen_stems.insert(stem.clone(), input.to_path_buf());

        Ok(InputJob {
            input: input.to_path_buf(),
            staging_dir: Some(self.config.staging_root.join(stem)),
        })
    }

    /// Stage the input and return the member list in decode order
    async fn stage(&self, job: &InputJob) -> Result<(StagingReport, Vec<PathBuf>)> {
        let Some(staging_dir) = job.staging_dir.clone() else {
            let report = StagingReport {
                members: vec![job.input.clone()],
                ..Default::default()
            };
            let members = report.members.clone();
            return Ok((report, members));
        };

        let archive = job.input.clone();
        let pattern = self.config.member_pattern.clone();
        let nesting = self.config.nesting;
        let report = task::spawn_blocking(move || {
            stage_archive(&archive, &staging_dir, pattern.as_deref(), nesting)
        })
        .await??;

        debug!(
            "Staged {}: {} members, {} extracted",
            job.input.display(),
            report.members.len(),
            report.extracted
        );
        self.progress.emit(ProgressEvent::ArchiveStaged {
            archive: job.input.clone(),
            members: report.members.len(),
            extracted: report.extracted,
        });

        let members = if self.config.selection.is_empty() {
            report.members.clone()
        } else {
            self.config.selection.apply(report.members.clone())?
        };
        Ok((report, members))
    }

    async fn process_input(&self, job: InputJob) -> Result<PipelineOutput> {
        if self.cancellation.is_cancelled() {
            return Err(RadolanError::Cancelled { path: job.input });
        }
        self.progress.emit(ProgressEvent::ArchiveStarted {
            archive: job.input.clone(),
        });

        let (staging, members) = self.stage(&job).await?;
        let decoded = self.decode_members(&job.input, members).await;

        let grids = match self.config.output_mode {
            OutputMode::Stack => {
                let layers = decoded
                    .into_iter()
                    .map(|(_, result)| result)
                    .collect::<Result<Vec<_>>>()?;
                let stack = assemble(layers, None)?;
                GridOutput::Stack(self.project(stack).await?)
            }
            OutputMode::Layers => {
                let mut batch = LayerBatch::default();
                for (member, result) in decoded {
                    match result {
                        Ok(layer) => match self.project(layer).await {
                            Ok(layer) => batch.layers.push(layer),
                            Err(error) => batch.failures.push(MemberFailure { member, error }),
                        },
                        Err(error) => batch.failures.push(MemberFailure { member, error }),
                    }
                }
                GridOutput::Layers(batch)
            }
        };

        Ok(PipelineOutput {
            input: job.input,
            staging,
            grids,
        })
    }

    /// Decode members concurrently, keeping member order
    async fn decode_members(
        &self,
        archive: &Path,
        members: Vec<PathBuf>,
    ) -> Vec<(PathBuf, Result<GridLayer>)> {
        let total = members.len();
        stream::iter(members.into_iter().enumerate())
            .map(|(index, member)| self.decode_member(archive, member, index, total))
            .buffered(self.config.workers)
            .collect()
            .await
    }

    async fn decode_member(
        &self,
        archive: &Path,
        member: PathBuf,
        index: usize,
        total: usize,
    ) -> (PathBuf, Result<GridLayer>) {
        let result = self.decode_blocking(&member).await;

        match &result {
            Ok(_) => self.progress.emit(ProgressEvent::MemberDecoded {
                archive: archive.to_path_buf(),
                member: member.clone(),
                index,
                total,
            }),
            Err(e) => self.progress.emit(ProgressEvent::MemberFailed {
                archive: archive.to_path_buf(),
                member: member.clone(),
                reason: e.to_string(),
            }),
        }
        (member, result)
    }

    async fn decode_blocking(&self, member: &Path) -> Result<GridLayer> {
        let cancelled = || RadolanError::Cancelled {
            path: member.to_path_buf(),
        };
        if self.cancellation.is_cancelled() {
            return Err(cancelled());
        }

        let permit = self
            .decode_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| cancelled())?;
        if self.cancellation.is_cancelled() {
            return Err(cancelled());
        }

        let decoder = self.decoder;
        let (na, clutter) = (self.config.na_substitute, self.config.clutter_substitute);
        let path = member.to_path_buf();
        task::spawn_blocking(move || {
            let _permit = permit;
            decoder.decode(&path, na, clutter)
        })
        .await?
    }

    async fn project<G>(&self, grid: G) -> Result<G>
    where
        G: crate::projection::Georeferenced + Send + 'static,
    {
        if self.config.projection.is_none() && !self.config.reproject_to_geographic {
            return Ok(grid);
        }
        let projector = self.projector.clone();
        let spec = self.config.projection.clone();
        let reproject = self.config.reproject_to_geographic;
        task::spawn_blocking(move || projector.attach(grid, spec.as_ref(), reproject)).await?
    }
}

/// Aggregate statistics over a finished batch
pub fn collect_stats(
    results: &BTreeMap<PathBuf, Result<PipelineOutput>>,
    elapsed: Duration,
) -> ProcessingStats {
    let mut stats = ProcessingStats {
        processing_time_ms: elapsed.as_millis(),
        ..Default::default()
    };
    for result in results.values() {
        match result {
            Ok(output) => {
                stats.archives_processed += 1;
                stats.members_extracted += output.staging.extracted;
                stats.layers_decoded += output.layer_count();
                stats.layers_failed += output.failed_count();
            }
            Err(_) => stats.archives_failed += 1,
        }
    }
    stats
}
