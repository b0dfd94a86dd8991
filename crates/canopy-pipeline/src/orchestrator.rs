//! Batch orchestration across images.
//!
//! Every image runs the full [`Pipeline`] independently. A failure in
//! one image is recorded and never aborts the others. Records come back
//! in input order, then plot order, regardless of whether the
//! `threading` feature spreads images across a thread pool.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{
    BatchDiagnostics, BatchSummary, Clock, ImageDiagnostics, NoClock, StageDiagnostics,
    StageMetrics,
};
use crate::load::RasterSource;
use crate::locate::PlotCatalog;
use crate::pipeline::{Pipeline, Reduced};
use crate::types::{CanopyCoverRecord, Cover, ErrorKind, PipelineConfig, PipelineError, PlotId};

/// A failed (image, plot) unit, or a failed image when `plot` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    /// Identifier of the source image.
    pub image: String,
    /// Plot that failed, or `None` if the whole image failed.
    pub plot: Option<PlotId>,
    /// Coarse error category.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl UnitFailure {
    /// A failure that prevented an image from producing any record.
    #[must_use]
    pub fn for_image(image: &str, error: &PipelineError) -> Self {
        Self {
            image: image.to_string(),
            plot: None,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// A failure confined to one plot of an image.
    #[must_use]
    pub fn for_plot(image: &str, plot: PlotId, error: &PipelineError) -> Self {
        Self {
            plot: Some(plot),
            ..Self::for_image(image, error)
        }
    }
}

/// Overall shape of a batch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// No failures.
    Complete,
    /// Some failures, and at least one record carries a percentage.
    Partial,
    /// Failures and no percentage anywhere.
    TotalFailure,
}

/// Records and failures from one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Number of input images attempted.
    pub images: usize,
    /// Records in input order, then plot order.
    pub records: Vec<CanopyCoverRecord>,
    /// Image- and plot-level failures in input order.
    pub failures: Vec<UnitFailure>,
}

impl BatchResult {
    /// Number of records carrying a percentage.
    #[must_use]
    pub fn percent_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.cover, Cover::Percent(_)))
            .count()
    }

    /// Number of images that failed before producing any record.
    #[must_use]
    pub fn failed_images(&self) -> usize {
        self.failures.iter().filter(|f| f.plot.is_none()).count()
    }

    /// Classify the batch.
    #[must_use]
    pub fn outcome(&self) -> BatchOutcome {
        if self.failures.is_empty() {
            BatchOutcome::Complete
        } else if self.percent_count() > 0 {
            BatchOutcome::Partial
        } else {
            BatchOutcome::TotalFailure
        }
    }

    fn push(&mut self, outcome: Result<Reduced, UnitFailure>) {
        self.images += 1;
        match outcome {
            Ok(reduced) => {
                let (records, failures) = reduced.into_parts();
                self.records.extend(records);
                self.failures.extend(failures);
            }
            Err(failure) => self.failures.push(failure),
        }
    }
}

/// Runs the canopy cover pipeline over a batch of images.
///
/// Holds the validated, immutable configuration for the run.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: PipelineConfig,
}

impl Orchestrator {
    /// Validate `config` and build an orchestrator around it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the config fails
    /// [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage for one image.
    ///
    /// # Errors
    ///
    /// Returns the first image-level [`PipelineError`]. Plot-level
    /// failures are carried inside the returned [`Reduced`].
    pub fn process<S: RasterSource + ?Sized>(
        &self,
        source: &S,
        catalog: &PlotCatalog,
    ) -> Result<Reduced, PipelineError> {
        Ok(Pipeline::new(source, &self.config)
            .load()?
            .locate(catalog)?
            .segment()?
            .reduce())
    }

    /// Run the pipeline over `sources`.
    pub fn run<S: RasterSource + Sync>(&self, sources: &[S], catalog: &PlotCatalog) -> BatchResult {
        self.run_with_diagnostics(sources, catalog, &NoClock).0
    }

    /// Run the pipeline over `sources`, timing each stage with `clock`.
    pub fn run_with_diagnostics<S, C>(
        &self,
        sources: &[S],
        catalog: &PlotCatalog,
        clock: &C,
    ) -> (BatchResult, BatchDiagnostics)
    where
        S: RasterSource + Sync,
        C: Clock + Sync,
    {
        let batch_start = clock.now();
        tracing::info!(images = sources.len(), plots = catalog.len(), "processing batch");

        let outcomes = map_ordered(sources, |source| self.process_timed(source, catalog, clock));

        let mut result = BatchResult::default();
        let mut images = Vec::with_capacity(outcomes.len());
        for (outcome, diagnostics) in outcomes {
            if let Err(failure) = &outcome {
                tracing::warn!(image = %failure.image, error = %failure.message, "image failed");
            }
            result.push(outcome);
            images.push(diagnostics);
        }

        let summary = BatchSummary {
            image_count: result.images,
            failed_image_count: result.failed_images(),
            record_count: result.records.len(),
            percent_record_count: result.percent_count(),
            failure_count: result.failures.len(),
        };
        tracing::info!(
            images = summary.image_count,
            records = summary.record_count,
            with_cover = summary.percent_record_count,
            failures = summary.failure_count,
            "batch complete"
        );

        let diagnostics = BatchDiagnostics {
            images,
            total_duration: clock.elapsed(&batch_start),
            summary,
        };
        (result, diagnostics)
    }

    fn process_timed<S, C>(
        &self,
        source: &S,
        catalog: &PlotCatalog,
        clock: &C,
    ) -> (Result<Reduced, UnitFailure>, ImageDiagnostics)
    where
        S: RasterSource + ?Sized,
        C: Clock,
    {
        let start = clock.now();
        let mut diagnostics = ImageDiagnostics {
            image: source.id().to_string(),
            load: None,
            locate: None,
            segment: None,
            reduce: None,
            total_duration: Duration::ZERO,
            error: None,
        };

        let outcome = self
            .timed_stages(source, catalog, clock, &mut diagnostics)
            .map_err(|err| {
                diagnostics.error = Some(err.to_string());
                UnitFailure::for_image(source.id(), &err)
            });
        diagnostics.total_duration = clock.elapsed(&start);
        (outcome, diagnostics)
    }

    fn timed_stages<S, C>(
        &self,
        source: &S,
        catalog: &PlotCatalog,
        clock: &C,
        diagnostics: &mut ImageDiagnostics,
    ) -> Result<Reduced, PipelineError>
    where
        S: RasterSource + ?Sized,
        C: Clock,
    {
        let t = clock.now();
        let loaded = Pipeline::new(source, &self.config).load()?;
        diagnostics.load = Some(stage(clock.elapsed(&t), loaded.metrics()));

        let t = clock.now();
        let located = loaded.locate(catalog)?;
        diagnostics.locate = Some(stage(clock.elapsed(&t), located.metrics()));

        let t = clock.now();
        let segmented = located.segment()?;
        diagnostics.segment = Some(stage(clock.elapsed(&t), segmented.metrics()));

        let t = clock.now();
        let reduced = segmented.reduce();
        diagnostics.reduce = Some(stage(clock.elapsed(&t), reduced.metrics()));

        Ok(reduced)
    }
}

const fn stage(duration: Duration, metrics: StageMetrics) -> StageDiagnostics {
    StageDiagnostics { duration, metrics }
}

/// Map `f` over `items`, preserving input order in the output.
#[cfg(feature = "threading")]
fn map_ordered<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    use rayon::prelude::*;
    items.par_iter().map(f).collect()
}

/// Map `f` over `items`, preserving input order in the output.
#[cfg(not(feature = "threading"))]
fn map_ordered<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    items.iter().map(f).collect()
}
