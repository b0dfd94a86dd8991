//! Pipeline diagnostics: timing and counts for each stage of each image.
//!
//! Collected by [`Orchestrator::run_with_diagnostics`](crate::Orchestrator::run_with_diagnostics).
//! The core crate never reads the system clock itself; callers supply a
//! [`Clock`], so tests and embedders without a wall clock can pass
//! [`NoClock`].
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic time for stage measurements.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A clock that never advances. Every duration is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) -> Self::Instant {}

    fn elapsed(&self, _since: &Self::Instant) -> Duration {
        Duration::ZERO
    }
}

/// Diagnostics for a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDiagnostics {
    /// Per-image diagnostics, in input order.
    pub images: Vec<ImageDiagnostics>,
    /// Wall-clock duration of the batch (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all images.
    pub summary: BatchSummary,
}

/// Diagnostics for one image.
///
/// Stages after a failure are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDiagnostics {
    /// Identifier of the source image.
    pub image: String,
    /// Raster decoding.
    pub load: Option<StageDiagnostics>,
    /// Plot location.
    pub locate: Option<StageDiagnostics>,
    /// Segmentation (or mask pass-through).
    pub segment: Option<StageDiagnostics>,
    /// Clipping and reduction across all plots.
    pub reduce: Option<StageDiagnostics>,
    /// Wall-clock duration for this image (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Error message when the image failed before producing records.
    pub error: Option<String>,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Raster decoding metrics.
    Load {
        /// Raster width in pixels.
        width: u32,
        /// Raster height in pixels.
        height: u32,
        /// Number of channels after normalization.
        channels: u8,
        /// Whether a geotransform was found.
        georeferenced: bool,
        /// EPSG code of the raster CRS, when declared.
        epsg: Option<u32>,
    },
    /// Plot location metrics.
    Locate {
        /// Number of plot boundaries applied to the image.
        plot_count: usize,
        /// Whether the synthetic whole-image boundary was used.
        whole_image: bool,
    },
    /// Segmentation metrics.
    Segment {
        /// Whether the raster was already a mask.
        passthrough: bool,
        /// Number of plant pixels in the mask.
        foreground_pixels: u64,
        /// Total pixels in the mask.
        pixel_count: u64,
    },
    /// Clip and reduce metrics.
    Reduce {
        /// Plots reduced.
        plot_count: usize,
        /// Plots with a percentage.
        percent_count: usize,
        /// Plots reported as no-data.
        nodata_count: usize,
        /// Plots whose computation failed.
        failed_count: usize,
    },
}

/// High-level summary counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of input images.
    pub image_count: usize,
    /// Images that failed before producing records.
    pub failed_image_count: usize,
    /// Records produced.
    pub record_count: usize,
    /// Records carrying a percentage.
    pub percent_record_count: usize,
    /// Failures recorded (image and plot level).
    pub failure_count: usize,
}

impl BatchDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Canopy Cover Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Images: {} ({} failed)  |  Records: {} ({} with cover)  |  Failures: {}",
            self.summary.image_count,
            self.summary.failed_image_count,
            self.summary.record_count,
            self.summary.percent_record_count,
            self.summary.failure_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));

        for image in &self.images {
            lines.push(String::new());
            lines.push(format!(
                "{} ({:.3}ms)",
                image.image,
                duration_ms(image.total_duration)
            ));
            lines.push(format!(
                "{:<12} {:>10}  {}",
                "Stage", "Duration", "Details"
            ));
            lines.push("-".repeat(72));

            let stages = [
                ("Load", &image.load),
                ("Locate", &image.locate),
                ("Segment", &image.segment),
                ("Reduce", &image.reduce),
            ];
            for (name, diag) in stages {
                if let Some(diag) = diag {
                    let ms = duration_ms(diag.duration);
                    let details = format_metrics(&diag.metrics);
                    lines.push(format!("{name:<12} {ms:>8.3}ms  {details}"));
                }
            }
            if let Some(error) = &image.error {
                lines.push(format!("error: {error}"));
            }
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Load {
            width,
            height,
            channels,
            georeferenced,
            epsg,
        } => {
            let georef = match (georeferenced, epsg) {
                (false, _) => "not georeferenced".to_string(),
                (true, Some(code)) => format!("EPSG:{code}"),
                (true, None) => "unknown CRS".to_string(),
            };
            format!("{width}x{height}x{channels} {georef}")
        }
        StageMetrics::Locate {
            plot_count,
            whole_image,
        } => {
            if *whole_image {
                "whole image".to_string()
            } else {
                format!("{plot_count} plots")
            }
        }
        StageMetrics::Segment {
            passthrough,
            foreground_pixels,
            pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let share = if *pixel_count > 0 {
                *foreground_pixels as f64 / *pixel_count as f64 * 100.0
            } else {
                0.0
            };
            let mode = if *passthrough { "mask" } else { "segmented" };
            format!("{mode} plant={foreground_pixels} ({share:.1}%)")
        }
        StageMetrics::Reduce {
            plot_count,
            percent_count,
            nodata_count,
            failed_count,
        } => format!(
            "{plot_count} plots: {percent_count} cover, {nodata_count} no-data, {failed_count} failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(ms: u64, metrics: StageMetrics) -> Option<StageDiagnostics> {
        Some(StageDiagnostics {
            duration: Duration::from_millis(ms),
            metrics,
        })
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn no_clock_reports_zero() {
        let clock = NoClock;
        let start = clock.now();
        assert_eq!(clock.elapsed(&start), Duration::ZERO);
    }

    #[test]
    fn segment_metrics_show_plant_share() {
        let details = format_metrics(&StageMetrics::Segment {
            passthrough: false,
            foreground_pixels: 25,
            pixel_count: 100,
        });
        assert_eq!(details, "segmented plant=25 (25.0%)");
    }

    #[test]
    fn report_lists_stages_and_errors() {
        let diag = BatchDiagnostics {
            images: vec![
                ImageDiagnostics {
                    image: "field_a.tif".to_string(),
                    load: stage(
                        12,
                        StageMetrics::Load {
                            width: 100,
                            height: 80,
                            channels: 3,
                            georeferenced: true,
                            epsg: Some(32612),
                        },
                    ),
                    locate: stage(
                        1,
                        StageMetrics::Locate {
                            plot_count: 2,
                            whole_image: false,
                        },
                    ),
                    segment: stage(
                        30,
                        StageMetrics::Segment {
                            passthrough: false,
                            foreground_pixels: 4000,
                            pixel_count: 8000,
                        },
                    ),
                    reduce: stage(
                        5,
                        StageMetrics::Reduce {
                            plot_count: 2,
                            percent_count: 2,
                            nodata_count: 0,
                            failed_count: 0,
                        },
                    ),
                    total_duration: Duration::from_millis(48),
                    error: None,
                },
                ImageDiagnostics {
                    image: "broken.tif".to_string(),
                    load: None,
                    locate: None,
                    segment: None,
                    reduce: None,
                    total_duration: Duration::from_millis(1),
                    error: Some("failed to decode TIFF".to_string()),
                },
            ],
            total_duration: Duration::from_millis(49),
            summary: BatchSummary {
                image_count: 2,
                failed_image_count: 1,
                record_count: 2,
                percent_record_count: 2,
                failure_count: 1,
            },
        };

        let report = diag.report();
        assert!(report.contains("Canopy Cover Diagnostics Report"));
        assert!(report.contains("EPSG:32612"));
        assert!(report.contains("segmented plant=4000 (50.0%)"));
        assert!(report.contains("error: failed to decode TIFF"));
        assert_eq!(
            report.matches("Segment ").count(),
            1,
            "stages that never ran are omitted"
        );
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let diag = StageDiagnostics {
            duration: Duration::from_millis(1500),
            metrics: StageMetrics::Locate {
                plot_count: 0,
                whole_image: true,
            },
        };
        let json = serde_json::to_value(&diag).unwrap_or_default();
        assert_eq!(json["duration"], serde_json::json!(1.5));
    }
}
