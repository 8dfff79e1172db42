//! Run summary types.
//!
//! A [`BatchResult`] is accumulated while a run proceeds and returned to the
//! caller at the end. It prints as a human-readable summary and serializes
//! to JSON for programmatic use.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::project::ProjectHandle;

/// Aggregate outcome of a run.
#[derive(Clone, Debug, Serialize)]
pub struct BatchResult {
    pub project: ProjectHandle,
    pub total_images: usize,
    pub total_batches: usize,
    pub processed_batches: usize,
    pub successful: usize,
    pub failed: usize,
    /// One entry per failed unit.
    pub errors: Vec<UploadError>,
    /// One entry per unit, in input order.
    pub image_results: Vec<ImageResult>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn new(project: ProjectHandle, total_images: usize, total_batches: usize) -> Self {
        Self {
            project,
            total_images,
            total_batches,
            processed_batches: 0,
            successful: 0,
            failed: 0,
            errors: Vec::new(),
            image_results: Vec::with_capacity(total_images),
            elapsed: Duration::ZERO,
        }
    }

    /// Add one unit's result, updating the counters.
    pub fn record(&mut self, result: ImageResult) {
        if result.success {
            self.successful += 1;
        } else {
            self.failed += 1;
            self.errors.push(UploadError {
                filename: result.filename.clone(),
                reason: result.error.clone().unwrap_or_default(),
                attempts: result.attempts,
                batch_number: result.batch_number,
            });
        }
        self.image_results.push(result);
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Images uploaded without the annotations they should carry.
    pub fn orphaned_image_ids(&self) -> impl Iterator<Item = &str> {
        self.image_results
            .iter()
            .flat_map(|result| result.orphaned_image_ids.iter().map(String::as_str))
    }

    /// Successful uploads whose persisted annotation count differs.
    pub fn verification_mismatches(&self) -> impl Iterator<Item = &ImageResult> {
        self.image_results.iter().filter(|result| {
            result
                .verified_annotations
                .is_some_and(|found| found != result.expected_annotations)
        })
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Uploaded to project '{}' ({}{})",
            self.project.name,
            self.project.id,
            if self.project.is_new { ", new" } else { "" }
        )?;
        writeln!(
            f,
            "  {} images in {} batch(es), {} processed",
            self.total_images, self.total_batches, self.processed_batches
        )?;
        writeln!(
            f,
            "  {} succeeded, {} failed in {:.1}s",
            self.successful,
            self.failed,
            self.elapsed.as_secs_f64()
        )?;

        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures ({}):", self.errors.len())?;
            for error in &self.errors {
                writeln!(f, "  - {}", error)?;
            }
        }

        let orphans: Vec<&str> = self.orphaned_image_ids().collect();
        if !orphans.is_empty() {
            writeln!(f)?;
            writeln!(f, "Images left without annotations ({}):", orphans.len())?;
            for id in orphans {
                writeln!(f, "  - {id}")?;
            }
        }

        let mismatches: Vec<&ImageResult> = self.verification_mismatches().collect();
        if !mismatches.is_empty() {
            writeln!(f)?;
            writeln!(f, "Annotation count mismatches ({}):", mismatches.len())?;
            for result in mismatches {
                writeln!(
                    f,
                    "  - {}: expected {}, found {}",
                    result.filename,
                    result.expected_annotations,
                    result.verified_annotations.unwrap_or_default()
                )?;
            }
        }

        Ok(())
    }
}

/// A unit that failed after all its attempts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadError {
    pub filename: String,
    pub reason: String,
    pub attempts: u32,
    pub batch_number: usize,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (batch {}, {} attempt(s)): {}",
            self.filename, self.batch_number, self.attempts, self.reason
        )
    }
}

/// Outcome of one unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImageResult {
    pub filename: String,
    pub source_url: String,
    pub image_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub attempts: u32,
    /// 1-based.
    pub batch_number: usize,
    pub has_annotations: bool,
    pub expected_annotations: usize,
    pub verified_annotations: Option<usize>,
    /// Images uploaded by attempts whose annotation upload was rejected.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphaned_image_ids: Vec<String>,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectHandle {
        ProjectHandle {
            id: "coolerdata-2025-10-14".to_string(),
            name: "CoolerData 2025-10-14".to_string(),
            is_new: true,
            date_key: "2025-10-14".to_string(),
        }
    }

    fn failed(filename: &str, orphan: Option<&str>) -> ImageResult {
        ImageResult {
            filename: filename.to_string(),
            success: false,
            error: Some("HTTP 500".to_string()),
            attempts: 3,
            batch_number: 1,
            orphaned_image_ids: orphan.map(str::to_string).into_iter().collect(),
            ..ImageResult::default()
        }
    }

    #[test]
    fn record_updates_counters_and_errors() {
        let mut result = BatchResult::new(project(), 2, 1);
        result.record(ImageResult {
            filename: "a.jpg".to_string(),
            success: true,
            attempts: 1,
            batch_number: 1,
            ..ImageResult::default()
        });
        result.record(failed("b.jpg", None));

        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(
            result.errors,
            vec![UploadError {
                filename: "b.jpg".to_string(),
                reason: "HTTP 500".to_string(),
                attempts: 3,
                batch_number: 1,
            }]
        );
        assert!(!result.is_complete_success());
    }

    #[test]
    fn display_lists_failures_and_orphans() {
        let mut result = BatchResult::new(project(), 1, 1);
        result.record(failed("b.jpg", Some("img0001")));
        let text = result.to_string();

        assert!(text.contains("CoolerData 2025-10-14"));
        assert!(text.contains("0 succeeded, 1 failed"));
        assert!(text.contains("b.jpg (batch 1, 3 attempt(s)): HTTP 500"));
        assert!(text.contains("Images left without annotations (1):"));
        assert!(text.contains("img0001"));
    }

    #[test]
    fn json_reports_elapsed_millis() {
        let mut result = BatchResult::new(project(), 0, 0);
        result.elapsed = Duration::from_millis(1500);
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["elapsed_ms"], 1500);
        assert_eq!(value["project"]["date_key"], "2025-10-14");
    }

    #[test]
    fn mismatched_verification_is_reported() {
        let mut result = BatchResult::new(project(), 1, 1);
        result.record(ImageResult {
            filename: "a.jpg".to_string(),
            success: true,
            has_annotations: true,
            expected_annotations: 5,
            verified_annotations: Some(3),
            ..ImageResult::default()
        });
        assert_eq!(result.verification_mismatches().count(), 1);
        assert!(result.to_string().contains("a.jpg: expected 5, found 3"));
    }
}
