//! Turning raw input records into upload units.
//!
//! Input is a JSON array of `{ "photosTaken": <url>, "metadata": <object> }`
//! records. Every record is validated before any unit is produced, so a
//! single malformed record stops the run before the first network call.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cooler::CoolerMetadata;
use crate::error::CoolerUploadError;

const SUFFIX_LEN: usize = 6;
const DEFAULT_EXTENSION: &str = "jpg";

/// One input record as supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "photosTaken", default)]
    pub photos_taken: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl RawRecord {
    pub fn new(photo_url: impl Into<String>, metadata: Value) -> Self {
        Self {
            photos_taken: Some(photo_url.into()),
            metadata: Some(metadata),
        }
    }
}

/// Dataset partition an image is uploaded into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated image ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadUnit {
    pub source_url: String,
    /// Generated name, unique within the run.
    pub filename: String,
    pub tags: BTreeSet<String>,
    pub split: Split,
    pub annotation_tree: Option<CoolerMetadata>,
}

impl UploadUnit {
    /// Tags joined the way the upload endpoint expects them.
    pub fn tag_names(&self) -> String {
        self.tags.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}

/// Read a JSON array of records from disk.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>, CoolerUploadError> {
    let raw = fs::read(path)?;
    let value: Value =
        serde_json::from_slice(&raw).map_err(|source| CoolerUploadError::JsonParse {
            path: path.to_path_buf(),
            source,
        })?;

    let Value::Array(items) = value else {
        return Err(CoolerUploadError::invalid_record(
            0,
            format!("{} must contain a JSON array of records", path.display()),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value(item).map_err(|source| {
                CoolerUploadError::invalid_record(idx + 1, format!("malformed record: {source}"))
            })
        })
        .collect()
}

/// Validate records and convert them into upload units.
///
/// Units carry a timestamp taken once for the whole call.
pub fn normalize_records(records: &[RawRecord]) -> Result<Vec<UploadUnit>, CoolerUploadError> {
    let epoch_millis = chrono::Utc::now().timestamp_millis();
    normalize_records_with(records, epoch_millis, &mut rand::rng())
}

/// [`normalize_records`] with an explicit clock reading and random source.
pub fn normalize_records_with<R: Rng>(
    records: &[RawRecord],
    epoch_millis: i64,
    rng: &mut R,
) -> Result<Vec<UploadUnit>, CoolerUploadError> {
    if records.is_empty() {
        return Err(CoolerUploadError::invalid_record(
            0,
            "input contains no records",
        ));
    }

    let validated = records
        .iter()
        .enumerate()
        .map(|(idx, record)| validate_record(idx + 1, record))
        .collect::<Result<Vec<_>, _>>()?;

    let mut units = Vec::with_capacity(validated.len());

    for (idx, (source_url, extension, tree)) in validated.into_iter().enumerate() {
        let item = idx + 1;
        // The item index alone keeps names unique within a run.
        let filename = format!("{epoch_millis}_{item}_{}.{extension}", random_suffix(rng));

        let tags = ["cooler".to_string(), "batch-upload".to_string(), format!("item-{item}")]
            .into_iter()
            .collect();

        units.push(UploadUnit {
            source_url,
            filename,
            tags,
            split: Split::Train,
            annotation_tree: tree,
        });
    }

    tracing::debug!(count = units.len(), "Normalized input records");
    Ok(units)
}

fn validate_record(
    item: usize,
    record: &RawRecord,
) -> Result<(String, String, Option<CoolerMetadata>), CoolerUploadError> {
    let raw_url = record
        .photos_taken
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| CoolerUploadError::invalid_record(item, "missing 'photosTaken' field"))?;

    let url = url::Url::parse(raw_url)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .ok_or_else(|| {
            CoolerUploadError::invalid_record(
                item,
                format!("'photosTaken' must be an http(s) URL, got '{raw_url}'"),
            )
        })?;

    let metadata = match &record.metadata {
        None | Some(Value::Null) => {
            return Err(CoolerUploadError::invalid_record(
                item,
                "missing 'metadata' field",
            ));
        }
        Some(metadata) => metadata,
    };

    let tree = CoolerMetadata::from_metadata(metadata).map_err(|source| {
        CoolerUploadError::invalid_record(item, format!("invalid cooler metadata: {source}"))
    })?;

    Ok((raw_url.to_string(), extension_from_url(&url), tree))
}

fn extension_from_url(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn random_suffix<R: Rng>(rng: &mut R) -> String {
    (0..SUFFIX_LEN)
        .filter_map(|_| char::from_digit(rng.random_range(0..36), 36))
        .collect()
}
