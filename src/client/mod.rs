//! Remote dataset service access and the single-image upload pipeline.
//!
//! [`DatasetApi`] abstracts the handful of REST calls this crate makes so the
//! upload pipeline can run against [`UreqDatasetApi`] in production and
//! [`MockDatasetApi`] in tests. [`UploadClient`] drives one image through
//! download, re-encode, upload, annotation upload and verification.

mod http;
mod mock;

pub use http::{ApiConfig, UreqDatasetApi, DEFAULT_BASE_URL};
pub use mock::{MockCall, MockDatasetApi};

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

use crate::annotation::{annotation_filename, build_document, count_annotations, voc_xml, DocumentSource};
use crate::batch::UnitUploader;
use crate::error::CoolerUploadError;
use crate::normalize::UploadUnit;
use crate::project::ProjectHandle;

/// A project as listed by the dataset service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// A workspace and the projects it contains.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceListing {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub projects: Vec<RemoteProject>,
}

/// Body of a project creation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewProject {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub annotation: String,
}

/// Query parameters of an image upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUploadParams {
    pub name: String,
    /// Service-side batch label (date key), not an orchestrator batch.
    pub batch: String,
    pub split: String,
    pub tag_names: String,
}

/// Response of a successful image upload.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UploadedImage {
    pub id: String,
}

/// The remote calls the upload pipeline depends on.
pub trait DatasetApi {
    /// `GET /{workspace}`.
    fn list_projects(&self, workspace: &str) -> Result<WorkspaceListing, CoolerUploadError>;

    /// `POST /{workspace}/projects`.
    fn create_project(
        &self,
        workspace: &str,
        request: &NewProject,
    ) -> Result<RemoteProject, CoolerUploadError>;

    /// Download the source photo.
    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, CoolerUploadError>;

    /// `POST /dataset/{project}/upload` with a base64 body.
    fn upload_image(
        &self,
        project_id: &str,
        params: &ImageUploadParams,
        base64_body: &str,
    ) -> Result<UploadedImage, CoolerUploadError>;

    /// `POST /dataset/{project}/annotate/{image}` with a markup body.
    fn upload_annotation(
        &self,
        project_id: &str,
        image_id: &str,
        name: &str,
        content: &str,
    ) -> Result<(), CoolerUploadError>;

    /// `GET /{workspace}/{project}/{image}`, returning the persisted
    /// annotation count.
    fn image_annotation_count(
        &self,
        workspace: &str,
        project_id: &str,
        image_id: &str,
    ) -> Result<usize, CoolerUploadError>;
}

/// Per-image pipeline options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOptions {
    /// Re-encode downloads as JPEG at this quality (1-100); `None` uploads
    /// the original bytes.
    pub reencode_quality: Option<u8>,
    /// Read the image back after annotating and compare annotation counts.
    pub verify: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            reencode_quality: Some(90),
            verify: true,
        }
    }
}

/// What happened to one successfully uploaded unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOutcome {
    pub image_id: String,
    pub has_annotations: bool,
    pub expected_annotations: usize,
    /// Count read back from the service, when verification ran and succeeded.
    pub verified_annotations: Option<usize>,
}

/// Uploads single units against a [`DatasetApi`].
#[derive(Clone, Debug)]
pub struct UploadClient<A> {
    api: A,
    workspace: String,
    options: UploadOptions,
}

impl<A: DatasetApi> UploadClient<A> {
    pub fn new(api: A, workspace: impl Into<String>, options: UploadOptions) -> Self {
        Self {
            api,
            workspace: workspace.into(),
            options,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Upload one unit's image and, if it has a cooler tree, its annotations.
    ///
    /// The annotation document is built before the image is sent so that bad
    /// geometry never leaves an unannotated image behind. If the annotation
    /// call itself fails, the image stays uploaded and the error carries its
    /// id ([`CoolerUploadError::AnnotationRejected`]).
    #[tracing::instrument(skip(self, project, unit), fields(filename = %unit.filename, project = %project.id))]
    pub fn upload_one(
        &self,
        project: &ProjectHandle,
        unit: &UploadUnit,
    ) -> Result<UploadOutcome, CoolerUploadError> {
        let downloaded = self.api.fetch_image(&unit.source_url)?;
        let bytes = match self.options.reencode_quality {
            Some(quality) => reencode_jpeg(&downloaded, quality)?,
            None => downloaded,
        };
        let detected_size = imagesize::blob_size(&bytes)
            .ok()
            .and_then(|size| Some((u32::try_from(size.width).ok()?, u32::try_from(size.height).ok()?)));

        let annotation = match &unit.annotation_tree {
            Some(tree) => {
                let source = DocumentSource::new(&unit.filename, &unit.source_url)
                    .with_detected_size(detected_size);
                let document = build_document(tree, &source)?;
                Some((voc_xml::render(&document), count_annotations(tree)))
            }
            None => None,
        };

        let params = ImageUploadParams {
            name: unit.filename.clone(),
            batch: project.date_key.clone(),
            split: unit.split.to_string(),
            tag_names: unit.tag_names(),
        };
        let uploaded = self
            .api
            .upload_image(&project.id, &params, &STANDARD.encode(&bytes))?;
        tracing::info!(image_id = %uploaded.id, bytes = bytes.len(), "Image uploaded");

        let Some((xml, expected)) = annotation else {
            tracing::info!(image_id = %uploaded.id, "No cooler metadata; uploaded without annotations");
            return Ok(UploadOutcome {
                image_id: uploaded.id,
                has_annotations: false,
                expected_annotations: 0,
                verified_annotations: None,
            });
        };

        self.api
            .upload_annotation(
                &project.id,
                &uploaded.id,
                &annotation_filename(&unit.filename),
                &xml,
            )
            .map_err(|err| CoolerUploadError::AnnotationRejected {
                image_id: uploaded.id.clone(),
                message: err.to_string(),
            })?;
        tracing::info!(image_id = %uploaded.id, objects = expected, "Annotation uploaded");

        let verified = if self.options.verify {
            self.verify(project, &uploaded.id, expected)
        } else {
            None
        };

        Ok(UploadOutcome {
            image_id: uploaded.id,
            has_annotations: true,
            expected_annotations: expected,
            verified_annotations: verified,
        })
    }

    fn verify(&self, project: &ProjectHandle, image_id: &str, expected: usize) -> Option<usize> {
        match self
            .api
            .image_annotation_count(&self.workspace, &project.id, image_id)
        {
            Ok(found) => {
                if found == expected {
                    tracing::debug!(image_id, found, "Annotation count verified");
                } else {
                    tracing::warn!(image_id, expected, found, "Persisted annotation count differs");
                }
                Some(found)
            }
            Err(err) => {
                tracing::warn!(image_id, error = %err, "Annotation verification failed");
                None
            }
        }
    }
}

impl<A: DatasetApi> UnitUploader for UploadClient<A> {
    fn upload_one(
        &self,
        project: &ProjectHandle,
        unit: &UploadUnit,
    ) -> Result<UploadOutcome, CoolerUploadError> {
        UploadClient::upload_one(self, project, unit)
    }
}

/// Decode any supported image and re-encode it as JPEG.
pub fn reencode_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>, CoolerUploadError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|source| CoolerUploadError::ImageEncode(format!("decode failed: {source}")))?;

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    decoded
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|source| CoolerUploadError::ImageEncode(format!("encode failed: {source}")))?;

    Ok(out.into_inner())
}
