use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    DatasetApi, ImageUploadParams, NewProject, RemoteProject, UploadedImage, WorkspaceListing,
};
use crate::error::CoolerUploadError;

/// A call received by [`MockDatasetApi`], in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    ListProjects {
        workspace: String,
    },
    CreateProject {
        workspace: String,
        name: String,
    },
    FetchImage {
        url: String,
    },
    UploadImage {
        project_id: String,
        name: String,
        batch: String,
        split: String,
        tag_names: String,
    },
    UploadAnnotation {
        project_id: String,
        image_id: String,
        name: String,
    },
    ImageAnnotationCount {
        project_id: String,
        image_id: String,
    },
}

#[derive(Default)]
struct MockState {
    workspace_name: String,
    projects: Vec<RemoteProject>,
    images: HashMap<String, Vec<u8>>,
    broken_urls: Vec<String>,
    listing_error: Option<String>,
    stale_projects: Vec<RemoteProject>,
    pending_stale_listings: usize,
    creation_error: Option<String>,
    pending_upload_failures: usize,
    pending_annotation_failures: usize,
    uploaded_images: Vec<(String, String)>,
    annotations: HashMap<String, String>,
    calls: Vec<MockCall>,
}

/// In-memory [`DatasetApi`] for tests.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect recorded calls through another. Stored annotations are
/// counted by their `<object>` elements when read back.
///
/// # Example
/// ```
/// use cooler_upload::client::{DatasetApi, MockDatasetApi};
///
/// let mock = MockDatasetApi::new("acme");
/// mock.add_project("acme/coolerdata-2025-10-14", "CoolerData 2025-10-14");
/// let listing = mock.list_projects("acme").unwrap();
/// assert_eq!(listing.projects.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockDatasetApi {
    state: Arc<Mutex<MockState>>,
}

impl MockDatasetApi {
    pub fn new(workspace_name: impl Into<String>) -> Self {
        let mock = Self::default();
        mock.state.lock().workspace_name = workspace_name.into();
        mock
    }

    /// Register an existing project in the workspace listing.
    pub fn add_project(&self, id: impl Into<String>, name: impl Into<String>) {
        self.state.lock().projects.push(RemoteProject {
            id: id.into(),
            name: name.into(),
            kind: Some("object-detection".to_string()),
        });
    }

    /// Serve `bytes` for downloads of `url`.
    pub fn add_image(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.state.lock().images.insert(url.into(), bytes);
    }

    /// Make every download of `url` fail with a transport error.
    pub fn break_url(&self, url: impl Into<String>) {
        self.state.lock().broken_urls.push(url.into());
    }

    /// Make workspace listing fail.
    pub fn fail_listing(&self, message: impl Into<String>) {
        self.state.lock().listing_error = Some(message.into());
    }

    /// Answer the next `times` listings with the projects present now,
    /// ignoring any created in the meantime.
    pub fn serve_stale_listings(&self, times: usize) {
        let mut state = self.state.lock();
        state.stale_projects = state.projects.clone();
        state.pending_stale_listings = times;
    }

    /// Make project creation fail.
    pub fn fail_project_creation(&self, message: impl Into<String>) {
        self.state.lock().creation_error = Some(message.into());
    }

    /// Fail the next `times` image uploads with HTTP 429.
    pub fn fail_image_uploads(&self, times: usize) {
        self.state.lock().pending_upload_failures += times;
    }

    /// Fail the next `times` annotation uploads with HTTP 500.
    pub fn fail_annotation_uploads(&self, times: usize) {
        self.state.lock().pending_annotation_failures += times;
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Names of images accepted by the upload endpoint, in order.
    pub fn uploaded_image_names(&self) -> Vec<String> {
        self.state
            .lock()
            .uploaded_images
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Annotation markup stored for `image_id`.
    pub fn annotation_for(&self, image_id: &str) -> Option<String> {
        self.state.lock().annotations.get(image_id).cloned()
    }

    /// Current projects in the workspace.
    pub fn projects(&self) -> Vec<RemoteProject> {
        self.state.lock().projects.clone()
    }
}

impl DatasetApi for MockDatasetApi {
    fn list_projects(&self, workspace: &str) -> Result<WorkspaceListing, CoolerUploadError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::ListProjects {
            workspace: workspace.to_string(),
        });
        if let Some(message) = &state.listing_error {
            return Err(CoolerUploadError::Transport {
                endpoint: format!("/{workspace}"),
                message: message.clone(),
            });
        }
        let projects = if state.pending_stale_listings > 0 {
            state.pending_stale_listings -= 1;
            state.stale_projects.clone()
        } else {
            state.projects.clone()
        };
        Ok(WorkspaceListing {
            name: state.workspace_name.clone(),
            projects,
        })
    }

    fn create_project(
        &self,
        workspace: &str,
        request: &NewProject,
    ) -> Result<RemoteProject, CoolerUploadError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::CreateProject {
            workspace: workspace.to_string(),
            name: request.name.clone(),
        });
        if let Some(message) = &state.creation_error {
            return Err(CoolerUploadError::Transport {
                endpoint: format!("/{workspace}/projects"),
                message: message.clone(),
            });
        }

        let slug = request.name.to_ascii_lowercase().replace(' ', "-");
        let mut id = format!("{workspace}/{slug}");
        let same_slug = state
            .projects
            .iter()
            .filter(|project| project.id == id || project.id.starts_with(&format!("{id}-")))
            .count();
        if same_slug > 0 {
            id = format!("{id}-{}", same_slug + 1);
        }
        let project = RemoteProject {
            id,
            name: request.name.clone(),
            kind: Some(request.kind.clone()),
        };
        state.projects.push(project.clone());
        Ok(project)
    }

    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, CoolerUploadError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::FetchImage {
            url: url.to_string(),
        });
        if state.broken_urls.iter().any(|broken| broken == url) {
            return Err(CoolerUploadError::Transport {
                endpoint: url.to_string(),
                message: "connection reset".to_string(),
            });
        }
        state
            .images
            .get(url)
            .cloned()
            .ok_or_else(|| CoolerUploadError::RemoteStatus {
                endpoint: url.to_string(),
                status: 404,
            })
    }

    fn upload_image(
        &self,
        project_id: &str,
        params: &ImageUploadParams,
        _base64_body: &str,
    ) -> Result<UploadedImage, CoolerUploadError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::UploadImage {
            project_id: project_id.to_string(),
            name: params.name.clone(),
            batch: params.batch.clone(),
            split: params.split.clone(),
            tag_names: params.tag_names.clone(),
        });
        if state.pending_upload_failures > 0 {
            state.pending_upload_failures -= 1;
            return Err(CoolerUploadError::RemoteStatus {
                endpoint: format!("/dataset/{project_id}/upload"),
                status: 429,
            });
        }

        let id = format!("img{:04}", state.uploaded_images.len() + 1);
        state.uploaded_images.push((id.clone(), params.name.clone()));
        Ok(UploadedImage { id })
    }

    fn upload_annotation(
        &self,
        project_id: &str,
        image_id: &str,
        name: &str,
        content: &str,
    ) -> Result<(), CoolerUploadError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::UploadAnnotation {
            project_id: project_id.to_string(),
            image_id: image_id.to_string(),
            name: name.to_string(),
        });
        if state.pending_annotation_failures > 0 {
            state.pending_annotation_failures -= 1;
            return Err(CoolerUploadError::RemoteStatus {
                endpoint: format!("/dataset/{project_id}/annotate/{image_id}"),
                status: 500,
            });
        }
        state
            .annotations
            .insert(image_id.to_string(), content.to_string());
        Ok(())
    }

    fn image_annotation_count(
        &self,
        _workspace: &str,
        project_id: &str,
        image_id: &str,
    ) -> Result<usize, CoolerUploadError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::ImageAnnotationCount {
            project_id: project_id.to_string(),
            image_id: image_id.to_string(),
        });
        Ok(state
            .annotations
            .get(image_id)
            .map_or(0, |xml| xml.matches("<object>").count()))
    }
}
