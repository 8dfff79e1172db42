//! Date-keyed project lookup and creation.
//!
//! Every run uploads into a project named `CoolerData YYYY-MM-DD`. The
//! resolver looks the name up case-insensitively in the workspace listing
//! and creates the project when it is missing.
//!
//! Lookup and creation are not atomic: two runs starting on the same day
//! against an empty workspace can both miss the project and both create it.
//! The service then holds two projects with the same display name.

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::client::{DatasetApi, NewProject, RemoteProject};
use crate::error::CoolerUploadError;

pub const PROJECT_NAME_PREFIX: &str = "CoolerData";
pub const PROJECT_TYPE: &str = "object-detection";
pub const PROJECT_ANNOTATION_GROUP: &str = "cooler-detection";

/// The project a run uploads into, resolved once per run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectHandle {
    /// Project id without its workspace prefix.
    pub id: String,
    pub name: String,
    /// Whether this run created the project.
    pub is_new: bool,
    /// `YYYY-MM-DD`, also used as the service-side batch label.
    pub date_key: String,
}

/// Anything that can produce the project for a run.
pub trait ResolveProject {
    fn resolve(&self) -> Result<ProjectHandle, CoolerUploadError>;
}

/// Finds or creates the project for a given date.
#[derive(Clone, Debug)]
pub struct ProjectResolver<A> {
    api: A,
    workspace: String,
}

impl<A: DatasetApi> ProjectResolver<A> {
    pub fn new(api: A, workspace: impl Into<String>) -> Self {
        Self {
            api,
            workspace: workspace.into(),
        }
    }

    /// Resolve the project for the local calendar date.
    pub fn resolve_today(&self) -> Result<ProjectHandle, CoolerUploadError> {
        self.resolve_for_date(Local::now().date_naive())
    }

    pub fn resolve_for_date(&self, date: NaiveDate) -> Result<ProjectHandle, CoolerUploadError> {
        let date_key = date.format("%Y-%m-%d").to_string();
        let name = project_name(&date_key);

        let listing = self.api.list_projects(&self.workspace).map_err(|err| {
            CoolerUploadError::ProjectResolution(format!(
                "could not list projects in workspace '{}': {err}",
                self.workspace
            ))
        })?;

        if let Some(existing) = listing
            .projects
            .iter()
            .find(|project| project.name.eq_ignore_ascii_case(&name))
        {
            tracing::info!(project = %existing.id, %name, "Using existing project");
            return Ok(handle(existing, date_key, false));
        }

        tracing::info!(%name, workspace = %self.workspace, "Creating project");
        let request = NewProject {
            name: name.clone(),
            kind: PROJECT_TYPE.to_string(),
            annotation: PROJECT_ANNOTATION_GROUP.to_string(),
        };
        let created = self
            .api
            .create_project(&self.workspace, &request)
            .map_err(|err| {
                CoolerUploadError::ProjectResolution(format!(
                    "could not create project '{name}': {err}"
                ))
            })?;

        Ok(handle(&created, date_key, true))
    }
}

impl<A: DatasetApi> ResolveProject for ProjectResolver<A> {
    fn resolve(&self) -> Result<ProjectHandle, CoolerUploadError> {
        self.resolve_today()
    }
}

/// A project that is already known; resolving never touches the network.
impl ResolveProject for ProjectHandle {
    fn resolve(&self) -> Result<ProjectHandle, CoolerUploadError> {
        Ok(self.clone())
    }
}

pub fn project_name(date_key: &str) -> String {
    format!("{PROJECT_NAME_PREFIX} {date_key}")
}

/// `workspace/project-slug` becomes `project-slug`.
pub fn strip_workspace_prefix(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

fn handle(project: &RemoteProject, date_key: String, is_new: bool) -> ProjectHandle {
    ProjectHandle {
        id: strip_workspace_prefix(&project.id).to_string(),
        name: project.name.clone(),
        is_new,
        date_key,
    }
}
