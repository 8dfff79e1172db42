use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use ureq::http::Response;
use ureq::Body;
use url::Url;

use super::{
    DatasetApi, ImageUploadParams, NewProject, RemoteProject, UploadedImage, WorkspaceListing,
};
use crate::error::CoolerUploadError;

pub const DEFAULT_BASE_URL: &str = "https://api.roboflow.com";

const MAX_IMAGE_BYTES: u64 = 64 * 1024 * 1024;

/// Connection settings for the dataset service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Global timeout applied to every request, download included.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// [`DatasetApi`] over HTTP using a blocking `ureq` agent.
#[derive(Clone)]
pub struct UreqDatasetApi {
    agent: ureq::Agent,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for UreqDatasetApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqDatasetApi")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl UreqDatasetApi {
    pub fn new(config: ApiConfig) -> Result<Self, CoolerUploadError> {
        let base_url = Url::parse(&config.base_url).map_err(|source| {
            CoolerUploadError::Transport {
                endpoint: config.base_url.clone(),
                message: format!("invalid base URL: {source}"),
            }
        })?;

        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build();
        let agent: ureq::Agent = agent_config.into();

        Ok(Self {
            agent,
            base_url,
            api_key: config.api_key,
        })
    }

    /// Build `{base}/{segments...}?api_key=...&{query...}`.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, CoolerUploadError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CoolerUploadError::Transport {
                endpoint: self.base_url.to_string(),
                message: "base URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api_key", &self.api_key);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, CoolerUploadError> {
        tracing::debug!(endpoint = %redacted(url), "GET");
        let mut response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|err| request_error(url, err))?;
        read_json(url, &mut response)
    }
}

impl DatasetApi for UreqDatasetApi {
    fn list_projects(&self, workspace: &str) -> Result<WorkspaceListing, CoolerUploadError> {
        #[derive(Deserialize)]
        struct WorkspaceResponse {
            #[serde(default)]
            workspace: WorkspaceListing,
        }

        let url = self.endpoint(&[workspace], &[])?;
        let response: WorkspaceResponse = self.get_json(&url)?;
        Ok(response.workspace)
    }

    fn create_project(
        &self,
        workspace: &str,
        request: &NewProject,
    ) -> Result<RemoteProject, CoolerUploadError> {
        let url = self.endpoint(&[workspace, "projects"], &[])?;
        tracing::debug!(endpoint = %redacted(&url), name = %request.name, "POST project");

        let mut response = self
            .agent
            .post(url.as_str())
            .send_json(request)
            .map_err(|err| request_error(&url, err))?;
        read_json(&url, &mut response)
    }

    fn fetch_image(&self, source: &str) -> Result<Vec<u8>, CoolerUploadError> {
        tracing::debug!(url = source, "Downloading image");
        let mut response = self.agent.get(source).call().map_err(|err| match err {
            ureq::Error::StatusCode(status) => CoolerUploadError::RemoteStatus {
                endpoint: source.to_string(),
                status,
            },
            other => CoolerUploadError::Transport {
                endpoint: source.to_string(),
                message: other.to_string(),
            },
        })?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_IMAGE_BYTES)
            .read_to_vec()
            .map_err(|err| CoolerUploadError::Transport {
                endpoint: source.to_string(),
                message: format!("failed reading image body: {err}"),
            })
    }

    fn upload_image(
        &self,
        project_id: &str,
        params: &ImageUploadParams,
        base64_body: &str,
    ) -> Result<UploadedImage, CoolerUploadError> {
        let url = self.endpoint(
            &["dataset", project_id, "upload"],
            &[
                ("name", params.name.as_str()),
                ("batch", params.batch.as_str()),
                ("split", params.split.as_str()),
                ("tag_names", params.tag_names.as_str()),
            ],
        )?;
        tracing::debug!(endpoint = %redacted(&url), name = %params.name, "POST image");

        let mut response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send(base64_body)
            .map_err(|err| request_error(&url, err))?;
        read_json(&url, &mut response)
    }

    fn upload_annotation(
        &self,
        project_id: &str,
        image_id: &str,
        name: &str,
        content: &str,
    ) -> Result<(), CoolerUploadError> {
        let url = self.endpoint(
            &["dataset", project_id, "annotate", image_id],
            &[("name", name)],
        )?;
        tracing::debug!(endpoint = %redacted(&url), name, "POST annotation");

        let mut response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "text/plain")
            .send(content)
            .map_err(|err| request_error(&url, err))?;

        let body: Value = read_json(&url, &mut response).unwrap_or(Value::Null);
        tracing::trace!(response = %body, "Annotation accepted");
        Ok(())
    }

    fn image_annotation_count(
        &self,
        workspace: &str,
        project_id: &str,
        image_id: &str,
    ) -> Result<usize, CoolerUploadError> {
        #[derive(Deserialize)]
        struct ImageDetail {
            #[serde(default)]
            annotations: Option<Vec<Value>>,
        }

        let url = self.endpoint(&[workspace, project_id, image_id], &[])?;
        let detail: ImageDetail = self.get_json(&url)?;
        Ok(detail.annotations.map_or(0, |annotations| annotations.len()))
    }
}

fn read_json<T: DeserializeOwned>(
    url: &Url,
    response: &mut Response<Body>,
) -> Result<T, CoolerUploadError> {
    response
        .body_mut()
        .read_json::<T>()
        .map_err(|err| CoolerUploadError::Transport {
            endpoint: redacted(url),
            message: format!("unexpected response body: {err}"),
        })
}

fn request_error(url: &Url, err: ureq::Error) -> CoolerUploadError {
    let endpoint = redacted(url);
    match err {
        ureq::Error::StatusCode(status) => {
            tracing::warn!(%endpoint, status, "Dataset service returned an error status");
            CoolerUploadError::RemoteStatus { endpoint, status }
        }
        other => {
            tracing::warn!(%endpoint, error = %other, "Dataset service request failed");
            CoolerUploadError::Transport {
                endpoint,
                message: other.to_string(),
            }
        }
    }
}

/// Endpoint without its query string, so the API key never reaches logs.
fn redacted(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> UreqDatasetApi {
        UreqDatasetApi::new(ApiConfig {
            base_url: base.to_string(),
            api_key: "secret".to_string(),
            ..ApiConfig::default()
        })
        .expect("build api")
    }

    #[test]
    fn endpoint_appends_segments_and_key() {
        let url = api("https://api.roboflow.com")
            .endpoint(&["dataset", "cooler-data", "upload"], &[("name", "a b.jpg")])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://api.roboflow.com/dataset/cooler-data/upload?api_key=secret&name=a+b.jpg"
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let url = api("http://localhost:8080/proxy/")
            .endpoint(&["acme"], &[])
            .expect("endpoint");
        assert_eq!(url.as_str(), "http://localhost:8080/proxy/acme?api_key=secret");
    }

    #[test]
    fn redacted_drops_query() {
        let url = Url::parse("https://api.roboflow.com/acme?api_key=secret").expect("url");
        assert_eq!(redacted(&url), "https://api.roboflow.com/acme");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = UreqDatasetApi::new(ApiConfig {
            base_url: "not a url".to_string(),
            ..ApiConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, CoolerUploadError::Transport { .. }));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let debug = format!("{:?}", api("https://api.roboflow.com"));
        assert!(debug.contains("https://api.roboflow.com"), "{debug}");
        assert!(!debug.contains("secret"), "{debug}");
    }
}
