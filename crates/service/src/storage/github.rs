use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use configs::StoreConfig;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::content_store::{ContentStore, Revision, StoreError, StoredBlob};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// `ContentStore` backed by the GitHub repository contents API.
///
/// Files are read with `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`
/// and written with `PUT` on the same URL. The blob `sha` is the revision.
#[derive(Clone)]
pub struct GithubContentStore {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct PutContentsResponse {
    content: PutContentsEntry,
}

#[derive(Deserialize)]
struct PutContentsEntry {
    sha: String,
}

impl GithubContentStore {
    /// Build a client from config. Requires `store.token`.
    pub fn from_config(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let token = cfg
            .token
            .clone()
            .ok_or_else(|| StoreError::Transport("missing GITHUB_TOKEN".into()))?;
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            owner: cfg.owner.clone(),
            repo: cfg.repo.clone(),
            branch: cfg.branch.clone(),
            token,
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.contents_url(path))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }
}

/// GitHub wraps base64 content at 60 columns.
fn decode_content(path: &str, body: ContentsResponse) -> Result<StoredBlob, StoreError> {
    if body.encoding != "base64" {
        return Err(StoreError::Decode(format!(
            "{path}: unsupported content encoding {:?}",
            body.encoding
        )));
    }
    let compact: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
    let content = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
    Ok(StoredBlob { content, revision: Revision::new(body.sha) })
}

async fn status_error(path: &str, resp: reqwest::Response) -> StoreError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    StoreError::Status { path: path.to_string(), status, message }
}

#[async_trait]
impl ContentStore for GithubContentStore {
    async fn fetch(&self, path: &str) -> Result<Option<StoredBlob>, StoreError> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(%path, "contents not found; starting from an empty list");
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(status_error(path, resp).await);
        }
        let body = resp
            .json::<ContentsResponse>()
            .await
            .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
        let blob = decode_content(path, body)?;
        debug!(%path, revision = %blob.revision, bytes = blob.content.len(), "fetched contents");
        Ok(Some(blob))
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let payload = PutContentsRequest {
            message,
            content: BASE64.encode(content),
            branch: &self.branch,
            sha: expected.map(Revision::as_str),
        };
        let resp = self
            .request(reqwest::Method::PUT, path)
            .json(&payload)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match resp.status() {
            // 409: sha 过期；422: 文件已存在但未提供 sha
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                debug!(%path, status = %resp.status(), "write rejected as stale");
                Err(StoreError::Conflict { path: path.to_string() })
            }
            s if s.is_success() => {
                let body = resp
                    .json::<PutContentsResponse>()
                    .await
                    .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
                debug!(%path, revision = %body.content.sha, "stored contents");
                Ok(Revision::new(body.content.sha))
            }
            _ => Err(status_error(path, resp).await),
        }
    }
}
