use crate::config::RemoteConfig;
use crate::services::remote::{Presence, RemoteError, RemoteObjectRef, RemoteStore};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Remote store backed by the GitHub contents API.
///
/// Existence is probed with a GET to the content-by-path endpoint; writes go
/// through PUT with a base64 body carrying `{message, content, branch}` and,
/// for updates, the blob `sha` from the prior existence check.
pub struct GithubContentClient {
    http: reqwest::Client,
    config: RemoteConfig,
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct ContentInfo {
    sha: String,
}

impl GithubContentClient {
    pub fn new(config: RemoteConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("image-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.config.api_base, self.config.repository, path
        )
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
    }

    async fn put_content(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<StatusCode, RemoteError> {
        let resp = self
            .request(self.http.put(self.contents_url(path)))
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;
        Ok(resp.status())
    }
}

#[async_trait]
impl RemoteStore for GithubContentClient {
    async fn default_branch(&self) -> String {
        let url = format!(
            "{}/repos/{}",
            self.config.api_base, self.config.repository
        );
        let fallback = self.config.fallback_branch.clone();

        let resp = match self.request(self.http.get(url)).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("default branch lookup failed ({e}), using '{fallback}'");
                return fallback;
            }
        };
        if !resp.status().is_success() {
            tracing::warn!(
                "default branch lookup returned {}, using '{fallback}'",
                resp.status()
            );
            return fallback;
        }
        match resp.json::<RepoInfo>().await {
            Ok(info) => info.default_branch,
            Err(e) => {
                tracing::warn!("default branch response unreadable ({e}), using '{fallback}'");
                fallback
            }
        }
    }

    async fn object_exists(&self, path: &str, branch: &str) -> Result<Presence, RemoteError> {
        let resp = self
            .request(self.http.get(self.contents_url(path)))
            .query(&[("ref", branch)])
            .send()
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(Presence::Absent),
            status if status.is_success() => {
                let info: ContentInfo = resp
                    .json()
                    .await
                    .map_err(|e| RemoteError::Transient(format!("content response: {e}")))?;
                Ok(Presence::Present(RemoteObjectRef {
                    path: path.to_string(),
                    branch: branch.to_string(),
                    sha: Some(info.sha),
                }))
            }
            status => Err(RemoteError::Transient(format!(
                "existence probe for {path} returned {status}"
            ))),
        }
    }

    async fn create_object(
        &self,
        path: &str,
        branch: &str,
        content: &[u8],
        message: &str,
    ) -> Result<(), RemoteError> {
        let body = json!({
            "message": message,
            "content": STANDARD.encode(content),
            "branch": branch,
        });
        match self.put_content(path, body).await? {
            status if status.is_success() => Ok(()),
            // 422 means the path already has a blob and a sha was expected
            StatusCode::UNPROCESSABLE_ENTITY => Err(RemoteError::Conflict {
                path: path.to_string(),
            }),
            status => Err(RemoteError::Transient(format!(
                "create of {path} returned {status}"
            ))),
        }
    }

    async fn update_object(
        &self,
        path: &str,
        branch: &str,
        content: &[u8],
        message: &str,
        object_ref: &RemoteObjectRef,
    ) -> Result<(), RemoteError> {
        let Some(sha) = object_ref.sha.as_deref() else {
            // Ref without a sha cannot update anything; force a re-check.
            return Err(RemoteError::StaleRef);
        };
        let body = json!({
            "message": message,
            "content": STANDARD.encode(content),
            "branch": branch,
            "sha": sha,
        });
        match self.put_content(path, body).await? {
            status if status.is_success() => Ok(()),
            // 409: sha no longer matches; 404/422: the blob moved or vanished
            StatusCode::CONFLICT | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(RemoteError::StaleRef)
            }
            status => Err(RemoteError::Transient(format!(
                "update of {path} returned {status}"
            ))),
        }
    }

    async fn ensure_prefix(&self, prefix: &str, branch: &str) -> Result<(), RemoteError> {
        let resp = self
            .request(self.http.get(self.contents_url(prefix)))
            .query(&[("ref", branch)])
            .send()
            .await
            .map_err(|e| RemoteError::PrefixBootstrap(e.to_string()))?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let marker = format!("{prefix}/.keep");
                match self
                    .create_object(&marker, branch, b"", "Initialize asset directory")
                    .await
                {
                    Ok(()) => Ok(()),
                    // Another writer created it in the meantime; still bootstrapped.
                    Err(RemoteError::Conflict { .. }) => Ok(()),
                    Err(e) => Err(RemoteError::PrefixBootstrap(e.to_string())),
                }
            }
            status => Err(RemoteError::PrefixBootstrap(format!(
                "prefix listing for {prefix} returned {status}"
            ))),
        }
    }
}
