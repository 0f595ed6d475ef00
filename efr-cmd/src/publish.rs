//! Publishing the dataset to a Hugging Face Hub dataset repository.
//!
//! An upload asks the Hub how it wants the file (`preupload`). Small files
//! go inline in the commit as base64. Large ones are pushed through the
//! repository's Git LFS batch endpoint first, and the commit only
//! references them by SHA-256.

use crate::config::HubConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

/// Largest file the Hub accepts inline in a commit.
pub const MAX_INLINE_BYTES: usize = 10 * 1024 * 1024;

/// Bytes of the file shown to `preupload` so it can sniff the content.
const SAMPLE_BYTES: usize = 512;

const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Makes a freshly written dataset file visible to its readers.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, path: &Path, message: &str) -> Result<()>;
}

/// Skips publication, for local runs.
pub struct NoPublish;

#[async_trait]
impl Publisher for NoPublish {
    async fn publish(&self, path: &Path, _message: &str) -> Result<()> {
        info!("Publishing disabled, keeping {} local", path.display());
        Ok(())
    }
}

/// How the Hub wants a file delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Regular,
    Lfs,
}

#[derive(Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
}

/// Body of a `preupload` request for one file.
pub fn preupload_payload(path_in_repo: &str, content: &[u8]) -> Value {
    let sample = &content[..content.len().min(SAMPLE_BYTES)];
    json!({
        "files": [{
            "path": path_in_repo,
            "size": content.len(),
            "sample": STANDARD.encode(sample),
        }]
    })
}

/// Upload mode the `preupload` answer gives for `path_in_repo`.
pub fn upload_mode(response: &str, path_in_repo: &str) -> Result<UploadMode> {
    let response: PreuploadResponse =
        serde_json::from_str(response).context("unreadable preupload response")?;
    response
        .files
        .into_iter()
        .find(|f| f.path == path_in_repo)
        .map(|f| f.upload_mode)
        .with_context(|| format!("preupload response does not mention {path_in_repo}"))
}

/// The file operation of a single-file commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitFile<'a> {
    /// Content carried in the commit itself
    Inline(&'a [u8]),
    /// Content already pushed to LFS storage
    Lfs { oid: String, size: usize },
}

pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Pick the commit operation for `content` uploaded in `mode`.
///
/// Content too large to inline is refused here rather than by the Hub
/// after the whole body has been sent.
pub fn commit_file(mode: UploadMode, content: &[u8]) -> Result<CommitFile<'_>> {
    match mode {
        UploadMode::Lfs => Ok(CommitFile::Lfs {
            oid: sha256_hex(content),
            size: content.len(),
        }),
        UploadMode::Regular if content.len() > MAX_INLINE_BYTES => bail!(
            "{} bytes is over the {} byte limit for inline commits and the Hub did not offer LFS",
            content.len(),
            MAX_INLINE_BYTES
        ),
        UploadMode::Regular => Ok(CommitFile::Inline(content)),
    }
}

/// NDJSON body of a single-file commit: a header line, then the file
/// operation.
pub fn commit_payload(message: &str, path_in_repo: &str, file: &CommitFile<'_>) -> String {
    let header = json!({
        "key": "header",
        "value": {"summary": message, "description": ""},
    });
    let operation = match file {
        CommitFile::Inline(content) => json!({
            "key": "file",
            "value": {
                "content": STANDARD.encode(content),
                "path": path_in_repo,
                "encoding": "base64",
            },
        }),
        CommitFile::Lfs { oid, size } => json!({
            "key": "lfsFile",
            "value": {
                "path": path_in_repo,
                "algo": "sha256",
                "oid": oid,
                "size": size,
            },
        }),
    };
    format!("{header}\n{operation}\n")
}

/// Body of a Git LFS batch upload request for one object.
pub fn lfs_batch_payload(oid: &str, size: usize, revision: &str) -> Value {
    json!({
        "operation": "upload",
        "transfers": ["basic"],
        "objects": [{"oid": oid, "size": size}],
        "hash_algo": "sha256",
        "ref": {"name": revision},
    })
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<LfsObjectError>,
}

#[derive(Debug, Default, Deserialize)]
struct LfsActions {
    #[serde(default)]
    upload: Option<LfsAction>,
    #[serde(default)]
    verify: Option<LfsAction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LfsAction {
    pub href: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsObjectError {
    code: i64,
    message: String,
}

/// Upload and verify steps the LFS server asks for. Both are `None` when
/// the object is already stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LfsPlan {
    pub upload: Option<LfsAction>,
    pub verify: Option<LfsAction>,
}

pub fn lfs_plan(response: &str) -> Result<LfsPlan> {
    let response: LfsBatchResponse =
        serde_json::from_str(response).context("unreadable LFS batch response")?;
    let Some(object) = response.objects.into_iter().next() else {
        bail!("LFS batch response has no objects");
    };
    if let Some(error) = object.error {
        bail!("LFS server refused the object ({}): {}", error.code, error.message);
    }
    let actions = object.actions.unwrap_or_default();
    Ok(LfsPlan {
        upload: actions.upload,
        verify: actions.verify,
    })
}

async fn checked(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{} failed with {}: {}", what, status, body);
}

fn with_headers(
    mut request: reqwest::RequestBuilder,
    headers: &HashMap<String, String>,
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

pub struct HubClient {
    client: reqwest::Client,
    config: HubConfig,
    token: Option<String>,
}

impl HubClient {
    pub fn new(config: HubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build hub HTTP client")?;
        let token = config.token();
        Ok(Self {
            client,
            config,
            token,
        })
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    pub fn download_url(&self) -> String {
        format!(
            "{}/datasets/{}/resolve/{}/{}",
            self.endpoint(),
            self.config.repo_id,
            self.config.revision,
            self.config.filename
        )
    }

    pub fn preupload_url(&self) -> String {
        format!(
            "{}/api/datasets/{}/preupload/{}",
            self.endpoint(),
            self.config.repo_id,
            self.config.revision
        )
    }

    pub fn lfs_batch_url(&self) -> String {
        format!(
            "{}/datasets/{}.git/info/lfs/objects/batch",
            self.endpoint(),
            self.config.repo_id
        )
    }

    pub fn commit_url(&self) -> String {
        format!(
            "{}/api/datasets/{}/commit/{}",
            self.endpoint(),
            self.config.repo_id,
            self.config.revision
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetch the published dataset into `dest`.
    pub async fn download(&self, dest: &Path) -> Result<()> {
        let url = self.download_url();
        info!("Downloading {} to {}", url, dest.display());
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let response = checked(response, &format!("download of {url}")).await?;
        let bytes = response.bytes().await.context("failed to read dataset body")?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(dest, &bytes)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        info!("Downloaded {} bytes", bytes.len());
        Ok(())
    }

    async fn preupload(&self, token: &str, content: &[u8]) -> Result<UploadMode> {
        let url = self.preupload_url();
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&preupload_payload(&self.config.filename, content))
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let body = checked(response, "preupload").await?.text().await?;
        upload_mode(&body, &self.config.filename)
    }

    async fn upload_lfs(&self, token: &str, content: &[u8], oid: &str) -> Result<()> {
        let url = self.lfs_batch_url();
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, LFS_MEDIA_TYPE)
            .header(reqwest::header::CONTENT_TYPE, LFS_MEDIA_TYPE)
            .body(lfs_batch_payload(oid, content.len(), &self.config.revision).to_string())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let body = checked(response, "LFS batch request").await?.text().await?;
        let plan = lfs_plan(&body)?;

        match &plan.upload {
            Some(upload) => {
                let response = with_headers(self.client.put(&upload.href), &upload.header)
                    .body(content.to_vec())
                    .send()
                    .await
                    .context("LFS upload request failed")?;
                checked(response, "LFS upload").await?;
                info!("Uploaded {} bytes to LFS storage", content.len());
            }
            None => info!("LFS object {} is already stored", oid),
        }
        if let Some(verify) = &plan.verify {
            let response = with_headers(self.client.post(&verify.href), &verify.header)
                .bearer_auth(token)
                .json(&json!({"oid": oid, "size": content.len()}))
                .send()
                .await
                .context("LFS verify request failed")?;
            checked(response, "LFS verify").await?;
        }
        Ok(())
    }

    /// Commit `path` to the repository as the configured filename.
    pub async fn upload(&self, path: &Path, message: &str) -> Result<()> {
        let Some(token) = &self.token else {
            bail!(
                "no hub token: set {} to publish the dataset",
                self.config.token_env
            );
        };
        let content = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let mode = self.preupload(token, &content).await?;
        let file = commit_file(mode, &content)?;
        if let CommitFile::Lfs { oid, .. } = &file {
            self.upload_lfs(token, &content, oid).await?;
        }
        let payload = commit_payload(message, &self.config.filename, &file);

        let url = self.commit_url();
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        checked(response, &format!("commit to {}", self.config.repo_id)).await?;
        info!(
            "Committed {} ({} bytes, {:?}) to {}",
            self.config.filename,
            content.len(),
            mode,
            self.config.repo_id
        );
        Ok(())
    }
}

#[async_trait]
impl Publisher for HubClient {
    async fn publish(&self, path: &Path, message: &str) -> Result<()> {
        self.upload(path, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ndjson(payload: &str) -> Vec<Value> {
        payload
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn commit_payload_is_two_ndjson_lines() {
        let payload = commit_payload(
            "Update flood data",
            "europe_admin.geojson",
            &CommitFile::Inline(b"{}"),
        );
        let lines = ndjson(&payload);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["key"], "header");
        assert_eq!(lines[0]["value"]["summary"], "Update flood data");
        assert_eq!(lines[1]["key"], "file");
        assert_eq!(lines[1]["value"]["path"], "europe_admin.geojson");
        assert_eq!(lines[1]["value"]["encoding"], "base64");
        assert_eq!(lines[1]["value"]["content"], "e30=");
    }

    #[test]
    fn large_files_are_committed_as_lfs_references() {
        let content = vec![b' '; MAX_INLINE_BYTES + 1];
        let file = commit_file(UploadMode::Lfs, &content).unwrap();
        assert_eq!(
            file,
            CommitFile::Lfs {
                oid: sha256_hex(&content),
                size: MAX_INLINE_BYTES + 1,
            }
        );

        let lines = ndjson(&commit_payload("msg", "europe_admin.geojson", &file));
        assert_eq!(lines[1]["key"], "lfsFile");
        assert_eq!(lines[1]["value"]["algo"], "sha256");
        assert_eq!(lines[1]["value"]["size"], MAX_INLINE_BYTES + 1);
        assert!(lines[1]["value"].get("content").is_none());
    }

    #[test]
    fn oversized_inline_upload_fails_early() {
        let content = vec![b' '; MAX_INLINE_BYTES + 1];
        let err = commit_file(UploadMode::Regular, &content).unwrap_err();
        assert!(err.to_string().contains("limit for inline commits"));
        assert_eq!(
            commit_file(UploadMode::Regular, b"{}").unwrap(),
            CommitFile::Inline(&b"{}"[..])
        );
    }

    #[test]
    fn sha256_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn preupload_round_trip() {
        let payload = preupload_payload("europe_admin.geojson", &[b'x'; 600]);
        assert_eq!(payload["files"][0]["size"], 600);
        let sample = payload["files"][0]["sample"].as_str().unwrap();
        assert_eq!(STANDARD.decode(sample).unwrap().len(), 512);

        let response = r#"{"files": [
            {"path": "europe_admin.geojson", "uploadMode": "lfs", "shouldIgnore": false}
        ]}"#;
        assert_eq!(
            upload_mode(response, "europe_admin.geojson").unwrap(),
            UploadMode::Lfs
        );
        assert!(upload_mode(response, "other.geojson").is_err());
    }

    #[test]
    fn lfs_plan_reads_actions() {
        let payload = lfs_batch_payload("abc123", 42, "main");
        assert_eq!(payload["objects"][0]["oid"], "abc123");
        assert_eq!(payload["ref"]["name"], "main");

        let response = r#"{"transfer": "basic", "objects": [{
            "oid": "abc123", "size": 42,
            "actions": {
                "upload": {"href": "https://s3.example/put", "header": {"x-amz-acl": "private"}},
                "verify": {"href": "https://hub.example/verify"}
            }
        }]}"#;
        let plan = lfs_plan(response).unwrap();
        let upload = plan.upload.unwrap();
        assert_eq!(upload.href, "https://s3.example/put");
        assert_eq!(upload.header.get("x-amz-acl").map(String::as_str), Some("private"));
        assert_eq!(plan.verify.unwrap().href, "https://hub.example/verify");

        let stored = r#"{"objects": [{"oid": "abc123", "size": 42}]}"#;
        assert_eq!(lfs_plan(stored).unwrap(), LfsPlan::default());

        let refused = r#"{"objects": [{"oid": "abc123", "size": 42,
            "error": {"code": 422, "message": "bad size"}}]}"#;
        assert!(lfs_plan(refused).unwrap_err().to_string().contains("bad size"));
    }

    #[test]
    fn urls_follow_hub_layout() {
        let config = HubConfig {
            endpoint: "https://hub.example/".into(),
            ..HubConfig::default()
        };
        let client = HubClient::new(config).unwrap();
        assert_eq!(
            client.download_url(),
            "https://hub.example/datasets/AdrienD-Skep/geo_flood_data/resolve/main/europe_admin.geojson"
        );
        assert_eq!(
            client.preupload_url(),
            "https://hub.example/api/datasets/AdrienD-Skep/geo_flood_data/preupload/main"
        );
        assert_eq!(
            client.lfs_batch_url(),
            "https://hub.example/datasets/AdrienD-Skep/geo_flood_data.git/info/lfs/objects/batch"
        );
        assert_eq!(
            client.commit_url(),
            "https://hub.example/api/datasets/AdrienD-Skep/geo_flood_data/commit/main"
        );
    }

    #[tokio::test]
    async fn upload_without_token_fails_before_any_request() {
        let config = HubConfig {
            token_env: "EFR_TEST_TOKEN_THAT_IS_NEVER_SET".into(),
            endpoint: "http://127.0.0.1:9".into(),
            ..HubConfig::default()
        };
        let client = HubClient::new(config).unwrap();
        let err = client
            .upload(Path::new("missing.geojson"), "msg")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("EFR_TEST_TOKEN_THAT_IS_NEVER_SET"));
    }
}
