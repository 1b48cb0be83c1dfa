//! Object-storage uploads for the `remote` export mode.

use std::future::Future;
use std::time::Duration;

use diagflow_shared::{ArtifactLocation, DiagflowError, Result, validate_endpoint};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::export::ExportMode;

/// Default timeout in seconds for a single upload.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// User-Agent string for upload requests.
const USER_AGENT: &str = concat!("diagflow/", env!("CARGO_PKG_VERSION"));

/// Destination for remote exports: stores a blob under `bucket/key`.
pub trait ObjectUploader: Send + Sync {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<ArtifactLocation>> + Send;
}

/// Uploads with `PUT {endpoint}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct HttpObjectUploader {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpObjectUploader {
    /// Uploader whose bearer token (if any) is read from the env var `token_env`.
    pub fn new(endpoint: &str, token_env: &str) -> Result<Self> {
        let token = std::env::var(token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            debug!(token_env, "no storage token set, uploading anonymously");
        }
        Self::with_token(endpoint, token)
    }

    /// Uploader with an explicit token.
    pub fn with_token(endpoint: &str, token: Option<String>) -> Result<Self> {
        let endpoint = validate_endpoint(endpoint)?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| DiagflowError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    /// Uploader for an export `mode`: built for `remote`, `None` for anything
    /// else. Unparseable modes are left for [`crate::export`] to reject.
    pub fn for_mode(mode: &str, endpoint: &str, token_env: &str) -> Result<Option<Self>> {
        match ExportMode::parse(mode) {
            Ok(ExportMode::Remote) => Self::new(endpoint, token_env).map(Some),
            _ => Ok(None),
        }
    }

    /// URL an object is uploaded to.
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            bucket,
            key.trim_start_matches('/')
        )
    }
}

impl ObjectUploader for HttpObjectUploader {
    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<ArtifactLocation> {
        let url = self.object_url(bucket, key);
        let mut request = self.client.put(&url).body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DiagflowError::Network(format!("PUT {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiagflowError::Network(format!("PUT {url} returned {status}")));
        }

        debug!(%url, %status, "uploaded object");
        Ok(ArtifactLocation(url))
    }
}

impl<U: ObjectUploader> ObjectUploader for Option<U> {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<ArtifactLocation> {
        match self {
            Some(uploader) => uploader.put_object(bucket, key, body).await,
            None => Err(DiagflowError::config(
                "remote export requested but no object uploader is configured",
            )),
        }
    }
}
