// src/backend/mod.rs — HTTP client for the RAG backend

pub mod sse;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::infra::errors::RaglineError;

/// Compute placement requested from the backend. Opaque to the streaming
/// core; forwarded verbatim as the `device` query parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }

    pub fn toggled(&self) -> Device {
        match self {
            Device::Cpu => Device::Gpu,
            Device::Gpu => Device::Cpu,
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document known to the backend's store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub chunks: Option<u64>,
}

impl DocEntry {
    pub fn is_indexed(&self) -> bool {
        self.chunks.is_some_and(|c| c > 0)
    }

    /// Secondary label shown next to the document name.
    pub fn meta_label(&self) -> String {
        if let Some(chunks) = self.chunks.filter(|c| *c > 0) {
            return format!("chunks: {chunks}");
        }
        if let Some(size) = self.size {
            let kb = ((size as f64 / 1024.0).round() as u64).max(1);
            return format!("{kb} KB");
        }
        "not indexed".into()
    }
}

#[derive(Debug, Deserialize)]
struct DocsResponse {
    #[serde(default)]
    docs: Vec<DocEntry>,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestReport {
    pub chunks: u64,
}

/// Plain request/response client for the backend's non-streaming endpoints.
/// None of these calls touch the stream session.
#[derive(Clone)]
pub struct BackendClient {
    base: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, RaglineError> {
        let base = base_url.trim_end_matches('/').to_string();
        Url::parse(&base)?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(RaglineError::backend)?;

        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, RaglineError> {
        Ok(Url::parse(&format!("{}/{}", self.base, path))?)
    }

    /// `GET /api/docs`. Success doubles as the connectivity probe.
    pub async fn docs(&self) -> Result<Vec<DocEntry>, RaglineError> {
        let response = self
            .client
            .get(self.endpoint("api/docs")?)
            .send()
            .await
            .map_err(RaglineError::backend)?;

        if !response.status().is_success() {
            return Err(RaglineError::Backend {
                message: format!("docs fetch failed: HTTP {}", response.status()),
            });
        }

        let body: DocsResponse = response.json().await.map_err(RaglineError::backend)?;
        Ok(body.docs)
    }

    /// `POST /api/docs` with a multipart `files` field per document.
    pub async fn upload(&self, files: &[impl AsRef<Path>]) -> Result<(), RaglineError> {
        let mut form = reqwest::multipart::Form::new();
        for path in files {
            let path = path.as_ref();
            let bytes = tokio::fs::read(path).await?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("document")
                .to_string();
            form = form.part("files", reqwest::multipart::Part::bytes(bytes).file_name(name));
        }

        let response = self
            .client
            .post(self.endpoint("api/docs")?)
            .multipart(form)
            .send()
            .await
            .map_err(RaglineError::backend)?;

        if !response.status().is_success() {
            return Err(RaglineError::Backend {
                message: format!("upload failed: HTTP {}", response.status()),
            });
        }
        Ok(())
    }

    /// `POST /api/ingest` with chunking parameters.
    pub async fn ingest(
        &self,
        chunk_size: u32,
        chunk_overlap: u32,
    ) -> Result<IngestReport, RaglineError> {
        let body = serde_json::json!({
            "chunk_size": chunk_size,
            "chunk_overlap": chunk_overlap,
        });

        let response = self
            .client
            .post(self.endpoint("api/ingest")?)
            .json(&body)
            .send()
            .await
            .map_err(RaglineError::backend)?;

        if !response.status().is_success() {
            return Err(RaglineError::Backend {
                message: format!("ingest failed: HTTP {}", response.status()),
            });
        }

        response.json().await.map_err(RaglineError::backend)
    }

    /// `POST /api/shutdown`. Best-effort: the backend may die before
    /// answering, so any outcome is fine.
    pub async fn shutdown(&self) {
        let Ok(url) = self.endpoint("api/shutdown") else {
            return;
        };
        if let Err(e) = self.client.post(url).send().await {
            tracing::debug!("shutdown request not acknowledged: {e}");
        }
    }
}
