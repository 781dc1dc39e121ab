//! Artifact persistence for a pipeline run.
//!
//! Every file name carries the run timestamp, so repeated runs into the same
//! directory never overwrite each other. IO failures are returned to the
//! caller; the pipeline treats them as fatal.

use crate::core::AnalysisStamp;
use crate::errors::InsightflowError;
use crate::utils::safe_file_component;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes run artifacts into one directory.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    timestamp: String,
    written: Vec<PathBuf>,
}

impl ArtifactStore {
    /// The default run directory: `<base>/outputs_<timestamp>`.
    #[must_use]
    pub fn default_dir(base: impl AsRef<Path>, stamp: &AnalysisStamp) -> PathBuf {
        base.as_ref().join(format!("outputs_{}", stamp.timestamp))
    }

    /// Creates the directory (and parents) and opens a store on it.
    pub async fn create(
        dir: impl Into<PathBuf>,
        stamp: &AnalysisStamp,
    ) -> Result<Self, InsightflowError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            timestamp: stamp.timestamp.clone(),
            written: Vec::new(),
        })
    }

    /// Returns the output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns every path written so far, in write order.
    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Consumes the store, returning the written paths.
    #[must_use]
    pub fn into_written(self) -> Vec<PathBuf> {
        self.written
    }

    /// Writes the schema stage output.
    pub async fn write_schema_description(
        &mut self,
        text: &str,
    ) -> Result<PathBuf, InsightflowError> {
        let name = format!("schema_description_{}.md", self.timestamp);
        self.write(name, text.as_bytes()).await
    }

    /// Writes the raw market stage output.
    pub async fn write_market_analysis(&mut self, text: &str) -> Result<PathBuf, InsightflowError> {
        let name = format!("market_analysis_{}.md", self.timestamp);
        self.write(name, text.as_bytes()).await
    }

    /// Writes the raw customer stage output for one segment.
    pub async fn write_customer_analysis(
        &mut self,
        market_name: &str,
        text: &str,
    ) -> Result<PathBuf, InsightflowError> {
        let name = format!(
            "customer_analysis_{}_{}.md",
            safe_file_component(market_name),
            self.timestamp
        );
        self.write(name, text.as_bytes()).await
    }

    /// Writes the pure market document.
    pub async fn write_pure_output<T: Serialize>(
        &mut self,
        output: &T,
    ) -> Result<PathBuf, InsightflowError> {
        let name = format!("market_analysis_pure_{}.json", self.timestamp);
        let body = serde_json::to_vec_pretty(output)?;
        self.write(name, &body).await
    }

    /// Writes the integrated document.
    pub async fn write_integrated_output<T: Serialize>(
        &mut self,
        output: &T,
    ) -> Result<PathBuf, InsightflowError> {
        let name = format!("integrated_analysis_{}.json", self.timestamp);
        let body = serde_json::to_vec_pretty(output)?;
        self.write(name, &body).await
    }

    async fn write(&mut self, name: String, body: &[u8]) -> Result<PathBuf, InsightflowError> {
        let path = self.dir.join(name);
        tokio::fs::write(&path, body).await?;
        info!(
            event_name = "pipeline.artifact.written",
            path = %path.display(),
            bytes = body.len(),
            "artifact written"
        );
        self.written.push(path.clone());
        Ok(path)
    }
}
