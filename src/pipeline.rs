//! Per-job processing: fetch the original, normalize it to JPEG, recompress
//! at the configured quality and persist the result.
//!
//! Every stage error is caught here and turned into a [`ProcessingOutcome`];
//! failures additionally raise a best-effort alert.

use crate::alert::{webhook::DEFAULT_ALERT_TIMEOUT, AlertService};
use crate::job::decode_job;
use crate::models::{Config, Job, JobFormat, ProcessingOutcome, SubPathMap};
use crate::storage::BlobStore;
use crate::{image, Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delays between attempts to fetch an original.
pub const BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(10),
];

pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";

/// Turns a raw delivery body into an outcome. Implemented by [`Pipeline`].
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, body: &[u8]) -> ProcessingOutcome;

    /// Reports a failure that happened outside [`JobHandler::handle`],
    /// e.g. a panic caught by the worker.
    async fn report_fault(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validate,
    Fetch,
    Normalize,
    Decode,
    Encode,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Decode => "decode",
            Stage::Encode => "encode",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub job_format: JobFormat,
    pub bucket: String,
    pub original_prefix: String,
    pub sub_paths: SubPathMap,
    pub quality: u8,
    pub server_name: String,
    pub backoff: Vec<Duration>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            job_format: config.job_format,
            bucket: config.bucket.clone(),
            original_prefix: config.original_prefix.clone(),
            sub_paths: config.sub_paths.clone(),
            quality: config.quality,
            server_name: config.server_name.clone(),
            backoff: BACKOFF_SCHEDULE.to_vec(),
        }
    }

    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }
}

pub struct Pipeline {
    store: Arc<dyn BlobStore>,
    alerts: Arc<dyn AlertService>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn BlobStore>,
        alerts: Arc<dyn AlertService>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            alerts,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs one job through every stage and classifies the result.
    pub async fn process(&self, job: &Job) -> ProcessingOutcome {
        if job.file_name.is_empty() {
            warn!("Job without filename, skipping");
            return ProcessingOutcome::Skip;
        }

        match self.run_stages(job).await {
            Ok(outcome) => outcome,
            Err((stage, e)) => {
                let outcome = e.outcome();
                error!(
                    file_name = %job.file_name,
                    stage = %stage,
                    disposition = %outcome.disposition(),
                    "Processing failed: {}",
                    outcome_error(&outcome)
                );
                self.notify(&format!(
                    "{} failed for {}: {}",
                    stage,
                    job.file_name,
                    outcome_error(&outcome)
                ))
                .await;
                outcome
            }
        }
    }

    async fn run_stages(
        &self,
        job: &Job,
    ) -> std::result::Result<ProcessingOutcome, (Stage, Error)> {
        check_file_name(&job.file_name).map_err(|e| (Stage::Validate, e))?;
        let source = source_key(&self.settings.original_prefix, &job.file_name);
        let bytes = self
            .fetch(&source)
            .await
            .map_err(|e| (Stage::Fetch, e))?;

        if bytes.is_empty() {
            warn!("[{}] Original is empty, skipping", job.file_name);
            self.notify(&format!("Skip processing file: {}, 0 bytes", job.file_name))
                .await;
            return Ok(ProcessingOutcome::Skip);
        }

        let normalization = image::normalize(&bytes).map_err(|e| (Stage::Normalize, e))?;
        if let Some(hint) = job.mime_type.as_deref() {
            if hint != normalization.content_type {
                warn!(
                    "[{}] Producer declared {} but content is {}",
                    job.file_name, hint, normalization.content_type
                );
            }
        }
        if normalization.converted {
            debug!(
                "[{}] Converting {} to JPEG",
                job.file_name, normalization.content_type
            );
        }

        let original_len = bytes.len();
        let decoded = image::decode_blocking(bytes, normalization)
            .await
            .map_err(|e| (Stage::Decode, e))?;

        let output = output_key(&source, normalization.converted, &self.settings.sub_paths);
        if output == source {
            warn!("[{}] No sub-path mapping, overwriting original", job.file_name);
        }

        let encoded = image::encode_blocking(decoded, self.settings.quality)
            .await
            .map_err(|e| (Stage::Encode, e))?;

        self.store
            .put(&self.settings.bucket, &output, &encoded, OUTPUT_CONTENT_TYPE)
            .await
            .map_err(|e| match e {
                Error::InvalidKey(key) => (Stage::Persist, Error::InvalidKey(key)),
                other => (Stage::Persist, Error::Persist(other.to_string())),
            })?;

        info!(
            "[{}] Compressed and saved to {} ({} -> {} bytes)",
            job.file_name,
            output,
            original_len,
            encoded.len()
        );
        Ok(ProcessingOutcome::Success)
    }

    /// Reads the original, sleeping through the backoff schedule between
    /// failed attempts. Makes one attempt per schedule entry.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let bucket = &self.settings.bucket;
        if self.settings.backoff.is_empty() {
            return self.store.get(bucket, key).await;
        }

        let attempts = self.settings.backoff.len();
        let mut last_error = None;
        for (attempt, delay) in self.settings.backoff.iter().enumerate() {
            match self.store.get(bucket, key).await {
                Ok(bytes) => return Ok(bytes),
                Err(Error::InvalidKey(key)) => return Err(Error::InvalidKey(key)),
                Err(e) => {
                    warn!(
                        "[{}] Fetch attempt {}/{} failed: {}. Retrying in {:?}",
                        key,
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    last_error = Some(e);
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Invariant("fetch made no attempts".to_string())))
    }

    async fn notify(&self, text: &str) {
        let message = format!("{}-{}", self.settings.server_name, text);
        match tokio::time::timeout(DEFAULT_ALERT_TIMEOUT, self.alerts.send_alert(&message)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to deliver alert: {}", e),
            Err(_) => warn!("Alert delivery timed out after {:?}", DEFAULT_ALERT_TIMEOUT),
        }
    }
}

#[async_trait]
impl JobHandler for Pipeline {
    async fn handle(&self, body: &[u8]) -> ProcessingOutcome {
        match decode_job(body, self.settings.job_format) {
            Ok(job) => self.process(&job).await,
            Err(e) => {
                error!("Cannot decode job: {}", e);
                self.notify(&format!("cannot decode job: {}", e)).await;
                e.outcome()
            }
        }
    }

    async fn report_fault(&self, message: &str) {
        self.notify(message).await;
    }
}

fn outcome_error(outcome: &ProcessingOutcome) -> String {
    match outcome {
        ProcessingOutcome::TransientFailure(e) | ProcessingOutcome::PermanentFailure(e) => {
            e.to_string()
        }
        _ => String::new(),
    }
}

/// A filename must name a file, not the prefix directory or a subdirectory.
fn check_file_name(file_name: &str) -> Result<()> {
    if file_name.trim_start_matches('/').is_empty() || file_name.ends_with('/') {
        return Err(Error::InvalidKey(format!(
            "'{}' does not name a file",
            file_name
        )));
    }
    Ok(())
}

/// Location of an original: job filenames are relative to `prefix`.
pub fn source_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let file_name = file_name.trim_start_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix, file_name)
    }
}

/// Derives where the compressed image is written.
///
/// The directory part of `source` goes through the exact-match sub-path table
/// and the extension becomes `.jpeg` when the original was converted.
pub fn output_key(source: &str, converted: bool, sub_paths: &SubPathMap) -> String {
    let (dir, base) = match source.rfind('/') {
        Some(idx) => source.split_at(idx + 1),
        None => ("", source),
    };
    let base = if converted {
        change_extension(base, "jpeg")
    } else {
        base.to_string()
    };
    format!("{}{}", sub_paths.resolve(dir), base)
}

fn change_extension(file_name: &str, extension: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}.{}", &file_name[..idx], extension),
        _ => format!("{}.{}", file_name, extension),
    }
}
