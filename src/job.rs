//! Decoding of queue delivery bodies into [`Job`]s.

use crate::models::{Job, JobFormat};
use crate::{Error, Result};

/// Parses a delivery body according to the producer contract in force.
///
/// There is no fallback between formats: a body that does not match the
/// configured contract is a [`Error::Decode`], which is never retried.
pub fn decode_job(body: &[u8], format: JobFormat) -> Result<Job> {
    match format {
        JobFormat::Json => {
            let mut job = serde_json::from_slice::<Job>(body)
                .map_err(|e| Error::Decode(format!("invalid JSON job: {}", e)))?;
            job.file_name = job.file_name.trim().to_string();
            Ok(job)
        }
        JobFormat::Raw => {
            let file_name = std::str::from_utf8(body)
                .map_err(|e| Error::Decode(format!("filename is not UTF-8: {}", e)))?;
            Ok(Job::new(file_name.trim()))
        }
    }
}
