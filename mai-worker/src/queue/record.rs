//! Job descriptors and output records
//!
//! Descriptors are written by the producer into `pending/`; output records are
//! written only by the worker into `results/` or `failed/`.

use crate::error::JobError;
use crate::pipeline::types::ResultEnvelope;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Producer-written job description
///
/// Fields other than `id` and `uploadId` are kept verbatim in `extra` and
/// written back unchanged into the output record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobDescriptor {
    /// Parse descriptor text
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        serde_json::from_str(raw).map_err(|e| JobError::InvalidDescriptor(e.to_string()))
    }
}

/// Best-effort JSON form of descriptor text that failed to parse
///
/// Valid JSON is kept as is; anything else becomes a JSON string.
pub fn raw_job_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Record written to `results/` or `failed/`
///
/// Exactly one of `result` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub job: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputRecord {
    pub fn success(job: &JobDescriptor, result: ResultEnvelope) -> serde_json::Result<Self> {
        Ok(Self {
            job: serde_json::to_value(job)?,
            result: Some(result),
            error: None,
        })
    }

    pub fn failure(job: Value, message: impl Into<String>) -> Self {
        Self {
            job,
            result: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}
