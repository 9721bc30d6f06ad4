// src/types.rs
use serde::Serialize;
use std::time::Duration;

/// Token and visitor identifier as handed to the proxy. Both fields are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub token: String,
    pub visitor_id: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("generator script not found in {dir}")]
    GeneratorNotFound { dir: String },
    #[error("generator timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("generator process failed: {0}")]
    ProcessFailure(String),
    #[error("failed to parse token from generator output")]
    ParseFailure,
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("no credential source succeeded")]
    Exhausted,
}

pub type GenerationOutcome = Result<CredentialPair, GenerationError>;

#[derive(Serialize)]
pub struct PushPayload<'a> {
    #[serde(rename = "poToken")]
    pub po_token: &'a str,
    #[serde(rename = "visitorData")]
    pub visitor_data: &'a str,
}

#[derive(Serialize)]
pub struct RefreshRes {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefreshRes {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, message: None, error: Some(error.into()) }
    }
}
