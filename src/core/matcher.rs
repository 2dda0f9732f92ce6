use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque image payload forwarded to the matcher as captured.
#[derive(Debug, Clone)]
pub struct Probe {
    pub payload: Vec<u8>,
}

impl Probe {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub is_match: bool,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollVerdict {
    Accepted,
    Rejected(String),
}

/// Infrastructure failure. A definitive no-match is never an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct MatcherError(pub String);

/// External biometric matcher. Implementations make one call per invocation and never retry.
#[async_trait]
pub trait Matcher: Send + Sync {
    async fn enroll(&self, probe: &Probe, user_id: &str) -> Result<EnrollVerdict, MatcherError>;

    async fn compare(&self, probe: &Probe, user_id: &str) -> Result<MatchResult, MatcherError>;
}
