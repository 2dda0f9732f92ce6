use serde::{Deserialize, Serialize};

// Request types
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum MatcherRequest {
    Enroll(ProbeRequest),
    Compare(ProbeRequest),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProbeRequest {
    pub user_id: String,
    pub image_payload: Vec<u8>,
}

// Response types
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum MatcherResponse {
    Verdict(MatchVerdict),
    Error(String),
}

/// `success: false` is a definitive answer, not a failure of the service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchVerdict {
    pub success: bool,
    pub confidence: Option<f32>,
    pub error: Option<String>,
}

// Socket path constant
pub const SOCKET_PATH: &str = "/run/facegate/matcher.sock";

/// Frames are a little-endian u32 length followed by the bincode body.
pub const LENGTH_PREFIX_BYTES: usize = 4;
