use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::common::config::MatcherConfig;
use crate::common::DevMode;
use crate::core::matcher::{EnrollVerdict, MatchResult, Matcher, MatcherError, Probe};
use crate::service::protocol::{MatchVerdict, MatcherRequest, MatcherResponse, ProbeRequest, LENGTH_PREFIX_BYTES};

/// Matcher reached over a Unix socket, one connection per call.
///
/// Every failure that is not a definitive verdict from the service comes back
/// as `MatcherError`: connect and I/O errors, the deadline, oversize or
/// undecodable messages, and explicit `Error` responses.
pub struct RemoteMatcher {
    socket_path: PathBuf,
    timeout: Duration,
    max_message_bytes: usize,
}

impl RemoteMatcher {
    pub fn new(socket_path: PathBuf, timeout: Duration, max_message_bytes: usize) -> Self {
        Self {
            socket_path,
            timeout,
            max_message_bytes,
        }
    }

    pub fn from_config(config: &MatcherConfig, dev_mode: &DevMode) -> Self {
        let socket_path = config
            .socket_path
            .clone()
            .unwrap_or_else(|| dev_mode.matcher_socket());
        Self::new(
            socket_path,
            Duration::from_millis(config.timeout_ms),
            config.max_message_bytes,
        )
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn call(&self, request: MatcherRequest) -> Result<MatchVerdict, MatcherError> {
        let exchange = async {
            let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
                MatcherError(format!(
                    "Failed to connect to matcher at {}: {}",
                    self.socket_path.display(),
                    e
                ))
            })?;

            write_message(&mut stream, &request, self.max_message_bytes).await?;
            read_message::<_, MatcherResponse>(&mut stream, self.max_message_bytes).await
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| MatcherError(format!("Matcher timed out after {:?}", self.timeout)))??;

        match response {
            MatcherResponse::Verdict(verdict) => Ok(verdict),
            MatcherResponse::Error(msg) => Err(MatcherError(format!("Matcher error: {}", msg))),
        }
    }
}

#[async_trait]
impl Matcher for RemoteMatcher {
    async fn enroll(&self, probe: &Probe, user_id: &str) -> Result<EnrollVerdict, MatcherError> {
        let request = MatcherRequest::Enroll(ProbeRequest {
            user_id: user_id.to_string(),
            image_payload: probe.payload.clone(),
        });

        let verdict = self.call(request).await?;
        tracing::debug!(user_id, success = verdict.success, "Matcher enroll verdict");

        if verdict.success {
            Ok(EnrollVerdict::Accepted)
        } else {
            Ok(EnrollVerdict::Rejected(
                verdict.error.unwrap_or_else(|| "enrollment rejected".to_string()),
            ))
        }
    }

    async fn compare(&self, probe: &Probe, user_id: &str) -> Result<MatchResult, MatcherError> {
        let request = MatcherRequest::Compare(ProbeRequest {
            user_id: user_id.to_string(),
            image_payload: probe.payload.clone(),
        });

        let verdict = self.call(request).await?;
        tracing::debug!(
            user_id,
            success = verdict.success,
            confidence = ?verdict.confidence,
            "Matcher compare verdict"
        );

        Ok(MatchResult {
            is_match: verdict.success,
            confidence: verdict.confidence.unwrap_or(0.0),
        })
    }
}

/// Writes one length-prefixed bincode message.
pub async fn write_message<W, T>(writer: &mut W, message: &T, max_bytes: usize) -> Result<(), MatcherError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(message)
        .map_err(|e| MatcherError(format!("Failed to serialize message: {}", e)))?;
    if data.len() > max_bytes {
        return Err(MatcherError(format!(
            "Message too large: {} bytes (max {})",
            data.len(),
            max_bytes
        )));
    }
    let len = u32::try_from(data.len())
        .map_err(|_| MatcherError(format!("Message too large: {} bytes", data.len())))?;

    writer.write_all(&len.to_le_bytes()).await.map_err(io_error)?;
    writer.write_all(&data).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)?;
    Ok(())
}

/// Reads one length-prefixed bincode message, refusing bodies over `max_bytes`.
pub async fn read_message<R, T>(reader: &mut R, max_bytes: usize) -> Result<T, MatcherError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
    reader.read_exact(&mut len_buf).await.map_err(io_error)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > max_bytes {
        return Err(MatcherError(format!(
            "Message too large: {} bytes (max {})",
            len, max_bytes
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(io_error)?;

    bincode::deserialize(&buf).map_err(|e| MatcherError(format!("Failed to deserialize message: {}", e)))
}

fn io_error(e: std::io::Error) -> MatcherError {
    MatcherError(format!("Matcher I/O error: {}", e))
}
