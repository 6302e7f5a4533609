//! Content-Length framing for adapter stdio.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::DapError;
use crate::protocol::ProtocolMessage;

/// Encode a message into wire format with its Content-Length header.
pub fn encode_message(message: &ProtocolMessage) -> Result<Vec<u8>, DapError> {
    let body = serde_json::to_vec(message)
        .map_err(|e| DapError::Transport(format!("serialize failed: {e}")))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Read one framed message.
///
/// Returns `Ok(None)` on a clean end of stream between messages.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<ProtocolMessage>, DapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| DapError::Transport(e.to_string()))?;
        if n == 0 {
            if saw_header {
                return Err(DapError::Transport("stream ended inside header".into()));
            }
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            let value = value.trim();
            content_length = Some(value.parse::<usize>().map_err(|e| {
                DapError::Transport(format!("invalid Content-Length value '{value}': {e}"))
            })?);
        }
    }

    let length =
        content_length.ok_or_else(|| DapError::Transport("missing Content-Length header".into()))?;
    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| DapError::Transport(format!("incomplete body: {e}")))?;

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| DapError::InvalidResponse(format!("JSON parse error: {e}")))
}
