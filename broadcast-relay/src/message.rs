use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ReadError, WriteError};

/// Longest frame accepted from a peer: a JSON line including its newline,
/// or one WebSocket message.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// One relayable unit. Carries no sender or timestamp; every transport
/// encodes it as `{"text": "..."}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    #[serde(default)]
    pub text: String,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

pub fn decode(raw: &str) -> Result<Message, ReadError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn encode(message: &Message) -> Result<String, WriteError> {
    Ok(serde_json::to_string(message)?)
}

/// Reads the next JSON line. Returns `Ok(None)` once the peer closes its
/// side of the stream, and [`ReadError::TooLong`] for a line that does not
/// end within [`MAX_FRAME_BYTES`].
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, ReadError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    // Line-oriented framing keeps the relay usable from netcat.
    let limit = MAX_FRAME_BYTES as u64;
    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes = (&mut *reader)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await?;
        if bytes == 0 {
            return Ok(None);
        }
        if bytes as u64 == limit && line.last() != Some(&b'\n') {
            return Err(ReadError::TooLong(MAX_FRAME_BYTES));
        }

        let trimmed = trim_line_ending(&line);
        if trimmed.is_empty() {
            continue;
        }

        return Ok(Some(serde_json::from_slice(trimmed)?));
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|byte| !matches!(byte, b'\n' | b'\r'))
        .map_or(0, |last| last + 1);
    &line[..end]
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), WriteError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(message)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}
