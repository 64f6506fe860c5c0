//! Length-delimited JSON framing for the daemon connection
//!
//! Each record on the wire is a `u32` big-endian payload length followed by
//! a JSON object. Decoding is structural only: a frame that fails to parse
//! terminates the connection attempt, it is never skipped.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use taskboard_core::prelude::*;
use taskboard_core::{Header, TaskUpdate};

/// Sanity cap on a single frame. Anything larger means the stream is
/// desynchronized.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Read one length-delimited JSON record.
///
/// EOF at a frame boundary surfaces as an `UnexpectedEof` IO error; both it
/// and mid-frame truncation terminate the connection attempt.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);

    if len > MAX_FRAME_LEN {
        return Err(Error::protocol(format!(
            "frame length {len} exceeds cap of {MAX_FRAME_LEN}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Write one length-delimited JSON record. Used by tests and tooling; the
/// dashboard side of the protocol is read-only.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    let len = u32::try_from(payload.len()).map_err(|_| Error::protocol("frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Header> {
    read_frame(reader).await
}

pub async fn read_update<R: AsyncRead + Unpin>(reader: &mut R) -> Result<TaskUpdate> {
    read_frame(reader).await
}
