// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! IPC wire format for daemon/CLI communication (`spec.md` §6 CLI surface).
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Refuses to allocate past this size for an incoming frame, so a corrupt
/// or hostile length prefix cannot be used to exhaust memory.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

/// Serialize `value` to its raw JSON bytes, without a length prefix.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserialize `bytes` as JSON.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write `payload` framed with a 4-byte big-endian length prefix.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError> {
    if payload.len() > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLarge { len: payload.len(), max: MAX_MESSAGE_LEN });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLarge { len, max: MAX_MESSAGE_LEN });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Read one framed message and decode it as JSON.
pub async fn read_json<R: AsyncRead + Unpin, T: DeserializeOwned>(reader: &mut R) -> Result<T, ProtocolError> {
    let bytes = read_message(reader).await?;
    decode(&bytes)
}

/// Encode `value` as JSON and write it as one framed message.
pub async fn write_json<W: AsyncWrite + Unpin, T: Serialize>(writer: &mut W, value: &T) -> Result<(), ProtocolError> {
    let bytes = encode(value)?;
    write_message(writer, &bytes).await
}
