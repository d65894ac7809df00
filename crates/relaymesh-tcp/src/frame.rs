//! The TCP binary framing codec (§6.1).
//!
//! Wire format, big-endian throughout:
//! `[1-byte type][4-byte session-id length][session-id bytes][4-byte
//! payload length][payload bytes]`. The payload length/bytes are present
//! only for `AdHoc`, `Message`, and `Connect`; `Disconnect` and
//! `NotExist` stop after the session id.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{TcpError, TcpResult};

/// The default ceiling on a session-id or payload length field; a
/// connection that declares more than this aborts with a protocol error
/// rather than allocating an attacker-controlled buffer.
pub const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// One frame's message type. Values are assigned for this wire format;
/// they are not required to match any other implementation's encoding,
/// only to round-trip within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// A fire-and-forget or request/response payload keyed by session id.
    AdHoc,
    /// A payload delivered on an already-established session.
    Message,
    /// Opens a session; permits the connection to continue past one
    /// exchange (§4.6's "unless the protocol message type permits
    /// continuation").
    Connect,
    /// Closes a session. Carries no payload.
    Disconnect,
    /// The referenced session id is unknown to the server. Carries no
    /// payload.
    NotExist,
}

impl FrameType {
    fn from_byte(byte: i8) -> TcpResult<Self> {
        match byte {
            0 => Ok(FrameType::AdHoc),
            1 => Ok(FrameType::Message),
            2 => Ok(FrameType::Connect),
            3 => Ok(FrameType::Disconnect),
            4 => Ok(FrameType::NotExist),
            other => Err(TcpError::Protocol(format!("unknown frame type byte {other}"))),
        }
    }

    fn to_byte(self) -> i8 {
        match self {
            FrameType::AdHoc => 0,
            FrameType::Message => 1,
            FrameType::Connect => 2,
            FrameType::Disconnect => 3,
            FrameType::NotExist => 4,
        }
    }

    /// Whether this frame type carries a payload length + bytes section.
    #[must_use]
    pub fn carries_payload(self) -> bool {
        matches!(self, FrameType::AdHoc | FrameType::Message | FrameType::Connect)
    }

    /// Whether a connection may read another frame after replying to one
    /// of this type, rather than closing immediately.
    #[must_use]
    pub fn permits_continuation(self) -> bool {
        matches!(self, FrameType::Connect | FrameType::Message)
    }
}

/// One decoded (or about-to-be-encoded) frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub session_id: String,
    pub payload: Option<Bytes>,
}

impl Frame {
    #[must_use]
    pub fn new(frame_type: FrameType, session_id: impl Into<String>, payload: Option<Bytes>) -> Self {
        Self {
            frame_type,
            session_id: session_id.into(),
            payload,
        }
    }

    /// Read one frame from `reader`, enforcing `max_frame_len` on both
    /// the session-id and payload length fields. A negative length (after
    /// signed interpretation) or a length exceeding the maximum aborts
    /// the connection with [`TcpError::Protocol`].
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R, max_frame_len: u32) -> TcpResult<Self> {
        let type_byte = reader.read_i8().await.map_err(TcpError::Io)?;
        let frame_type = FrameType::from_byte(type_byte)?;

        let session_id = read_length_prefixed_string(reader, max_frame_len).await?;

        let payload = if frame_type.carries_payload() {
            Some(read_length_prefixed_bytes(reader, max_frame_len).await?)
        } else {
            None
        };

        Ok(Frame::new(frame_type, session_id, payload))
    }

    /// Write one frame to `writer`, per the same layout `read_from` reads.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> TcpResult<()> {
        writer.write_i8(self.frame_type.to_byte()).await.map_err(TcpError::Io)?;

        let session_bytes = self.session_id.as_bytes();
        writer
            .write_i32(i32::try_from(session_bytes.len()).unwrap_or(i32::MAX))
            .await
            .map_err(TcpError::Io)?;
        writer.write_all(session_bytes).await.map_err(TcpError::Io)?;

        if self.frame_type.carries_payload() {
            let payload = self.payload.as_deref().unwrap_or(&[]);
            writer
                .write_i32(i32::try_from(payload.len()).unwrap_or(i32::MAX))
                .await
                .map_err(TcpError::Io)?;
            writer.write_all(payload).await.map_err(TcpError::Io)?;
        }

        writer.flush().await.map_err(TcpError::Io)
    }
}

async fn read_length(reader: &mut (impl AsyncRead + Unpin), max_frame_len: u32) -> TcpResult<usize> {
    let raw = reader.read_i32().await.map_err(TcpError::Io)?;
    if raw < 0 {
        return Err(TcpError::Protocol(format!("negative length field {raw}")));
    }
    let len = raw as u32;
    if len > max_frame_len {
        return Err(TcpError::Protocol(format!(
            "length field {len} exceeds maximum {max_frame_len}"
        )));
    }
    Ok(len as usize)
}

async fn read_length_prefixed_bytes(reader: &mut (impl AsyncRead + Unpin), max_frame_len: u32) -> TcpResult<Bytes> {
    let len = read_length(reader, max_frame_len).await?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(TcpError::Io)?;
    Ok(Bytes::from(buf))
}

async fn read_length_prefixed_string(reader: &mut (impl AsyncRead + Unpin), max_frame_len: u32) -> TcpResult<String> {
    let bytes = read_length_prefixed_bytes(reader, max_frame_len).await?;
    String::from_utf8(bytes.to_vec()).map_err(|e| TcpError::Protocol(format!("invalid UTF-8 session id: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_ad_hoc_frame() {
        let frame = Frame::new(FrameType::AdHoc, "S1", Some(Bytes::from_static(b"{\"ping\":1}")));
        let mut buf = Vec::new();
        frame.write_to(&mut buf).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = Frame::read_from(&mut cursor, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(decoded.frame_type, FrameType::AdHoc);
        assert_eq!(decoded.session_id, "S1");
        assert_eq!(decoded.payload.unwrap(), Bytes::from_static(b"{\"ping\":1}"));
    }

    #[tokio::test]
    async fn disconnect_frame_has_no_payload_section() {
        let frame = Frame::new(FrameType::Disconnect, "S1", None);
        let mut buf = Vec::new();
        frame.write_to(&mut buf).await.unwrap();
        // type(1) + len(4) + "S1"(2), nothing else.
        assert_eq!(buf.len(), 1 + 4 + 2);

        let mut cursor = Cursor::new(buf);
        let decoded = Frame::read_from(&mut cursor, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(decoded.frame_type, FrameType::Disconnect);
        assert!(decoded.payload.is_none());
    }

    #[tokio::test]
    async fn oversized_length_field_aborts_with_protocol_error() {
        let mut buf = Vec::new();
        buf.push(FrameType::AdHoc.to_byte() as u8);
        buf.extend_from_slice(&0i32.to_be_bytes()); // empty session id
        buf.extend_from_slice(&(DEFAULT_MAX_FRAME_LEN + 1).to_be_bytes()); // oversized payload len
        let mut cursor = Cursor::new(buf);
        let result = Frame::read_from(&mut cursor, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(result, Err(TcpError::Protocol(_))));
    }
}
