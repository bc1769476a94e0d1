//! Smart Home wire protocol implementation.
//! Handles request shaping, length-prefixed framing and stream reads.

use crate::crypto;
use crate::error::{Result, SmartHomeError};
use byteorder::{BigEndian, ByteOrder};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Control port used for TCP queries and UDP discovery.
pub const DEFAULT_PORT: u16 = 9999;

/// Size of the big-endian length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest frame accepted from a device.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub const NS_SYSTEM: &str = "system";
pub const NS_TIME: &str = "time";
pub const NS_EMETER: &str = "emeter";
pub const NS_BULB_EMETER: &str = "smartlife.iot.common.emeter";
pub const NS_LIGHTING: &str = "smartlife.iot.smartbulb.lightingservice";

pub const CMD_GET_SYSINFO: &str = "get_sysinfo";
pub const CMD_GET_REALTIME: &str = "get_realtime";

/// One command addressed to one namespace.
///
/// Serialized as `{ namespace: { command: args } }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub namespace: String,
    pub command: String,
    pub args: Option<Value>,
}

impl Request {
    pub fn new<N, C>(namespace: N, command: C, args: Option<Value>) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            command: command.into(),
            args,
        }
    }

    /// Build the JSON tree sent on the wire. Missing arguments become `{}`.
    pub fn to_value(&self) -> Value {
        let args = self.args.clone().unwrap_or_else(|| Value::Object(Map::new()));
        let mut inner = Map::new();
        inner.insert(self.command.clone(), args);
        let mut outer = Map::new();
        outer.insert(self.namespace.clone(), Value::Object(inner));
        Value::Object(outer)
    }
}

/// Broadcast probe asking for sysinfo and realtime metering at once.
pub fn discovery_request() -> Value {
    json!({
        NS_EMETER: { CMD_GET_REALTIME: null },
        NS_SYSTEM: { CMD_GET_SYSINFO: null },
    })
}

/// Obfuscate a plaintext and prepend the length of the plaintext.
///
/// Fails if the length does not fit the 32-bit prefix.
pub fn encode(plaintext: &[u8]) -> Result<Vec<u8>> {
    let header = length_prefix(plaintext.len())?;
    let mut data = Vec::with_capacity(HEADER_LEN + plaintext.len());
    data.extend_from_slice(&header);
    data.extend_from_slice(&crypto::encrypt(plaintext));
    Ok(data)
}

fn length_prefix(len: usize) -> Result<[u8; HEADER_LEN]> {
    let len32 = u32::try_from(len).map_err(|_| SmartHomeError::FrameTooLarge(len))?;
    let mut header = [0u8; HEADER_LEN];
    BigEndian::write_u32(&mut header, len32);
    Ok(header)
}

/// Parse a complete frame, honoring its length prefix.
///
/// Bytes past the announced length are ignored.
pub fn decode(frame: &[u8]) -> Result<Vec<u8>> {
    if frame.len() < HEADER_LEN {
        return Err(SmartHomeError::TruncatedFrame {
            expected: HEADER_LEN,
        });
    }
    let len = frame_len(&frame[..HEADER_LEN])?;
    let body = &frame[HEADER_LEN..];
    if body.len() < len {
        return Err(SmartHomeError::TruncatedFrame { expected: len });
    }
    Ok(crypto::decrypt(&body[..len]))
}

fn frame_len(header: &[u8]) -> Result<usize> {
    let len = BigEndian::read_u32(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(SmartHomeError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Read one frame from a stream and return its plaintext.
///
/// Partial reads are absorbed; an early EOF is a truncated frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| eof_as_truncated(e, HEADER_LEN))?;

    let len = frame_len(&header)?;
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| eof_as_truncated(e, len))?;
    Ok(crypto::decrypt(&body))
}

fn eof_as_truncated(err: std::io::Error, expected: usize) -> SmartHomeError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        SmartHomeError::TruncatedFrame { expected }
    } else {
        err.into()
    }
}
