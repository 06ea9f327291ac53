//! Binary frame codec for the UniFi OS update socket.
//!
//! Every application-level packet is two framed segments back to back: an
//! action frame describing `(action, newUpdateId, modelKey, id)` and a data
//! frame carrying the payload. Each frame starts with an 8-byte header:
//!
//! | offset | size | field |
//! |--------|------|-------------------------------------|
//! | 0      | 1    | packet type (1 = action, 2 = payload) |
//! | 1      | 1    | payload format (1 JSON, 2 UTF-8, 3 deflated JSON) |
//! | 2      | 1    | deflate flag |
//! | 3      | 1    | reserved, zero on write, ignored on read |
//! | 4      | 4    | payload length, big-endian |

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{ModelType, PayloadFormat, WsAction};

pub const WS_HEADER_SIZE: usize = 8;

/// Frames larger than this are rejected outright.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const PACKET_TYPE_ACTION: u8 = 1;
pub const PACKET_TYPE_PAYLOAD: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub packet_type: u8,
    pub payload_format: u8,
    pub deflated: u8,
    pub reserved: u8,
    pub payload_size: u32,
}

impl FrameHeader {
    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < WS_HEADER_SIZE {
            return Err(Error::FrameDecode(format!(
                "header truncated: {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            packet_type: data[0],
            payload_format: data[1],
            deflated: data[2],
            reserved: data[3],
            payload_size: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    fn encode(&self) -> [u8; WS_HEADER_SIZE] {
        let size = self.payload_size.to_be_bytes();
        [
            self.packet_type,
            self.payload_format,
            self.deflated,
            0,
            size[0],
            size[1],
            size[2],
            size[3],
        ]
    }
}

/// One decoded frame: header plus the inflated payload bytes.
#[derive(Debug, Clone)]
pub struct WsFrame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl WsFrame {
    /// Decodes a frame starting at `position`, returning the frame and the
    /// total number of raw bytes it occupied.
    pub fn decode(data: &[u8], position: usize) -> Result<(Self, usize)> {
        let header = FrameHeader::decode(&data[position.min(data.len())..])?;
        let payload_size = header.payload_size as usize;
        if payload_size > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge(payload_size));
        }

        let payload_start = position + WS_HEADER_SIZE;
        let payload_end = payload_start + payload_size;
        if payload_end > data.len() {
            return Err(Error::FrameDecode(format!(
                "payload extends beyond message: {payload_end} > {}",
                data.len()
            )));
        }

        let raw = &data[payload_start..payload_end];
        // format 3 implies compression even when the deflate flag is unset;
        // both are honored on the wire.
        let compressed = header.deflated != 0
            || header.payload_format == PayloadFormat::DeflatedJson.as_byte();
        let payload = if compressed && !raw.is_empty() {
            inflate(raw)?
        } else {
            raw.to_vec()
        };

        Ok((
            Self { header, payload },
            WS_HEADER_SIZE + payload_size,
        ))
    }

    /// Encodes a frame, compressing the payload when `deflate` is set.
    pub fn encode(packet_type: u8, format: PayloadFormat, deflate: bool, payload: &[u8]) -> Result<Vec<u8>> {
        let body = if deflate { compress(payload)? } else { payload.to_vec() };
        if body.len() > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge(body.len()));
        }
        let header = FrameHeader {
            packet_type,
            payload_format: format.as_byte(),
            deflated: u8::from(deflate),
            reserved: 0,
            payload_size: body.len() as u32,
        };
        let mut out = Vec::with_capacity(WS_HEADER_SIZE + body.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parses the payload according to the header's format byte.
    pub fn to_value(&self) -> Result<Value> {
        if self.payload.is_empty() {
            return Ok(Value::Null);
        }
        match PayloadFormat::from_byte(self.header.payload_format) {
            Some(PayloadFormat::Utf8String) => {
                let text = std::str::from_utf8(&self.payload)
                    .map_err(|_| Error::FrameDecode("invalid UTF-8 payload".to_string()))?;
                Ok(Value::String(text.to_string()))
            }
            Some(PayloadFormat::Json) | Some(PayloadFormat::DeflatedJson) => {
                Ok(serde_json::from_slice(&self.payload)?)
            }
            None => Err(Error::FrameDecode(format!(
                "unknown payload format: {}",
                self.header.payload_format
            ))),
        }
    }
}

/// Raw inflate; the controller does not use the zlib wrapper.
fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decoded body of the action frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFrame {
    pub action: WsAction,
    pub new_update_id: Option<String>,
    pub model_key: ModelType,
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

/// One complete application-level packet: action frame plus payload frame.
#[derive(Debug, Clone)]
pub struct WsPacket {
    pub action: ActionFrame,
    pub payload: Value,
}

impl WsPacket {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (action_frame, consumed) = WsFrame::decode(data, 0)?;
        let (data_frame, _) = WsFrame::decode(data, consumed)?;

        let action: ActionFrame = serde_json::from_value(action_frame.to_value()?)?;
        let payload = data_frame.to_value()?;

        Ok(Self { action, payload })
    }

    /// Encodes the packet as two plain JSON frames. A null payload becomes a
    /// zero-length data frame, which is what the controller sends for
    /// `remove` actions.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let action_body = serde_json::to_vec(&self.action)?;
        let payload_body = match &self.payload {
            Value::Null => Vec::new(),
            other => serde_json::to_vec(other)?,
        };

        let mut out = WsFrame::encode(
            PACKET_TYPE_ACTION,
            PayloadFormat::Json,
            false,
            &action_body,
        )?;
        out.extend(WsFrame::encode(
            PACKET_TYPE_PAYLOAD,
            PayloadFormat::Json,
            false,
            &payload_body,
        )?);
        Ok(out)
    }
}
