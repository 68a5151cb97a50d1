//! Inbound wire frames.
//!
//! Every frame is a JSON object with a `type` discriminator. Only
//! `metric_updated` carries a `data` object to merge; other types are
//! accepted and ignored.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const METRIC_UPDATED: &str = "metric_updated";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    #[error("metric_updated frame without a data object")]
    MissingData,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Partial metrics to overlay onto the snapshot.
    MetricUpdated(Map<String, Value>),
    /// Any other frame type, kept only for logging.
    Other(String),
}

#[derive(Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

pub fn parse_frame(text: &str) -> Result<Frame, FrameError> {
    let wire: WireFrame = serde_json::from_str(text)?;
    if wire.kind != METRIC_UPDATED {
        return Ok(Frame::Other(wire.kind));
    }
    match wire.data {
        Some(Value::Object(data)) => Ok(Frame::MetricUpdated(data)),
        _ => Err(FrameError::MissingData),
    }
}

pub fn parse_binary_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    let text = std::str::from_utf8(bytes).map_err(|_| FrameError::NotUtf8)?;
    parse_frame(text)
}
