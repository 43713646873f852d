//! Task and event model shared by every transport.
//!
//! These types are the transport-agnostic contract of the client: the gRPC
//! transport maps them onto protobuf messages, the WebSocket transport
//! serializes them as flat JSON documents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// An event pushed by the peer on a topic stream.
///
/// No schema is enforced; interpretation is up to the caller.
pub type Event = Map<String, Value>;

/// Scheduling priority of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Wire literal of this priority.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            _ => Err(Error::InvalidPriority(s.to_string())),
        }
    }
}

/// An outbound unit of work.
///
/// Immutable once built; `agent_id` is guaranteed non-empty, including for
/// values decoded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTaskRequest")]
pub struct TaskRequest {
    agent_id: String,
    payload: Map<String, Value>,
    priority: Priority,
}

#[derive(Deserialize)]
struct RawTaskRequest {
    agent_id: String,
    #[serde(default)]
    payload: Map<String, Value>,
    #[serde(default)]
    priority: Priority,
}

impl TryFrom<RawTaskRequest> for TaskRequest {
    type Error = Error;

    fn try_from(raw: RawTaskRequest) -> Result<Self> {
        Ok(Self::new(raw.agent_id, raw.payload)?.with_priority(raw.priority))
    }
}

impl TaskRequest {
    /// Create a request with `NORMAL` priority.
    pub fn new(agent_id: impl Into<String>, payload: Map<String, Value>) -> Result<Self> {
        let agent_id = agent_id.into();
        if agent_id.trim().is_empty() {
            return Err(Error::EmptyAgentId);
        }
        Ok(Self {
            agent_id,
            payload,
            priority: Priority::default(),
        })
    }

    /// Create a request from any JSON value, which must be an object.
    pub fn from_value(agent_id: impl Into<String>, payload: Value) -> Result<Self> {
        Self::new(agent_id, into_object(payload)?)
    }

    /// Set the priority while building the request.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub const fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub const fn priority(&self) -> Priority {
        self.priority
    }
}

/// The peer's answer to a [`TaskRequest`].
///
/// Normally exactly one of `result` / `error` is set. Both may be absent for
/// ack-only replies, in which case `status` carries all the information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status tokens that mark a task as failed regardless of `error`.
const FAILURE_STATUSES: [&str; 3] = ["FAILED", "FAILURE", "ERROR"];

impl TaskResponse {
    /// Whether the peer reported success.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && !FAILURE_STATUSES
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&self.status))
    }

    /// Whether the reply is a bare acknowledgement with no payload.
    pub const fn is_ack_only(&self) -> bool {
        self.result.is_none() && self.error.is_none()
    }
}

/// Decode a JSON document that must be an object.
///
/// Used for event payloads and task results on every transport.
pub fn decode_object(raw: &str) -> Result<Map<String, Value>> {
    into_object(serde_json::from_str(raw)?)
}

fn into_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err(Error::NotAnObject("null")),
        Value::Bool(_) => Err(Error::NotAnObject("a boolean")),
        Value::Number(_) => Err(Error::NotAnObject("a number")),
        Value::String(_) => Err(Error::NotAnObject("a string")),
        Value::Array(_) => Err(Error::NotAnObject("an array")),
    }
}
