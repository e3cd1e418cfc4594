//! Wire protocol between the pool manager and its execution units.
//!
//! Every message in either direction travels as an [`Envelope`]:
//! `{"type": <string>, "payload": <json>}`. Unit-to-manager traffic is decoded
//! into the exhaustive [`UnitMessage`] enum; manager-to-unit traffic carries a
//! [`JobRequest`] whose `type` is the job name and whose `payload` is the job
//! parameters. Payloads are plain JSON so they can cross thread or process
//! boundaries without live references.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::PoolError;

/// Raw wire message as exchanged with a unit transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message tag; a job name for requests, a message kind for responses.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Structured message body.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope with the given tag and payload.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: Some(kind.into()),
            payload,
        }
    }

    /// The message tag, treating an empty string as absent.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.kind.as_deref().filter(|k| !k.is_empty())
    }

    /// Serialize to a JSON string for transports that carry text frames.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Protocol` if the payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, PoolError> {
        serde_json::to_string(self).map_err(|e| PoolError::Protocol(format!("encode failed: {e}")))
    }

    /// Parse an envelope from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Protocol` if the input is not a JSON object with an
    /// optional `type` string and an optional `payload`.
    pub fn from_json(input: &str) -> Result<Self, PoolError> {
        serde_json::from_str(input).map_err(|e| PoolError::Protocol(format!("decode failed: {e}")))
    }
}

/// Why a unit reported an `error` message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The job handler called `fail`.
    #[default]
    Job,
    /// The unit had no handler for the requested job.
    UnknownJob,
    /// The unit could not make sense of the request it received.
    Protocol,
}

/// Messages sent from an execution unit to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitMessage {
    /// Unit finished initializing and can accept a job.
    Ready,
    /// Intermediate progress of the running job.
    Progress {
        /// Work done so far.
        current: f64,
        /// Total amount of work; always positive.
        total: f64,
    },
    /// Job finished successfully.
    Complete {
        /// Job result.
        payload: Value,
    },
    /// Job finished with an application-level failure.
    Error {
        /// Failure detail supplied by the unit.
        error: Value,
        /// Category of the failure.
        kind: FailureKind,
    },
}

#[derive(Deserialize)]
struct ProgressBody {
    current: f64,
    total: f64,
}

#[derive(Deserialize)]
struct CompleteBody {
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Value,
    #[serde(default)]
    kind: FailureKind,
}

fn decode_body<T: for<'de> Deserialize<'de>>(tag: &str, payload: Value) -> Result<T, PoolError> {
    serde_json::from_value(payload)
        .map_err(|e| PoolError::Protocol(format!("malformed `{tag}` payload: {e}")))
}

impl UnitMessage {
    /// Tag used on the wire for this message.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Build a progress message, rejecting values that cannot form a ratio in `[0, 1]`.
    ///
    /// Fractional values are accepted so transports reporting e.g. bytes or
    /// percentages as floats keep their progress.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Protocol` if `total` is not a positive finite
    /// number or `current` lies outside `[0, total]`.
    pub fn progress(current: f64, total: f64) -> Result<Self, PoolError> {
        if !(total.is_finite() && total > 0.0) {
            return Err(PoolError::Protocol(format!(
                "progress total must be a positive number, got {total}"
            )));
        }
        if !(0.0..=total).contains(&current) {
            return Err(PoolError::Protocol(format!(
                "progress current {current} is outside [0, {total}]"
            )));
        }
        Ok(Self::Progress { current, total })
    }

    /// Progress message from integer work counts.
    ///
    /// # Errors
    ///
    /// Same as [`UnitMessage::progress`].
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_steps(current: u64, total: u64) -> Result<Self, PoolError> {
        Self::progress(current as f64, total as f64)
    }

    /// Decode a typed message from a raw envelope.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Protocol` for a missing or unknown tag, or for a
    /// payload that does not match the tag.
    pub fn decode(envelope: Envelope) -> Result<Self, PoolError> {
        let tag = envelope
            .tag()
            .ok_or_else(|| PoolError::Protocol("message has no type".into()))?
            .to_owned();
        match tag.as_str() {
            "ready" => Ok(Self::Ready),
            "progress" => {
                let body: ProgressBody = decode_body(&tag, envelope.payload)?;
                Self::progress(body.current, body.total)
            }
            "complete" => {
                let body: CompleteBody = decode_body(&tag, envelope.payload)?;
                Ok(Self::Complete {
                    payload: body.payload,
                })
            }
            "error" => {
                let body: ErrorBody = decode_body(&tag, envelope.payload)?;
                Ok(Self::Error {
                    error: body.error,
                    kind: body.kind,
                })
            }
            other => Err(PoolError::Protocol(format!(
                "unknown message type `{other}` sent to manager"
            ))),
        }
    }

    /// Encode into a wire envelope.
    #[must_use]
    pub fn encode(self) -> Envelope {
        let tag = self.tag();
        let payload = match self {
            Self::Ready => Value::Object(serde_json::Map::new()),
            Self::Progress { current, total } => {
                serde_json::json!({ "current": current, "total": total })
            }
            Self::Complete { payload } => serde_json::json!({ "payload": payload }),
            Self::Error { error, kind } => serde_json::json!({ "error": error, "kind": kind }),
        };
        Envelope::new(tag, payload)
    }
}

/// A job request sent from the manager to a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Name of the registered job to run.
    pub job_name: String,
    /// Job parameters; an empty object when the caller supplied none.
    pub params: Value,
}

impl JobRequest {
    /// Create a request, defaulting absent params to `{}`.
    pub fn new(job_name: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            job_name: job_name.into(),
            params: params.unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        }
    }

    /// Encode into a wire envelope.
    #[must_use]
    pub fn encode(self) -> Envelope {
        Envelope::new(self.job_name, self.params)
    }

    /// Decode a request received by a unit.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Protocol` if the envelope carries no job name.
    pub fn decode(envelope: Envelope) -> Result<Self, PoolError> {
        let job_name = envelope
            .tag()
            .ok_or_else(|| PoolError::Protocol("job request has no job name".into()))?
            .to_owned();
        Ok(Self {
            job_name,
            params: envelope.payload,
        })
    }
}
