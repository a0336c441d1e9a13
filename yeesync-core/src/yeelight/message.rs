//! Yeelight wire messages.
//!
//! Every message is a single JSON object. Requests carry an `id` that
//! the bulb echoes back in its reply; notifications have no `id`.
//!
//! ```text
//! → {"id":1,"method":"set_bright","params":[50,"smooth",300]}
//! ← {"id":1,"result":["ok"]}
//! ← {"id":2,"error":{"code":-1,"message":"unsupported method"}}
//! ← {"method":"props","params":{"power":"on","bright":"10"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::device::Smoothing;
use crate::error::DeviceError;

/// Shortest transition the bulb accepts for the `"smooth"` effect.
pub const MIN_SMOOTH_MS: u32 = 30;

// ── Method ───────────────────────────────────────────────────────

/// Control methods this client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GetProp,
    SetPower,
    SetBright,
    SetCtAbx,
    SetRgb,
    SetMusic,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::GetProp => "get_prop",
            Method::SetPower => "set_power",
            Method::SetBright => "set_bright",
            Method::SetCtAbx => "set_ct_abx",
            Method::SetRgb => "set_rgb",
            Method::SetMusic => "set_music",
        }
    }
}

// ── Request ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: u64,
    pub method: &'static str,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: u64, method: Method, params: Vec<Value>) -> Self {
        Self {
            id,
            method: method.as_str(),
            params,
        }
    }
}

/// Build `[value, effect, duration]` params for the `set_*` family.
pub fn with_effect(value: Value, smoothing: Smoothing) -> Vec<Value> {
    if smoothing.is_none() {
        vec![value, json!("sudden"), json!(0)]
    } else {
        let ms = smoothing.as_millis().max(MIN_SMOOTH_MS);
        vec![value, json!("smooth"), json!(ms)]
    }
}

// ── Incoming ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Raw shape shared by replies and notifications.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

/// A decoded message from the bulb.
#[derive(Debug)]
pub enum Message {
    Reply {
        id: u64,
        result: Result<Vec<Value>, DeviceError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl TryFrom<Incoming> for Message {
    type Error = DeviceError;

    fn try_from(msg: Incoming) -> Result<Self, Self::Error> {
        match (msg.id, msg.method) {
            (Some(id), _) => {
                let result = match (msg.result, msg.error) {
                    (_, Some(err)) => Err(DeviceError::Rejected {
                        code: err.code,
                        message: err.message,
                    }),
                    (Some(values), None) => Ok(values),
                    (None, None) => Err(DeviceError::Malformed(format!(
                        "reply {id} has neither result nor error"
                    ))),
                };
                Ok(Message::Reply { id, result })
            }
            (None, Some(method)) => Ok(Message::Notification {
                method,
                params: msg.params.unwrap_or(Value::Null),
            }),
            (None, None) => Err(DeviceError::Malformed(
                "message has neither id nor method".into(),
            )),
        }
    }
}

/// Extract the single string value a `get_prop` reply carries.
pub fn property_value(result: &[Value]) -> Result<String, DeviceError> {
    match result.first() {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(DeviceError::Malformed("empty get_prop result".into())),
    }
}
