#![forbid(unsafe_code)]

use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Clone, Debug, Deserialize)]
pub struct Envelope {
    pub cmd: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Clone, Debug)]
pub struct OpError {
    pub code: String,
    pub message: String,
    pub recovery: Option<String>,
}

impl OpError {
    pub fn to_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("code".to_string(), Value::String(self.code.clone()));
        obj.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(recovery) = &self.recovery {
            obj.insert("recovery".to_string(), Value::String(recovery.clone()));
        }
        Value::Object(obj)
    }
}

#[derive(Clone, Debug)]
pub struct OpResponse {
    pub cmd: String,
    pub result: Value,
    pub error: Option<OpError>,
}

impl OpResponse {
    pub fn success(cmd: String, result: Value) -> Self {
        Self {
            cmd,
            result,
            error: None,
        }
    }

    pub fn error(cmd: String, error: OpError) -> Self {
        Self {
            cmd,
            result: json!({}),
            error: Some(error),
        }
    }

    pub fn into_value(self) -> Value {
        json!({
            "success": self.error.is_none(),
            "cmd": self.cmd,
            "result": self.result,
            "error": self.error.as_ref().map(|e| e.to_value()).unwrap_or(Value::Null),
            "timestamp": now_rfc3339(),
        })
    }
}

fn now_rfc3339() -> Value {
    Value::String(
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string()),
    )
}
