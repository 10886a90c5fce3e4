use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct OkResp<'a> {
    id: &'a str,
    ok: bool,
    result: Value,
}

#[derive(Debug, Serialize)]
struct ErrObj {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ErrResp<'a> {
    id: &'a str,
    ok: bool,
    error: ErrObj,
}

pub fn ok(id: &str, result: Value) -> Value {
    serde_json::to_value(OkResp {
        id,
        ok: true,
        result,
    })
    .unwrap_or(Value::Null)
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    serde_json::to_value(ErrResp {
        id,
        ok: false,
        error: ErrObj {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    })
    .unwrap_or(Value::Null)
}

/// Failure of a single handler, turned into one error envelope.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn update(table: &str, e: impl std::fmt::Display) -> Self {
        Self::new("db_update_failed", e.to_string())
            .with_details(serde_json::json!({ "table": table }))
    }

    pub fn response(self, id: &str) -> Value {
        tracing::warn!(request_id = id, code = self.code, message = %self.message, "request failed");
        err(id, self.code, self.message, self.details)
    }
}
