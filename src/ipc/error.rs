use crate::engine::error::EngineError;
use crate::remote::RemoteError;
use crate::validate::FieldErrors;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        let details = match &e {
            EngineError::InvalidCommitWindow { date, today } => Some(json!({
                "date": date.to_string(),
                "today": today.to_string(),
            })),
            EngineError::UnknownStudent(id) | EngineError::HistoryUnavailable(id) => {
                Some(json!({ "studentId": id }))
            }
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<RemoteError> for HandlerErr {
    fn from(e: RemoteError) -> Self {
        EngineError::from(e).into()
    }
}

impl From<FieldErrors> for HandlerErr {
    fn from(errors: FieldErrors) -> Self {
        HandlerErr {
            code: "validation_failed",
            message: errors.to_string(),
            details: Some(json!({ "fields": errors })),
        }
    }
}
