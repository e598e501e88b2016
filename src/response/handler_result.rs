use serde_json::Value;

use super::Response;

/// The value a handler returns.
///
/// Text becomes a `text/html` response, JSON becomes an `application/json`
/// response, and an explicit response is sent as is. Handlers usually return
/// one of the convertible types and let `?` and `Into` do the rest.
///
/// ```
/// use mallo::{App, HandlerResult, Request};
/// use serde_json::json;
///
/// fn status(_: &Request, _: &App) -> mallo::Result<serde_json::Value> {
///     Ok(json!({ "ok": true }))
/// }
///
/// # let result: HandlerResult = json!({ "ok": true }).into();
/// # assert!(matches!(result, HandlerResult::Json(_)));
/// ```
///
#[derive(Debug)]
pub enum HandlerResult {
    Text(String),
    Json(Value),
    Explicit(Response),
}

impl HandlerResult {
    /// Normalizes self into a response.
    ///
    pub fn into_response(self) -> Response {
        match self {
            Self::Text(text) => Response::html(text),
            Self::Json(json) => Response::json_value(json),
            Self::Explicit(response) => response,
        }
    }
}

impl From<String> for HandlerResult {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for HandlerResult {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for HandlerResult {
    fn from(json: Value) -> Self {
        Self::Json(json)
    }
}

impl From<Response> for HandlerResult {
    fn from(response: Response) -> Self {
        Self::Explicit(response)
    }
}
