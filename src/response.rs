use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{engine::SearchOutcome, error::Error};

pub const SEARCH_MESSAGE: &str = "search request";
pub const KEYS_MESSAGE: &str = "keys request";
pub const MALFORMED_MESSAGE: &str = "invalid query or invalid json syntax";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Failed,
}

/// Payload returned by every service front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Response {
    pub status: Status,
    pub message: String,
    pub count: usize,
    pub data: Vec<Value>,
}

impl Response {
    pub fn ok(message: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
            count: data.len(),
            data,
        }
    }

    pub fn search(outcome: SearchOutcome) -> Self {
        let message = if outcome.truncated() {
            format!("{SEARCH_MESSAGE}; expansion limit reached, results may be incomplete")
        } else {
            SEARCH_MESSAGE.to_string()
        };
        Self::ok(message, outcome.views)
    }

    pub fn keys(fields: Vec<String>) -> Self {
        Self::ok(KEYS_MESSAGE, fields.into_iter().map(Value::String).collect())
    }

    pub fn failed(error: &Error) -> Self {
        let message = if error.is_client_error() {
            format!("{MALFORMED_MESSAGE}: {error}")
        } else {
            error.to_string()
        };
        Self {
            status: Status::Failed,
            message,
            count: 0,
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_shape() {
        let response = Response::ok("search request", vec![json!({"name": "Ivan"})]);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "status": "ok",
                "message": "search request",
                "count": 1,
                "data": [{"name": "Ivan"}]
            })
        );
    }

    #[test]
    fn malformed_queries_fail_with_the_client_message() {
        let response = Response::failed(&Error::MalformedQuery("empty term".into()));
        assert_eq!(response.status, Status::Failed);
        assert!(response.message.starts_with(MALFORMED_MESSAGE));
        assert_eq!(response.count, 0);
    }

    #[test]
    fn keys_are_listed_as_strings() {
        let response = Response::keys(vec!["name".into(), "type".into()]);
        assert_eq!(response.data, vec![json!("name"), json!("type")]);
        assert_eq!(response.message, KEYS_MESSAGE);
    }
}
