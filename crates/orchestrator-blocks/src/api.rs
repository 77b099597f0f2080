//! Api block handler: issues one HTTP request and returns its
//! body, status, and headers. Pass a requester when registering;
//! [`ReqwestApiRequester`] is the default.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use orchestrator_core::handler::{BlockHandler, HandlerError, HandlerOutput};
use orchestrator_core::model::{Block, ExecutionContext};

#[derive(Debug, Clone)]
pub struct ApiRequestError(pub String);

impl std::fmt::Display for ApiRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ApiRequestError {}

pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// HTTP requester abstraction. Implement and pass when registering.
pub trait ApiRequester: Send + Sync {
    fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<ApiResponse, ApiRequestError>;
}

pub struct ApiBlockHandler {
    requester: Arc<dyn ApiRequester>,
}

impl ApiBlockHandler {
    pub fn new(requester: Arc<dyn ApiRequester>) -> Self {
        Self { requester }
    }
}

impl BlockHandler for ApiBlockHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "api"
    }

    fn execute(
        &self,
        block: &Block,
        resolved_inputs: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let url = resolved_inputs
            .get("url")
            .and_then(|v| v.as_str())
            .or_else(|| block.config.get("url").and_then(|v| v.as_str()))
            .ok_or_else(|| HandlerError::Other("api block requires a url".into()))?;
        let method = resolved_inputs
            .get("method")
            .and_then(|v| v.as_str())
            .or_else(|| block.config.get("method").and_then(|v| v.as_str()))
            .unwrap_or("GET");
        let headers: HashMap<String, String> = resolved_inputs
            .get("headers")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let body = resolved_inputs.get("body");
        let timeout_ms = block.config.get("timeoutMs").and_then(|v| v.as_u64()).unwrap_or(15_000);

        match self
            .requester
            .request(method, url, &headers, body, Duration::from_millis(timeout_ms))
        {
            Ok(resp) => {
                let parsed_body: Value = serde_json::from_str(&resp.body).unwrap_or(Value::String(resp.body));
                Ok(HandlerOutput::success(serde_json::json!({
                    "status": resp.status,
                    "headers": resp.headers,
                    "body": parsed_body,
                })))
            }
            Err(e) => Ok(HandlerOutput::failure(e.0)),
        }
    }
}

/// Default requester using reqwest's blocking client.
pub struct ReqwestApiRequester;

impl ApiRequester for ReqwestApiRequester {
    fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<ApiResponse, ApiRequestError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("local-orchestrator/0.1")
            .build()
            .map_err(|e| ApiRequestError(e.to_string()))?;
        let method: reqwest::Method = method
            .parse()
            .map_err(|_| ApiRequestError(format!("invalid HTTP method: {method}")))?;
        let mut req = client.request(method, url);
        for (k, v) in headers {
            req = req.header(k, v);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().map_err(|e| ApiRequestError(e.to_string()))?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = resp.text().map_err(|e| ApiRequestError(e.to_string()))?;
        Ok(ApiResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::model::BlockType;

    struct MockRequester;
    impl ApiRequester for MockRequester {
        fn request(
            &self,
            _method: &str,
            url: &str,
            _headers: &HashMap<String, String>,
            _body: Option<&Value>,
            _timeout: Duration,
        ) -> Result<ApiResponse, ApiRequestError> {
            if url == "https://ok.test" {
                Ok(ApiResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: "{\"ok\":true}".into(),
                })
            } else {
                Err(ApiRequestError("fail".into()))
            }
        }
    }

    fn block() -> Block {
        Block {
            id: "api1".into(),
            block_type: BlockType::Custom("api".into()),
            name: "Api1".into(),
            config: Value::Null,
            enabled: true,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", Default::default(), Default::default())
    }

    #[test]
    fn requests_the_resolved_url_and_parses_json_body() {
        let handler = ApiBlockHandler::new(Arc::new(MockRequester));
        let out = handler
            .execute(&block(), &serde_json::json!({"url": "https://ok.test"}), &ctx())
            .unwrap();
        assert_eq!(out.output["status"], serde_json::json!(200));
        assert_eq!(out.output["body"]["ok"], serde_json::json!(true));
    }

    #[test]
    fn missing_url_is_a_handler_error() {
        let handler = ApiBlockHandler::new(Arc::new(MockRequester));
        let err = handler.execute(&block(), &Value::Null, &ctx());
        assert!(err.is_err());
    }
}
