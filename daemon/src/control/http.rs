//! HTTP implementation of `ControlApi`

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    AssistantReply, ControlApi, ControlError, ControlFuture, DeviceCommand, DeviceStatus,
    ExecuteReply, Histogram, Language,
};

const VISION_PATH: &str = "/robot/vision";
const INTERPRET_PATH: &str = "/robot/text_command";
const EXECUTE_PATH: &str = "/robot/execute";

/// Talks to the control server over plain HTTP
pub struct HttpControlClient {
    base_url: String,
    client: Client,
}

impl HttpControlClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode its JSON body
    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, ControlError> {
        let resp = request.send().await?;
        let status = resp.status();
        debug!(path, status = status.as_u16(), "control server replied");

        if status == StatusCode::NOT_FOUND {
            return Err(ControlError::Unsupported { path: path.to_string() });
        }
        if !status.is_success() {
            return Err(ControlError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ControlError::Decode(format!("{}: {}", path, e)))
    }
}

/// Device endpoints report failure in the body of a 200 reply
fn check_device_reply(path: &str, reply: Value) -> Result<Value, ControlError> {
    if let Some(error) = reply.get("error").filter(|e| !e.is_null()) {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(ControlError::Rejected { path: path.to_string(), message });
    }
    if reply.get("success").and_then(Value::as_bool) == Some(false) {
        let message = reply
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("success=false")
            .to_string();
        return Err(ControlError::Rejected { path: path.to_string(), message });
    }
    Ok(reply)
}

impl ControlApi for HttpControlClient {
    fn send(&self, command: DeviceCommand) -> ControlFuture<'_, Value> {
        Box::pin(async move {
            let path = command.path();
            let request = self.client.post(self.url(&path));
            let reply: Value = self.call(&path, request).await?;
            check_device_reply(&path, reply)
        })
    }

    fn status(&self) -> ControlFuture<'_, DeviceStatus> {
        Box::pin(async move {
            let request = self.client.get(self.url("/status"));
            self.call("/status", request).await
        })
    }

    fn histogram(&self) -> ControlFuture<'_, Histogram> {
        Box::pin(async move {
            let request = self.client.get(self.url("/histogram"));
            self.call("/histogram", request).await
        })
    }

    fn describe_scene(&self, language: Language) -> ControlFuture<'_, AssistantReply> {
        Box::pin(async move {
            let request = self
                .client
                .post(self.url(VISION_PATH))
                .query(&[("language", language.code())]);
            self.call(VISION_PATH, request).await
        })
    }

    fn interpret<'a>(&'a self, text: &'a str) -> ControlFuture<'a, AssistantReply> {
        Box::pin(async move {
            let request = self
                .client
                .post(self.url(INTERPRET_PATH))
                .json(&json!({ "text": text }));
            self.call(INTERPRET_PATH, request).await
        })
    }

    fn execute<'a>(
        &'a self,
        action: &'a str,
        parameters: &'a Value,
    ) -> ControlFuture<'a, ExecuteReply> {
        Box::pin(async move {
            let request = self
                .client
                .post(self.url(EXECUTE_PATH))
                .json(&json!({ "action": action, "parameters": parameters }));
            self.call(EXECUTE_PATH, request).await
        })
    }
}
