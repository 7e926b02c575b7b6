//! HTTP implementation of [`ReasoningService`].

use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{Error, ReasoningService, Result};

/// Where and how to reach the reasoning service.
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    /// Base URL, e.g. `http://localhost:7860`.
    pub base_url: String,
    /// Bearer token, when the deployment requires one.
    pub api_key: Option<Secret<String>>,
    /// Flow to run for every reply round.
    pub flow_id: String,
    /// Per-request timeout. A timed-out round falls back to the apology
    /// path; there are no in-flight retries.
    pub timeout: Duration,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    input_value: &'a str,
    output_type: &'static str,
    input_type: &'static str,
}

// The service nests the reply text two output levels deep:
// `outputs[0].outputs[0].results.message.text`. Everything else in the body
// is ignored.
#[derive(Deserialize)]
struct RunResponse {
    #[serde(default)]
    outputs: Vec<OuterOutput>,
}

#[derive(Deserialize)]
struct OuterOutput {
    #[serde(default)]
    outputs: Vec<InnerOutput>,
}

#[derive(Deserialize)]
struct InnerOutput {
    #[serde(default)]
    results: Option<RunResults>,
}

#[derive(Deserialize)]
struct RunResults {
    #[serde(default)]
    message: Option<RunMessage>,
}

#[derive(Deserialize)]
struct RunMessage {
    #[serde(default)]
    text: Option<String>,
}

impl RunResponse {
    fn reply_text(self) -> Option<String> {
        self.outputs
            .into_iter()
            .next()?
            .outputs
            .into_iter()
            .next()?
            .results?
            .message?
            .text
    }
}

pub struct ReasoningClient {
    http: reqwest::Client,
    config: ReasoningConfig,
}

impl ReasoningClient {
    pub fn new(config: ReasoningConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn run_url(&self) -> String {
        format!(
            "{}/api/v1/run/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.flow_id
        )
    }
}

#[async_trait]
impl ReasoningService for ReasoningClient {
    async fn reply(&self, prompt: &str) -> Result<String> {
        let mut request = self
            .http
            .post(self.run_url())
            .query(&[("stream", "false")])
            .json(&RunRequest {
                input_value: prompt,
                output_type: "chat",
                input_type: "chat",
            });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let parsed: RunResponse = serde_json::from_str(&body)?;
        let text = parsed.reply_text().ok_or(Error::MissingReply)?;
        debug!(chars = text.len(), "reasoning reply received");
        Ok(text)
    }
}
