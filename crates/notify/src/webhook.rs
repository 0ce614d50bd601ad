//! Alert delivery to an HTTP endpoint.
//!
//! The request body is the alert itself, serialized as JSON. Every request
//! also carries `X-SafeVision-Alert-Id`, `X-SafeVision-Rule-Type` and
//! `X-SafeVision-Severity` so receivers can route without parsing the body.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tracing::{debug, warn};

use safevision_core::Alert;

use crate::traits::{AlertPublisher, NotifyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs (or PUTs) each alert to a fixed URL.
///
/// `${VAR}` references in the URL and in header values are expanded from the
/// environment once, when the publisher is built.
#[derive(Debug)]
pub struct WebhookPublisher {
    url: String,
    method: Method,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookPublisher {
    /// `method` defaults to `POST`. A missing env var is a [`NotifyError::Config`].
    pub fn new(
        url: String,
        method: Option<Method>,
        headers: HashMap<String, String>,
    ) -> Result<Self, NotifyError> {
        let url = expand_env(&url)?;
        let headers = headers
            .into_iter()
            .map(|(name, value)| Ok((name, expand_env(&value)?)))
            .collect::<Result<HashMap<_, _>, NotifyError>>()?;
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            url,
            method: method.unwrap_or(Method::POST),
            headers,
            client,
        })
    }

    /// Build from plain strings, as read from a config file. Only `POST` and
    /// `PUT` make sense for delivering a body.
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
    ) -> Result<Self, NotifyError> {
        let method = match method.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None => None,
            Some("POST") => Some(Method::POST),
            Some("PUT") => Some(Method::PUT),
            Some(other) => {
                return Err(NotifyError::Config(format!(
                    "unsupported webhook method: {other}"
                )))
            }
        };
        Self::new(url, method, headers.unwrap_or_default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl AlertPublisher for WebhookPublisher {
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-SafeVision-Alert-Id", alert.alert_id.as_str())
            .header("X-SafeVision-Rule-Type", alert.rule_type.as_str())
            .header("X-SafeVision-Severity", alert.severity.to_string())
            .json(alert);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                url = %self.url,
                alert_id = %alert.alert_id,
                %status,
                "alert webhook rejected delivery"
            );
            return Err(NotifyError::Channel(format!("webhook returned {status}: {body}")));
        }

        debug!(url = %self.url, alert_id = %alert.alert_id, %status, "alert webhook delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Replace every `${NAME}` in `input` with the value of env var `NAME`.
fn expand_env(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            NotifyError::Config(format!("unterminated ${{...}} in '{input}'"))
        })?;
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| NotifyError::Config(format!("environment variable {name} is not set")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
