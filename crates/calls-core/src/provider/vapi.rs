//! Vapi REST client

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use super::{IdentityNormalizer, OutboundCallRequest, PhoneNormalizer, ProviderCall, ProviderClient};
use crate::config::ProviderConfig;
use crate::types::{CallGoal, JsonMap};
use crate::{CallError, Result};

/// Client for the Vapi call API
#[derive(Clone)]
pub struct VapiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    webhook_url: Option<String>,
    normalizer: Arc<dyn PhoneNormalizer>,
}

impl VapiClient {
    /// Create a client from provider settings
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CallError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            webhook_url: config.webhook_url.clone().filter(|u| !u.is_empty()),
            normalizer: Arc::new(IdentityNormalizer),
        })
    }

    /// Replace the customer-number formatter
    pub fn with_normalizer(mut self, normalizer: Arc<dyn PhoneNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CallError::provider(None, "Provider API key is not configured"))?;
        Ok(self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(api_key))
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&Value>) -> Result<T> {
        let mut request = self.request(method.clone(), path)?;
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!("Provider {} {} error: {}", method, path, e);
            CallError::provider(None, e.to_string())
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            error!("Provider {} {} body read failed: {}", method, path, e);
            CallError::provider(Some(status.as_u16()), e.to_string())
        })?;

        if !status.is_success() {
            error!("Provider {} {} failed: {} - {}", method, path, status.as_u16(), text);
            return Err(CallError::provider(Some(status.as_u16()), text));
        }

        // stop and similar endpoints may answer with an empty body
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| {
            CallError::provider(Some(status.as_u16()), format!("Unexpected response body: {}", e))
        })
    }

    /// JSON body for `POST /call/phone`
    pub fn build_create_payload(&self, request: &OutboundCallRequest) -> Value {
        let mut customer = Map::new();
        customer.insert(
            "number".into(),
            Value::String(self.normalizer.normalize(&request.customer_number)),
        );
        if let Some(name) = request.customer_name.as_deref().filter(|n| !n.is_empty()) {
            customer.insert("name".into(), Value::String(name.to_string()));
        }

        let mut payload = Map::new();
        payload.insert("assistantId".into(), Value::String(request.assistant_id.clone()));
        if let Some(line) = request.phone_line_id.as_deref().filter(|l| !l.is_empty()) {
            payload.insert("phoneNumberId".into(), Value::String(line.to_string()));
        }
        payload.insert("customer".into(), Value::Object(customer));

        let overrides = build_assistant_overrides(self.webhook_url.as_deref(), request);
        if !overrides.is_empty() {
            payload.insert("assistantOverrides".into(), Value::Object(overrides));
        }

        Value::Object(payload)
    }
}

/// Per-call assistant overrides.
///
/// The prompt and goals travel as `variableValues` so the assistant's own
/// prompt template can reference `{{customPrompt}}` and `{{callGoals}}`.
pub fn build_assistant_overrides(webhook_url: Option<&str>, request: &OutboundCallRequest) -> JsonMap {
    let mut overrides = JsonMap::new();

    if let Some(url) = webhook_url.filter(|u| !u.is_empty()) {
        overrides.insert("serverUrl".into(), Value::String(url.to_string()));
    }
    if let Some(first) = request.first_message.as_deref().filter(|m| !m.is_empty()) {
        overrides.insert("firstMessage".into(), Value::String(first.to_string()));
    }

    let mut variables = JsonMap::new();
    if let Some(prompt) = request.custom_prompt.as_deref().filter(|p| !p.is_empty()) {
        variables.insert("customPrompt".into(), Value::String(prompt.to_string()));
    }
    if !request.call_goals.is_empty() {
        variables.insert("callGoals".into(), Value::String(format_call_goals(&request.call_goals)));
    }
    if !variables.is_empty() {
        overrides.insert("variableValues".into(), Value::Object(variables));
    }

    if !request.metadata.is_empty() {
        overrides.insert("metadata".into(), Value::Object(request.metadata.clone()));
    }

    overrides
}

/// Numbered goal list, one goal per line
pub fn format_call_goals(goals: &[CallGoal]) -> String {
    goals
        .iter()
        .enumerate()
        .map(|(idx, goal)| {
            let mut line = format!("{}. **{}**: {}", idx + 1, goal.name, goal.description);
            if let Some(criteria) = goal.success_criteria.as_deref().filter(|c| !c.is_empty()) {
                line.push_str(&format!(" (Success: {})", criteria));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ProviderClient for VapiClient {
    async fn create_call(&self, request: &OutboundCallRequest) -> Result<ProviderCall> {
        let payload = self.build_create_payload(request);
        info!("Creating outbound call to {}", request.customer_number);
        debug!("Call payload: {}", payload);
        self.send(Method::POST, "/call/phone", Some(&payload)).await
    }

    async fn get_call(&self, provider_call_id: &str) -> Result<ProviderCall> {
        self.send(Method::GET, &format!("/call/{}", provider_call_id), None)
            .await
    }

    async fn stop_call(&self, provider_call_id: &str) -> Result<()> {
        let _: Value = self
            .send(Method::POST, &format!("/call/{}/stop", provider_call_id), Some(&json!({})))
            .await?;
        info!("Requested provider stop for call {}", provider_call_id);
        Ok(())
    }
}

impl std::fmt::Debug for VapiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}
