//! Telephony provider client
//!
//! The provider places and manages the actual phone calls. This crate only
//! needs three operations from it: create, fetch, and stop.

use async_trait::async_trait;

use crate::types::{CallGoal, JsonMap};
use crate::Result;

pub mod types;
pub mod vapi;

pub use types::{ProviderArtifact, ProviderCall};
pub use vapi::VapiClient;

/// Everything the provider needs to place one outbound call
#[derive(Debug, Clone, Default)]
pub struct OutboundCallRequest {
    pub assistant_id: String,
    /// Provider-side phone line to dial out from
    pub phone_line_id: Option<String>,
    pub customer_number: String,
    pub customer_name: Option<String>,
    pub custom_prompt: Option<String>,
    pub first_message: Option<String>,
    pub call_goals: Vec<CallGoal>,
    /// Echoed back by the provider on every event for this call
    pub metadata: JsonMap,
}

/// Outbound operations against the telephony provider
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Ask the provider to place a call; the response carries its call id
    async fn create_call(&self, request: &OutboundCallRequest) -> Result<ProviderCall>;

    /// Fetch the provider's current view of a call
    async fn get_call(&self, provider_call_id: &str) -> Result<ProviderCall>;

    /// Ask the provider to hang up
    async fn stop_call(&self, provider_call_id: &str) -> Result<()>;
}

/// Formats a dialable number before it is sent to the provider
pub trait PhoneNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> String;
}

/// Passes numbers through with surrounding whitespace removed
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl PhoneNormalizer for IdentityNormalizer {
    fn normalize(&self, raw: &str) -> String {
        raw.trim().to_string()
    }
}
