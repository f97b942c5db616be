use futures::future::BoxFuture;
use rand::RngCore;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::request_context::RequestContext;
use crate::services::sinks::{error_for_status, ConversionSink, TrackingOutcome};

const GRAPH_API_URL: &str = "https://graph.facebook.com/v18.0";
const CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct MetaConfig {
    pub pixel_id: String,
    pub access_token: String,
}

impl MetaConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, std::env::VarError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| lookup(name).filter(|v| !v.is_empty()).ok_or(std::env::VarError::NotPresent);
        Ok(Self {
            pixel_id: required("META_PIXEL_ID")?,
            access_token: required("META_ACCESS_TOKEN")?,
        })
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserData {
    /// sha256 of the normalized email
    pub em: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CustomData {
    pub value: u32,
    pub currency: &'static str,
    pub content_name: &'static str,
    pub content_category: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_ids: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_items: Option<u32>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ConversionEvent {
    pub event_name: &'static str,
    pub event_time: i64,
    pub user_data: UserData,
    pub custom_data: CustomData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_source_url: Option<String>,
    pub action_source: &'static str,
    pub event_id: String,
}

pub fn hash_user_data(data: &str) -> String {
    hex::encode(Sha256::digest(data.trim().to_lowercase().as_bytes()))
}

/// 16 random bytes, hex encoded. Shared by the browser pixel and the server
/// event so Meta can deduplicate them.
pub fn generate_event_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn user_data(email: &str, context: &RequestContext) -> UserData {
    UserData {
        em: hash_user_data(email),
        client_ip_address: context.client.client_ip.clone(),
        client_user_agent: context.client.user_agent.clone(),
        fbc: context.fbc.clone(),
        fbp: context.fbp.clone(),
    }
}

pub fn lead_event(email: &str, prize_amount: u32, context: &RequestContext, event_id: String, event_time: i64) -> ConversionEvent {
    ConversionEvent {
        event_name: "Lead",
        event_time,
        user_data: user_data(email, context),
        custom_data: CustomData {
            value: prize_amount,
            currency: CURRENCY,
            content_name: "email_submission",
            content_category: "conversion",
            content_ids: None,
            num_items: None,
        },
        event_source_url: context.referer.clone(),
        action_source: "website",
        event_id,
    }
}

pub fn purchase_event(email: &str, prize_amount: u32, context: &RequestContext, event_id: String, event_time: i64) -> ConversionEvent {
    ConversionEvent {
        event_name: "Purchase",
        event_time,
        user_data: user_data(email, context),
        custom_data: CustomData {
            value: prize_amount,
            currency: CURRENCY,
            content_name: "Raffle Entry",
            content_category: "Gaming",
            content_ids: Some(vec!["raffle_entry"]),
            num_items: Some(1),
        },
        event_source_url: context.referer.clone(),
        action_source: "website",
        event_id,
    }
}

/// Server side events for the Meta Conversions API.
pub struct MetaConversionsSink {
    client: Client,
    config: MetaConfig,
}

impl MetaConversionsSink {
    pub fn new(client: Client, config: MetaConfig) -> Self {
        Self { client, config }
    }

    async fn send(&self, event: &ConversionEvent) -> bool {
        let url = format!("{}/{}/events", GRAPH_API_URL, self.config.pixel_id);
        let request = self
            .client
            .post(url)
            .json(&json!({ "data": [event], "access_token": self.config.access_token }));

        let result = match request.send().await {
            Ok(response) => error_for_status(response).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => {
                info!("Meta {} conversion sent ({})", event.event_name, event.event_id);
                true
            }
            Err(e) => {
                error!("Meta {} conversion failed: {}", event.event_name, e);
                false
            }
        }
    }
}

impl ConversionSink for MetaConversionsSink {
    fn track<'a>(
        &'a self,
        email: &'a str,
        prize_amount: u32,
        context: &'a RequestContext,
    ) -> BoxFuture<'a, TrackingOutcome> {
        Box::pin(async move {
            let event_id = generate_event_id();
            let now = chrono::Utc::now().timestamp();

            let lead = lead_event(email, prize_amount, context, event_id.clone(), now);
            let lead_sent = self.send(&lead).await;

            let purchase = purchase_event(email, prize_amount, context, format!("{}_purchase", event_id), now);
            let purchase_sent = self.send(&purchase).await;

            TrackingOutcome { lead_sent, purchase_sent }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::shared_wheel_game::ClientInfo;
    use std::collections::HashMap;

    fn context() -> RequestContext {
        RequestContext {
            client: ClientInfo {
                client_ip: Some("203.0.113.9".to_string()),
                user_agent: None,
            },
            referer: Some("https://promo.example.com/".to_string()),
            fbc: Some("fb.1.1700000000000.AbC".to_string()),
            fbp: None,
        }
    }

    #[test]
    fn test_email_hash_is_normalized() {
        let expected = "b4c9a289323b21a01c3e940f150eb9b8c542587f1abfd8f0e1cc1ffc5e475514";
        assert_eq!(hash_user_data("user@example.com"), expected);
        assert_eq!(hash_user_data("  USER@Example.com "), expected);
    }

    #[test]
    fn test_event_ids_are_random_hex() {
        let first = generate_event_id();
        let second = generate_event_id();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_lead_event_shape() {
        let event = lead_event("user@example.com", 500, &context(), "abc".to_string(), 1_700_000_000);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_name"], "Lead");
        assert_eq!(value["event_id"], "abc");
        assert_eq!(value["action_source"], "website");
        assert_eq!(value["event_source_url"], "https://promo.example.com/");
        assert_eq!(value["user_data"]["em"], hash_user_data("user@example.com"));
        assert_eq!(value["user_data"]["client_ip_address"], "203.0.113.9");
        assert_eq!(value["user_data"]["fbc"], "fb.1.1700000000000.AbC");
        assert!(value["user_data"].get("fbp").is_none());
        assert!(value["user_data"].get("client_user_agent").is_none());
        assert_eq!(value["custom_data"]["value"], 500);
        assert_eq!(value["custom_data"]["currency"], "USD");
        assert!(value["custom_data"].get("content_ids").is_none());
    }

    #[test]
    fn test_purchase_event_shape() {
        let event = purchase_event("user@example.com", 20, &context(), "abc_purchase".to_string(), 1);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_name"], "Purchase");
        assert_eq!(value["event_id"], "abc_purchase");
        assert_eq!(value["custom_data"]["content_ids"], serde_json::json!(["raffle_entry"]));
        assert_eq!(value["custom_data"]["num_items"], 1);
        assert_eq!(value["custom_data"]["content_category"], "Gaming");
    }

    #[test]
    fn test_config_requires_both_values() {
        let vars = HashMap::from([("META_PIXEL_ID", "123".to_string())]);
        assert!(MetaConfig::from_lookup(|name| vars.get(name).cloned()).is_err());

        let vars = HashMap::from([
            ("META_PIXEL_ID", "123".to_string()),
            ("META_ACCESS_TOKEN", "token".to_string()),
        ]);
        let config = MetaConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(config.pixel_id, "123");
    }
}
