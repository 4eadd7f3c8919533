//! Async task queue client and webhook authenticity verification.
//!
//! Claims are not minted inline: the claim handler enqueues a job and
//! the queue service calls back into `/api/v1/faucet/claim/process`.
//! Callbacks carry an HMAC-SHA256 signature over the raw body, checked
//! against the current signing key and, during rotation, the next one.

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::config::QueueConfig;

type HmacSha256 = Hmac<Sha256>;

/// Per-message delivery retries requested from the queue service.
const ENQUEUE_RETRIES: u32 = 2;

#[derive(Clone)]
pub struct QueueClient {
    http: reqwest::Client,
    config: QueueConfig,
}

impl QueueClient {
    pub fn new(config: QueueConfig) -> Result<Self> {
        assert!(!config.url.is_empty(), "Queue URL must be provided");
        assert!(!config.queue_name.is_empty(), "Queue name must be provided");
        assert!(
            !config.current_signing_key.is_empty(),
            "Queue signing key must be provided"
        );
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build queue HTTP client")?;
        Ok(Self { http, config })
    }

    /// Hand a payload to the queue service for delivery to `webhook_url`.
    pub async fn enqueue(&self, payload: &serde_json::Value, webhook_url: &str) -> Result<()> {
        assert!(!webhook_url.is_empty(), "Webhook URL must be provided");
        let endpoint = format!(
            "{}/enqueue/{}",
            self.config.url.trim_end_matches('/'),
            self.config.queue_name
        );

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.config.token)
            .json(&json!({
                "url": webhook_url,
                "body": payload,
                "retries": ENQUEUE_RETRIES,
            }))
            .send()
            .await
            .context("Queue enqueue request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Queue service rejected enqueue with status {}",
                response.status()
            ));
        }
        Ok(())
    }

    /// Validate a webhook callback signature (base64 HMAC-SHA256 of the
    /// raw body). Both rotation keys are accepted; every failure path
    /// answers false.
    pub fn verify_webhook_signature(&self, signature: &str, body: &[u8]) -> bool {
        let Ok(provided) = BASE64_STANDARD.decode(signature.trim()) else {
            return false;
        };
        verify_with_key(&self.config.current_signing_key, body, &provided)
            || verify_with_key(&self.config.next_signing_key, body, &provided)
    }
}

fn verify_with_key(key: &str, body: &[u8], provided: &[u8]) -> bool {
    if key.is_empty() {
        return false;
    }
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(provided).is_ok()
}

/// Sign a body the way the queue service does; used by tests and local
/// queue shims.
pub fn sign_body(key: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    BASE64_STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> QueueClient {
        QueueClient::new(QueueConfig {
            url: "https://queue.example.org".into(),
            token: "token".into(),
            queue_name: "faucet-claims".into(),
            webhook_url: "https://api.example.org/api/v1/faucet/claim/process".into(),
            current_signing_key: "current-signing-key".into(),
            next_signing_key: "next-signing-key".into(),
        })
        .unwrap()
    }

    #[test]
    fn accepts_current_key_signature() {
        let client = client();
        let body = br#"{"walletAddress":"0xabc"}"#;
        let signature = sign_body("current-signing-key", body);
        assert!(client.verify_webhook_signature(&signature, body));
    }

    #[test]
    fn accepts_next_key_during_rotation() {
        let client = client();
        let body = b"payload";
        let signature = sign_body("next-signing-key", body);
        assert!(client.verify_webhook_signature(&signature, body));
    }

    #[test]
    fn rejects_wrong_key_and_tampered_body() {
        let client = client();
        let body = b"payload";
        let signature = sign_body("some-other-key", body);
        assert!(!client.verify_webhook_signature(&signature, body));

        let good = sign_body("current-signing-key", body);
        assert!(!client.verify_webhook_signature(&good, b"tampered"));
        assert!(!client.verify_webhook_signature("not base64!!!", body));
    }
}
