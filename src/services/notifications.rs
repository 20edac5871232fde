//! Notification sinks. Delivery is fire-and-forget; engines log failures
//! and move on.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::ActorType;
use crate::ports::{Notifier, NotifyCategory, NotifyError};

/// Posts messages to the platform's messaging endpoint (chat and push
/// delivery both hang off that service).
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, endpoint }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(
        &self,
        actor_id: Uuid,
        actor_type: ActorType,
        category: NotifyCategory,
        message: &str,
        context: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let payload = json!({
            "actor_id": actor_id,
            "actor_type": actor_type,
            "category": category,
            "message": message,
            "context": context,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError(format!(
                "notify endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Fallback sink when no messaging endpoint is configured.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        actor_id: Uuid,
        actor_type: ActorType,
        category: NotifyCategory,
        message: &str,
        _context: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            actor_id = %actor_id,
            actor_type = actor_type.as_str(),
            category = ?category,
            "notification: {}",
            message
        );
        Ok(())
    }
}
