//! Best-effort delivery to the session/report service
//!
//! Every send runs on its own task and never reports back: a failed POST is
//! traced at debug level and dropped.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::SessionSummary;
use crate::config::ReportConfig;
use crate::monitor::{AlertEvent, AlertKind, AlertLevel};

/// Body sent for each alert
#[derive(Debug, Serialize)]
struct AlertPayload {
    session_id: Uuid,
    kind: AlertKind,
    severity: AlertLevel,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReportForwarder {
    client: Client,
    alert_endpoint: Option<String>,
    session_endpoint: Option<String>,
}

impl ReportForwarder {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            client: Client::new(),
            alert_endpoint: config.alert_endpoint.clone(),
            session_endpoint: config.session_endpoint.clone(),
        }
    }

    /// A forwarder with no endpoints; every call is a no-op
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(&ReportConfig::default())
    }

    pub fn forward_alert(&self, session_id: Uuid, alert: &AlertEvent) {
        let Some(endpoint) = self.alert_endpoint.clone() else {
            return;
        };

        let payload = AlertPayload {
            session_id,
            kind: alert.kind,
            severity: alert.level,
            message: alert.message.clone(),
            timestamp: alert.timestamp,
        };
        self.spawn_post(endpoint, payload, "alert");
    }

    pub fn submit_summary(&self, summary: &SessionSummary) {
        let Some(endpoint) = self.session_endpoint.clone() else {
            return;
        };
        self.spawn_post(endpoint, summary.clone(), "session summary");
    }

    fn spawn_post<T>(&self, endpoint: String, body: T, what: &'static str)
    where
        T: Serialize + Send + 'static,
    {
        let client = self.client.clone();
        tokio::spawn(async move {
            let result = client
                .post(&endpoint)
                .json(&body)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match result {
                Ok(_) => debug!("Forwarded {} to {}", what, endpoint),
                Err(e) => debug!("Dropping {} for {}: {}", what, endpoint, e),
            }
        });
    }
}
