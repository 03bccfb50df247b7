//! HTTP forwarding sink.
//!
//! POSTs each event as JSON to a collector URL, tagged with the patient and
//! clinic it belongs to. One request per event; failures are reported to the
//! session loop, which logs them and moves on to the next line.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use medicart_core::DeviceEvent;

use super::{DeliveryError, Sink};

/// Who the forwarded readings belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardIdentity {
    pub patient_name: String,
    pub clinic_name: Option<String>,
}

impl ForwardIdentity {
    pub fn new(patient_name: impl Into<String>, clinic_name: Option<String>) -> Self {
        Self {
            patient_name: patient_name.into(),
            clinic_name,
        }
    }
}

/// Forwards events to a collector over HTTP.
#[derive(Debug, Clone)]
pub struct HttpForwardSink {
    http: reqwest::Client,
    url: String,
    identity: ForwardIdentity,
}

impl HttpForwardSink {
    /// Build a sink posting to `url` with a per-request `timeout`.
    pub fn new(
        url: impl Into<String>,
        identity: ForwardIdentity,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        // Err only means a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            identity,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn identity(&self) -> &ForwardIdentity {
        &self.identity
    }

    /// The JSON body posted for `event`: its wire form plus identity fields.
    pub fn payload(&self, event: &DeviceEvent) -> Result<Value, DeliveryError> {
        let mut value = serde_json::to_value(event)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "patient_name".into(),
                Value::String(self.identity.patient_name.clone()),
            );
            if let Some(clinic) = &self.identity.clinic_name {
                map.insert("clinic_name".into(), Value::String(clinic.clone()));
            }
        }
        Ok(value)
    }
}

impl Sink for HttpForwardSink {
    async fn deliver(&mut self, event: &DeviceEvent) -> Result<(), DeliveryError> {
        let body = self.payload(event)?;
        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }
        debug!(
            url = %self.url,
            status = status.as_u16(),
            kind = event.wire_type(),
            "Event forwarded"
        );
        Ok(())
    }
}
