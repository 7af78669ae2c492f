//! Reachability probing
//!
//! A prober turns a target string into a normalized target plus a status
//! outcome. Bare `host[:port]` targets are tried over HTTPS first, then plain
//! HTTP; whichever scheme answers becomes the normalized target.

use async_trait::async_trait;
use reqwest::Client;

use crate::models::{ProbeOutcome, ProbeStatus};
use crate::utils::{is_url, with_scheme};

/// Performs one network probe against a target
///
/// Must be safe to call concurrently for independent targets.
#[async_trait]
pub trait LivenessProber: Send + Sync {
    async fn probe(&self, target: &str) -> ProbeOutcome;
}

/// HTTP(S) reachability prober backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn status_of(&self, url: &str) -> Option<u16> {
        match self.client.get(url).send().await {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Probe request failed");
                None
            }
        }
    }
}

#[async_trait]
impl LivenessProber for HttpProber {
    async fn probe(&self, target: &str) -> ProbeOutcome {
        if is_url(target) {
            return match self.status_of(target).await {
                Some(code) => ProbeOutcome::new(target, ProbeStatus::Status(code)),
                None => ProbeOutcome::unreachable(target),
            };
        }

        for scheme in ["https", "http"] {
            let url = with_scheme(target, scheme);
            if let Some(code) = self.status_of(&url).await {
                return ProbeOutcome::new(url, ProbeStatus::Status(code));
            }
        }

        ProbeOutcome::unreachable(target)
    }
}
