// src/updater.rs
use reqwest::{header, StatusCode};
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::types::{CredentialPair, PushPayload};

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("proxy answered with status {0}")]
    Status(u16),
    #[error("proxy request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Pushes credential pairs to the proxy's `/youtube` admin endpoint.
#[derive(Clone)]
pub struct ProxyUpdater {
    client: reqwest::Client,
    endpoint: String,
    password: String,
    timeout: Duration,
}

impl ProxyUpdater {
    pub fn new(base_url: &str, password: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{base_url}/youtube"),
            password: password.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.proxy_url, &config.proxy_password, config.proxy_timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Only `204 No Content` counts as success.
    pub async fn push(&self, pair: &CredentialPair) -> Result<(), UpdateError> {
        let payload = PushPayload {
            po_token: &pair.token,
            visitor_data: &pair.visitor_id,
        };
        let res = self
            .client
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, &self.password)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                error!(endpoint = %self.endpoint, error = %e, "error updating proxy token");
                UpdateError::from(e)
            })?;

        match res.status() {
            StatusCode::NO_CONTENT => {
                info!(endpoint = %self.endpoint, "updated proxy token");
                Ok(())
            }
            status => {
                error!(endpoint = %self.endpoint, status = status.as_u16(), "failed to update proxy token");
                Err(UpdateError::Status(status.as_u16()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    pub(crate) struct Captured {
        pub requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
    }

    /// Serves `POST /youtube` on an ephemeral port, answering with `status`.
    pub(crate) async fn fake_proxy(status: u16) -> (String, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route(
                "/youtube",
                post(
                    move |State(c): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        c.requests.lock().unwrap().push((headers, body));
                        let status = axum::http::StatusCode::from_u16(status).unwrap();
                        (status, if status == axum::http::StatusCode::NO_CONTENT { "" } else { "{\"ok\":true}" })
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    fn pair() -> CredentialPair {
        CredentialPair {
            token: "po-token-value".into(),
            visitor_id: "visitor-value".into(),
        }
    }

    #[tokio::test]
    async fn pushes_payload_with_shared_secret() {
        let (base, captured) = fake_proxy(204).await;
        let updater = ProxyUpdater::new(&base, "glace", Duration::from_secs(5));

        updater.push(&pair()).await.unwrap();

        let requests = captured.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (headers, body) = &requests[0];
        assert_eq!(headers.get("authorization").unwrap(), "glace");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(
            body,
            &serde_json::json!({"poToken": "po-token-value", "visitorData": "visitor-value"})
        );
    }

    #[tokio::test]
    async fn status_200_is_a_failure() {
        let (base, captured) = fake_proxy(200).await;
        let updater = ProxyUpdater::new(&base, "glace", Duration::from_secs(5));

        assert!(matches!(
            updater.push(&pair()).await,
            Err(UpdateError::Status(200))
        ));
        assert_eq!(captured.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_is_a_failure() {
        let (base, _) = fake_proxy(401).await;
        let updater = ProxyUpdater::new(&base, "wrong", Duration::from_secs(5));

        assert!(matches!(
            updater.push(&pair()).await,
            Err(UpdateError::Status(401))
        ));
    }

    #[tokio::test]
    async fn unreachable_proxy_is_a_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let updater = ProxyUpdater::new(&format!("http://{addr}"), "glace", Duration::from_secs(2));

        assert!(matches!(
            updater.push(&pair()).await,
            Err(UpdateError::Request(_))
        ));
    }

    #[tokio::test]
    async fn silent_proxy_times_out() {
        // Accepts connections and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let updater = ProxyUpdater::new(&format!("http://{addr}"), "glace", Duration::from_millis(300));

        let started = std::time::Instant::now();
        let result = updater.push(&pair()).await;
        assert!(matches!(&result, Err(UpdateError::Request(e)) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn endpoint_is_base_plus_youtube() {
        let updater = ProxyUpdater::new("http://lavalink:2333", "x", Duration::from_secs(1));
        assert_eq!(updater.endpoint(), "http://lavalink:2333/youtube");
    }
}
