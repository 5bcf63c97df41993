//! Forms API client that supplies ban appeal details.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use thread_bot_engine::{AppealDetails, AppealFetchError, AppealSource};

use crate::discord_helpers::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

pub const DEFAULT_FORMS_API_BASE: &str = "https://forms-api.pythondiscord.com";

#[derive(Debug, Clone, Deserialize)]
struct FormsUser {
    username: String,
    discriminator: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FormsAppealAnswers {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    justification: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FormsAppealResponse {
    id: String,
    user: FormsUser,
    response: FormsAppealAnswers,
}

impl From<FormsAppealResponse> for AppealDetails {
    fn from(value: FormsAppealResponse) -> Self {
        Self {
            appealer: format!("{}#{}", value.user.username, value.user.discriminator),
            uuid: value.id,
            email: value.user.email,
            reason: value.response.reason,
            justification: value.response.justification,
        }
    }
}

#[derive(Clone)]
pub struct FormsApiClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl FormsApiClient {
    pub fn new(api_base: &str, token: &str, request_timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create forms api client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            retry_max_attempts: 3,
            retry_base_delay_ms: 250,
        })
    }

    pub fn with_retry(mut self, max_attempts: usize, base_delay_ms: u64) -> Self {
        self.retry_max_attempts = max_attempts.max(1);
        self.retry_base_delay_ms = base_delay_ms.max(1);
        self
    }

    fn response_url(&self, response_uuid: &str) -> String {
        format!(
            "{}/forms/ban-appeals/responses/{}",
            self.api_base, response_uuid
        )
    }
}

#[async_trait]
impl AppealSource for FormsApiClient {
    async fn fetch_appeal(&self, response_uuid: &str) -> Result<AppealDetails, AppealFetchError> {
        tracing::info!(response_uuid, "fetching appeal info for form response");
        let url = self.response_url(response_uuid);
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let sent = self
                .http
                .get(&url)
                .header(reqwest::header::COOKIE, format!("token={}", self.token))
                .send()
                .await;
            let response = match sent {
                Ok(response) => response,
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(AppealFetchError::Transport(error.to_string()));
                }
            };

            let status = response.status().as_u16();
            match status {
                200..=299 => {
                    let parsed = response
                        .json::<FormsAppealResponse>()
                        .await
                        .map_err(|error| AppealFetchError::Decode(error.to_string()))?;
                    return Ok(parsed.into());
                }
                403 => {
                    return Err(AppealFetchError::Forbidden {
                        uuid: response_uuid.to_string(),
                    })
                }
                404 => {
                    return Err(AppealFetchError::NotFound {
                        uuid: response_uuid.to_string(),
                    })
                }
                _ => {}
            }

            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            if attempt < self.retry_max_attempts && is_retryable_status(status) {
                tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, retry_after))
                    .await;
                continue;
            }
            return Err(AppealFetchError::Transport(format!(
                "status {status}: {}",
                truncate_for_error(&body, 400)
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;
    use thread_bot_engine::{AppealFetchError, AppealSource};

    use super::FormsApiClient;

    const UUID: &str = "7fbb1a2e-d910-44bb-bcc7-e9fcfd04f758";

    fn client(server: &MockServer) -> FormsApiClient {
        FormsApiClient::new(&server.base_url(), "forms-token", 2_000)
            .expect("client")
            .with_retry(2, 1)
    }

    #[tokio::test]
    async fn functional_fetch_appeal_sends_token_cookie_and_maps_details() {
        let server = MockServer::start();
        let fetched = server.mock(|when, then| {
            when.method(GET)
                .path(format!("/forms/ban-appeals/responses/{UUID}"))
                .header("cookie", "token=forms-token");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "id": UUID,
                    "user": {"username": "spammer", "discriminator": "1234", "email": "s@example.com"},
                    "response": {"reason": "links", "justification": "sorry"}
                }));
        });

        let details = client(&server).fetch_appeal(UUID).await.expect("details");
        assert_eq!(details.appealer, "spammer#1234");
        assert_eq!(details.uuid, UUID);
        assert_eq!(details.email, "s@example.com");
        assert_eq!(details.reason, "links");
        assert_eq!(details.justification, "sorry");
        fetched.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_forbidden_is_reported_without_retry() {
        let server = MockServer::start();
        let forbidden = server.mock(|when, then| {
            when.method(GET).path(format!("/forms/ban-appeals/responses/{UUID}"));
            then.status(403);
        });

        let error = client(&server).fetch_appeal(UUID).await.expect_err("forbidden");
        assert!(matches!(error, AppealFetchError::Forbidden { ref uuid } if uuid == UUID));
        forbidden.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_missing_response_and_server_errors_are_distinct() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/forms/ban-appeals/responses/missing");
            then.status(404);
        });
        let unavailable = server.mock(|when, then| {
            when.method(GET).path("/forms/ban-appeals/responses/flaky");
            then.status(502).body("bad gateway");
        });

        let client = client(&server);
        assert!(matches!(
            client.fetch_appeal("missing").await,
            Err(AppealFetchError::NotFound { .. })
        ));
        let error = client.fetch_appeal("flaky").await.expect_err("server error");
        assert!(matches!(error, AppealFetchError::Transport(ref message) if message.contains("502")));
        unavailable.assert_calls(2);
    }
}
