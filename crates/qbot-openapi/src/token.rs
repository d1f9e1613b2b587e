//! App access token endpoint.

use std::time::Duration;

use async_trait::async_trait;
use qbot_core::{
    config::DEFAULT_TOKEN_URL,
    errors::Error,
    token::{Credentials, Token, TokenFetcher},
    Result,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    app_id: &'a str,
    client_secret: &'a str,
}

/// The endpoint has answered with both `"7200"` and `7200`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(u64),
    Text(String),
}

impl Seconds {
    fn into_duration(self) -> Option<Duration> {
        match self {
            Seconds::Number(n) => Some(Duration::from_secs(n)),
            Seconds::Text(s) => s.trim().parse::<u64>().ok().map(Duration::from_secs),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    expires_in: Option<Seconds>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Exchanges app id + secret for a `QQBot` access token.
#[derive(Clone, Debug)]
pub struct AppAccessTokenFetcher {
    credentials: Credentials,
    url: String,
    http: reqwest::Client,
}

impl AppAccessTokenFetcher {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_url(credentials, DEFAULT_TOKEN_URL)
    }

    pub fn with_url(credentials: Credentials, url: impl Into<String>) -> Self {
        Self {
            credentials,
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Ok(http) = reqwest::Client::builder().timeout(timeout).build() {
            self.http = http;
        }
        self
    }
}

#[async_trait]
impl TokenFetcher for AppAccessTokenFetcher {
    async fn fetch(&self) -> Result<Token> {
        let resp = self
            .http
            .post(&self.url)
            .json(&TokenRequest {
                app_id: &self.credentials.app_id,
                client_secret: &self.credentials.app_secret,
            })
            .send()
            .await
            .map_err(|e| Error::Token(format!("token request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Token(format!("token response error: {e}")))?;

        if !status.is_success() {
            return Err(Error::Token(format!(
                "token endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Token(format!("token response is not valid json: {e}")))?;

        if parsed.access_token.is_empty() {
            return Err(Error::Token(format!(
                "token endpoint returned no access token (code: {}, message: {})",
                parsed.code.map(|c| c.to_string()).unwrap_or_default(),
                parsed.message.unwrap_or_default()
            )));
        }

        let expires_in = parsed
            .expires_in
            .and_then(Seconds::into_duration)
            .ok_or_else(|| Error::Token("token response has no usable expires_in".to_string()))?;

        debug!(app_id = %self.credentials.app_id, ?expires_in, "access token fetched");
        Ok(Token::qqbot(parsed.access_token, expires_in))
    }
}

#[cfg(test)]
mod tests {
    use qbot_core::token::TokenType;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn fetcher(server: &MockServer) -> AppAccessTokenFetcher {
        AppAccessTokenFetcher::with_url(
            Credentials {
                app_id: "102457514".to_string(),
                app_secret: "s3cr3t".to_string(),
            },
            format!("{}/app/getAppAccessToken", server.uri()),
        )
    }

    #[tokio::test]
    async fn posts_credentials_and_accepts_string_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/getAppAccessToken"))
            .and(body_json(json!({"appId": "102457514", "clientSecret": "s3cr3t"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "abc", "expires_in": "7200"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = fetcher(&server).fetch().await.unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.token_type, TokenType::QQBot);
        assert_eq!(token.expires_in, Some(Duration::from_secs(7200)));
        assert_eq!(token.authorization(), "QQBot abc");
    }

    #[tokio::test]
    async fn accepts_numeric_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "abc", "expires_in": 60})),
            )
            .mount(&server)
            .await;

        let token = fetcher(&server).fetch().await.unwrap();
        assert_eq!(token.expires_in, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn error_payload_is_a_token_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 100016, "message": "invalid appid"})),
            )
            .mount(&server)
            .await;

        let err = fetcher(&server).fetch().await.unwrap_err();
        assert!(matches!(&err, Error::Token(m) if m.contains("invalid appid")));
    }

    #[tokio::test]
    async fn http_failure_is_a_token_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = fetcher(&server).fetch().await.unwrap_err();
        assert!(matches!(&err, Error::Token(m) if m.contains("401")));
    }
}
