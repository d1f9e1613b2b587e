//! Access tokens and their background refresh.
//!
//! The refresher is the single writer of a `watch` cell; every API call reads a
//! whole `Arc<Token>` snapshot from it, so a reader never sees a half-updated
//! token and never blocks on a refresh in flight.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{errors::Error, Result};

/// Authorization scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenType {
    /// App access token obtained with app id + secret.
    QQBot,
    /// Legacy static bot token (`<app id>.<token>`).
    Bot,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::QQBot => "QQBot",
            TokenType::Bot => "Bot",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: TokenType,
    /// Lifetime reported by the auth endpoint; `None` never expires.
    pub expires_in: Option<Duration>,
    pub issued_at: Instant,
}

impl Token {
    pub fn qqbot(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: TokenType::QQBot,
            expires_in: Some(expires_in),
            issued_at: Instant::now(),
        }
    }

    pub fn bot(app_id: &str, bot_token: &str) -> Self {
        Self {
            access_token: format!("{app_id}.{bot_token}"),
            token_type: TokenType::Bot,
            expires_in: None,
            issued_at: Instant::now(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// App credentials; only ever sent to the auth endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

/// Acquires a fresh token from the auth endpoint.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Token>;
}

/// Read side of the token cell. Cheap to clone.
#[derive(Clone)]
pub struct TokenSource {
    rx: watch::Receiver<Arc<Token>>,
}

impl TokenSource {
    /// A source that never changes (static bot tokens, tests).
    pub fn fixed(token: Token) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(token));
        Self { rx }
    }

    /// Latest token. Never blocks on a refresh.
    pub fn current(&self) -> Arc<Token> {
        self.rx.borrow().clone()
    }

    /// Waits for the next published token. Returns `false` once the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("current", &*self.current())
            .finish()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RefreshPolicy {
    /// Refresh this long before the reported expiry.
    pub margin: Duration,
    /// Wait after a failed refresh before trying again.
    pub retry_interval: Duration,
    /// Lower bound for any wait, so a tiny TTL cannot spin the loop.
    pub min_delay: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            margin: Duration::from_secs(60),
            retry_interval: Duration::from_secs(10),
            min_delay: Duration::from_secs(1),
        }
    }
}

impl RefreshPolicy {
    /// How long to sleep before refreshing `token`; `None` if it never expires.
    pub fn delay_for(&self, token: &Token) -> Option<Duration> {
        let ttl = token.expires_in?;
        let delay = if ttl > self.margin {
            ttl - self.margin
        } else {
            ttl / 2
        };
        let floored = delay.max(self.min_delay);
        if ttl.is_zero() {
            return Some(floored);
        }
        // The floor never pushes the refresh past expiry.
        Some(floored.min(ttl))
    }
}

pub struct TokenRefresher {
    fetcher: Arc<dyn TokenFetcher>,
    policy: RefreshPolicy,
}

impl TokenRefresher {
    pub fn new(fetcher: Arc<dyn TokenFetcher>, policy: RefreshPolicy) -> Self {
        Self { fetcher, policy }
    }

    /// Acquires the first token and spawns the refresh loop.
    ///
    /// Fails if the first acquisition fails: without a valid credential the bot
    /// cannot serve anything.
    pub async fn start(self, cancel: CancellationToken) -> Result<(TokenSource, JoinHandle<()>)> {
        let first = self
            .fetcher
            .fetch()
            .await
            .map_err(|e| Error::Token(format!("initial access token acquisition failed: {e}")))?;

        info!(
            token_type = %first.token_type,
            expires_in = ?first.expires_in,
            "access token acquired"
        );

        let (tx, rx) = watch::channel(Arc::new(first));
        let handle = tokio::spawn(self.run(tx, cancel));
        Ok((TokenSource { rx }, handle))
    }

    async fn run(self, tx: watch::Sender<Arc<Token>>, cancel: CancellationToken) {
        let mut delay = self.policy.delay_for(&tx.borrow());

        loop {
            let Some(wait) = delay else {
                // Non-expiring token: nothing to refresh.
                cancel.cancelled().await;
                break;
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {}
            }

            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.fetcher.fetch() => res,
            };

            match fetched {
                Ok(token) => {
                    delay = self.policy.delay_for(&token);
                    info!(expires_in = ?token.expires_in, "access token refreshed");
                    tx.send_replace(Arc::new(token));
                }
                Err(e) => {
                    // Keep serving with the previous token.
                    warn!(
                        error = %e,
                        retry_in = ?self.policy.retry_interval,
                        "access token refresh failed"
                    );
                    delay = Some(self.policy.retry_interval);
                }
            }
        }

        info!("token refresher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use tokio::sync::Notify;

    use super::*;

    struct FakeFetcher {
        script: Mutex<VecDeque<Result<Token>>>,
        calls: Mutex<usize>,
        /// When set, every call after the first waits for this.
        gate: Option<Arc<Notify>>,
    }

    impl FakeFetcher {
        fn new(script: Vec<Result<Token>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
                gate: None,
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TokenFetcher for FakeFetcher {
        async fn fetch(&self) -> Result<Token> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if n > 1 {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Token("script exhausted".to_string())))
        }
    }

    fn tok(s: &str, secs: u64) -> Result<Token> {
        Ok(Token::qqbot(s, Duration::from_secs(secs)))
    }

    fn policy() -> RefreshPolicy {
        RefreshPolicy {
            margin: Duration::from_secs(60),
            retry_interval: Duration::from_secs(10),
            min_delay: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn initial_failure_is_fatal() {
        let fetcher = Arc::new(FakeFetcher::new(vec![Err(Error::Token("401".to_string()))]));
        let refresher = TokenRefresher::new(fetcher, policy());

        let res = refresher.start(CancellationToken::new()).await;
        assert!(matches!(res, Err(Error::Token(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_before_expiry() {
        let fetcher = Arc::new(FakeFetcher::new(vec![tok("t1", 120), tok("t2", 120)]));
        let cancel = CancellationToken::new();
        let (mut source, handle) = TokenRefresher::new(fetcher.clone(), policy())
            .start(cancel.clone())
            .await
            .unwrap();

        assert_eq!(source.current().access_token, "t1");

        // Refresh is due at 120s - 60s margin.
        sleep(Duration::from_secs(59)).await;
        assert_eq!(source.current().access_token, "t1");

        assert!(source.changed().await);
        assert_eq!(source.current().access_token, "t2");
        assert_eq!(fetcher.calls(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_previous_token_and_retries() {
        let fetcher = Arc::new(FakeFetcher::new(vec![
            tok("t1", 120),
            Err(Error::Token("boom".to_string())),
            tok("t2", 120),
        ]));
        let cancel = CancellationToken::new();
        let (mut source, handle) = TokenRefresher::new(fetcher.clone(), policy())
            .start(cancel.clone())
            .await
            .unwrap();

        // First refresh at 60s fails; token stays.
        sleep(Duration::from_secs(65)).await;
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(source.current().access_token, "t1");

        // Retry at 70s succeeds.
        assert!(source.changed().await);
        assert_eq!(source.current().access_token, "t2");
        assert_eq!(fetcher.calls(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn readers_see_old_token_while_refresh_in_flight() {
        let gate = Arc::new(Notify::new());
        let mut fetcher = FakeFetcher::new(vec![tok("t1", 120), tok("t2", 120)]);
        fetcher.gate = Some(gate.clone());
        let fetcher = Arc::new(fetcher);

        let cancel = CancellationToken::new();
        let (mut source, handle) = TokenRefresher::new(fetcher.clone(), policy())
            .start(cancel.clone())
            .await
            .unwrap();

        sleep(Duration::from_secs(61)).await;
        // Refresh started but is parked on the gate.
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(source.current().access_token, "t1");

        gate.notify_one();
        assert!(source.changed().await);
        assert_eq!(source.current().access_token, "t2");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn policy_refreshes_strictly_before_expiry() {
        let p = policy();
        assert_eq!(
            p.delay_for(&Token::qqbot("x", Duration::from_secs(7200))),
            Some(Duration::from_secs(7140))
        );
        // TTL inside the margin: halve it instead of refreshing immediately.
        assert_eq!(
            p.delay_for(&Token::qqbot("x", Duration::from_secs(30))),
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            p.delay_for(&Token::qqbot("x", Duration::from_millis(1500))),
            Some(p.min_delay)
        );
        // Shorter than the floor: refresh at expiry at the latest, never after.
        let short = Duration::from_millis(400);
        let delay = p.delay_for(&Token::qqbot("x", short)).unwrap();
        assert!(delay <= short, "{delay:?} is past the {short:?} expiry");
        assert_eq!(p.delay_for(&Token::bot("app", "tok")), None);
    }

    #[test]
    fn authorization_header_and_redaction() {
        let t = Token::bot("123", "abc");
        assert_eq!(t.authorization(), "Bot 123.abc");
        assert!(!format!("{t:?}").contains("abc"));

        let q = Token::qqbot("zzz", Duration::from_secs(1));
        assert_eq!(q.authorization(), "QQBot zzz");
    }

    #[tokio::test]
    async fn fixed_source_is_stable() {
        let source = TokenSource::fixed(Token::bot("1", "2"));
        assert_eq!(source.current().access_token, "1.2");
        assert_eq!(source.clone().current().access_token, "1.2");
    }
}
