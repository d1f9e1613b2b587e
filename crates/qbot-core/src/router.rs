//! Ordered prefix command router.
//!
//! Registration order is match priority: the first entry whose prefix is a
//! literal prefix of the input wins. The empty prefix matches everything, so a
//! fallback handler must be registered last.

use std::{future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

/// Reply text used when no command matched.
pub const UNKNOWN_COMMAND: &str = "Unknown command";

/// A command handler: message body (prefix stripped) in, reply text out.
///
/// Handlers may do I/O (image index, chat backend) but never touch router state.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, body: &str) -> String;
}

#[async_trait]
impl<F> CommandHandler for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    async fn handle(&self, body: &str) -> String {
        self(body)
    }
}

/// Adapter for async closures (`|body| async move { ... }`).
pub struct AsyncFnHandler<F>(pub F);

#[async_trait]
impl<F> CommandHandler for AsyncFnHandler<F>
where
    F: Fn(String) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync,
{
    async fn handle(&self, body: &str) -> String {
        (self.0)(body.to_string()).await
    }
}

/// Outcome of a dispatch.
///
/// Keeps "nothing matched" apart from "a handler replied with this text", even
/// when that text happens to equal [`UNKNOWN_COMMAND`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Handled(String),
    NoMatch,
}

impl Dispatch {
    pub fn into_reply(self) -> String {
        match self {
            Dispatch::Handled(text) => text,
            Dispatch::NoMatch => UNKNOWN_COMMAND.to_string(),
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }
}

#[derive(Clone)]
struct Route {
    prefix: String,
    handler: Arc<dyn CommandHandler>,
}

#[derive(Clone, Default)]
pub struct CommandRouter {
    routes: Vec<Route>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`register`](Self::register).
    pub fn command(
        mut self,
        prefix: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) -> Self {
        self.register(prefix, handler);
        self
    }

    /// Appends a route. Earlier routes take priority.
    pub fn register(&mut self, prefix: impl Into<String>, handler: impl CommandHandler + 'static) {
        self.register_arc(prefix, Arc::new(handler));
    }

    pub fn register_arc(&mut self, prefix: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.routes.push(Route {
            prefix: prefix.into(),
            handler,
        });
    }

    /// Removes every route registered under `prefix`. Returns how many were removed.
    pub fn remove(&mut self, prefix: &str) -> usize {
        let before = self.routes.len();
        self.routes.retain(|r| r.prefix != prefix);
        before - self.routes.len()
    }

    /// Prefixes in match order.
    pub fn prefixes(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.prefix.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes `text` (already normalized) to the first matching handler.
    pub async fn dispatch(&self, text: &str) -> Dispatch {
        for route in &self.routes {
            let Some(rest) = text.strip_prefix(route.prefix.as_str()) else {
                continue;
            };
            debug!(prefix = %route.prefix, "command matched");
            let reply = route.handler.handle(rest.trim()).await;
            return Dispatch::Handled(reply);
        }
        Dispatch::NoMatch
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("prefixes", &self.prefixes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h1(body: &str) -> String {
        format!("h1:{body}")
    }

    fn h2(body: &str) -> String {
        format!("h2:{body}")
    }

    #[tokio::test]
    async fn first_matching_prefix_wins_and_body_is_trimmed() {
        let router = CommandRouter::new().command("/a", h1).command("", h2);

        assert_eq!(router.dispatch("/a x").await, Dispatch::Handled("h1:x".into()));
        assert_eq!(router.dispatch("/a   spaced  ").await, Dispatch::Handled("h1:spaced".into()));
    }

    #[tokio::test]
    async fn empty_prefix_is_a_fallback() {
        let router = CommandRouter::new().command("/a", h1).command("", h2);
        assert_eq!(router.dispatch("zzz").await, Dispatch::Handled("h2:zzz".into()));
    }

    #[tokio::test]
    async fn no_match_without_fallback() {
        let mut router = CommandRouter::new().command("/a", h1).command("", h2);
        assert_eq!(router.remove(""), 1);

        let out = router.dispatch("zzz").await;
        assert_eq!(out, Dispatch::NoMatch);
        assert_eq!(out.into_reply(), UNKNOWN_COMMAND);
    }

    #[tokio::test]
    async fn registration_order_beats_prefix_length() {
        // "/im" is registered first, so "/image" never gets a chance.
        let router = CommandRouter::new()
            .command("/im", |_: &str| "short".to_string())
            .command("/image", |_: &str| "long".to_string());
        assert_eq!(router.dispatch("/image ba").await, Dispatch::Handled("short".into()));
    }

    #[tokio::test]
    async fn fallback_registered_first_shadows_everything() {
        let router = CommandRouter::new().command("", h2).command("/a", h1);
        assert_eq!(router.dispatch("/a x").await, Dispatch::Handled("h2:/a x".into()));
    }

    #[tokio::test]
    async fn handler_text_equal_to_sentinel_is_still_handled() {
        let router = CommandRouter::new().command("/u", |_: &str| UNKNOWN_COMMAND.to_string());
        assert!(router.dispatch("/u").await.is_match());
    }

    #[tokio::test]
    async fn async_handlers_are_supported() {
        let router = CommandRouter::new().command(
            "/echo",
            AsyncFnHandler(|body: String| -> Pin<Box<dyn Future<Output = String> + Send>> {
                Box::pin(async move { body.to_uppercase() })
            }),
        );
        assert_eq!(router.dispatch("/echo hi").await, Dispatch::Handled("HI".into()));
    }

    #[test]
    fn prefixes_keep_registration_order() {
        let router = CommandRouter::new()
            .command("/hello", h1)
            .command("/time", h1)
            .command("", h2);
        assert_eq!(router.prefixes(), vec!["/hello", "/time", ""]);
    }
}
