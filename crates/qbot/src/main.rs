use std::sync::Arc;

use anyhow::Context;
use qbot_core::{
    commands::default_router,
    config::Config,
    limiter::RateLimiter,
    openapi::{ApiOptions, ApiRegistry},
    processor::MessageProcessor,
    token::{Credentials, RefreshPolicy, Token, TokenRefresher, TokenSource},
};
use qbot_openapi::AppAccessTokenFetcher;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod serve;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    qbot_core::logging::init("qbot")?;

    let cfg = Config::load()?;
    info!(
        app_id = %cfg.app_id,
        version = %cfg.api_version,
        base_url = %cfg.api_base_url,
        "qbot starting"
    );

    let cancel = CancellationToken::new();

    // App secret wins over a static bot token when both are configured.
    let (tokens, refresher) = match (&cfg.app_secret, &cfg.bot_token) {
        (Some(secret), _) => {
            let fetcher = AppAccessTokenFetcher::with_url(
                Credentials {
                    app_id: cfg.app_id.clone(),
                    app_secret: secret.clone(),
                },
                cfg.token_url.clone(),
            )
            .with_timeout(cfg.api_timeout);
            let policy = RefreshPolicy {
                margin: cfg.token_refresh_margin,
                retry_interval: cfg.token_retry_interval,
                ..RefreshPolicy::default()
            };
            let (source, handle) = TokenRefresher::new(Arc::new(fetcher), policy)
                .start(cancel.clone())
                .await
                .context("cannot start without an access token")?;
            (source, Some(handle))
        }
        (None, Some(bot_token)) => (TokenSource::fixed(Token::bot(&cfg.app_id, bot_token)), None),
        (None, None) => anyhow::bail!("either QBOT_APP_SECRET or QBOT_BOT_TOKEN is required"),
    };

    let mut registry = ApiRegistry::new();
    qbot_openapi::register_all(&mut registry);
    let api = registry.select(
        cfg.api_version,
        ApiOptions::new(cfg.app_id.clone(), tokens)
            .with_timeout(cfg.api_timeout)
            .with_sandbox(cfg.sandbox)
            .with_base_url(cfg.api_base_url.clone()),
    )?;

    let processor = Arc::new(MessageProcessor::new(
        api,
        default_router(&cfg.commands()),
        Arc::new(RateLimiter::new(cfg.rate_limit_cooldown)),
        cfg.event_deadline,
    ));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
                cancel.cancel();
            }
        });
    }

    serve::run(processor, BufReader::new(tokio::io::stdin()), cancel.clone()).await?;

    cancel.cancel();
    if let Some(handle) = refresher {
        if let Err(e) = handle.await {
            warn!(error = %e, "token refresher task failed");
        }
    }

    info!("qbot stopped");
    Ok(())
}
