//! Built-in command handlers and the default command table.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::router::{CommandHandler, CommandRouter};

pub const GREETING: &str = "老师你好，我是阿罗娜～有什么可以帮你的吗";

/// Asia/Shanghai has no DST, a fixed +08:00 offset is exact.
const BEIJING_OFFSET_SECS: i32 = 8 * 3600;

const BLUE_ARCHIVE_KEYWORDS: [&str; 4] = ["ba", "blue archive", "blue", "档案"];
const BLUE_ARCHIVE_DIR: &str = "blue_archive";

#[derive(Clone, Debug)]
pub struct CommandsConfig {
    pub image_dir: PathBuf,
    pub image_url_prefix: String,
    /// `/gpt` and the catch-all fallback are only registered when set.
    pub chat_backend_url: Option<String>,
    pub chat_backend_timeout: Duration,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("/root/images"),
            image_url_prefix: "http://file.xiaocongyu.com".to_string(),
            chat_backend_url: None,
            chat_backend_timeout: Duration::from_secs(30),
        }
    }
}

/// The default table: `/hello`, `/time`, `/image`, then `/gpt` and the
/// empty-prefix fallback when a chat backend is configured.
pub fn default_router(cfg: &CommandsConfig) -> CommandRouter {
    let mut router = CommandRouter::new()
        .command("/hello", hello)
        .command("/time", current_time)
        .command(
            "/image",
            ImageHandler::new(cfg.image_dir.clone(), cfg.image_url_prefix.clone()),
        );

    if let Some(url) = &cfg.chat_backend_url {
        let chat = std::sync::Arc::new(ChatBackendHandler::new(
            url.clone(),
            cfg.chat_backend_timeout,
        ));
        router.register_arc("/gpt", chat.clone());
        // Must stay last: the empty prefix matches everything.
        router.register_arc("", chat);
    }

    router
}

pub fn hello(body: &str) -> String {
    if body.is_empty() {
        return GREETING.to_string();
    }
    body.to_string()
}

pub fn current_time(_body: &str) -> String {
    let now = Utc::now();
    let formatted = match FixedOffset::east_opt(BEIJING_OFFSET_SECS) {
        Some(tz) => now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => now.format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    format!("The current time is: {formatted}")
}

/// Picks a random picture from a local directory and answers with its public URL.
#[derive(Clone, Debug)]
pub struct ImageHandler {
    dir: PathBuf,
    url_prefix: String,
}

impl ImageHandler {
    pub fn new(dir: PathBuf, url_prefix: String) -> Self {
        Self {
            dir,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    fn target_for(&self, body: &str) -> (PathBuf, String) {
        if BLUE_ARCHIVE_KEYWORDS.iter().any(|k| body.contains(k)) {
            return (
                self.dir.join(BLUE_ARCHIVE_DIR),
                format!("{}/{BLUE_ARCHIVE_DIR}", self.url_prefix),
            );
        }
        (self.dir.clone(), self.url_prefix.clone())
    }
}

#[async_trait]
impl CommandHandler for ImageHandler {
    async fn handle(&self, body: &str) -> String {
        let (dir, prefix) = self.target_for(body);
        let scan_dir = dir.clone();
        let scanned =
            tokio::task::spawn_blocking(move || image_urls(&scan_dir, &prefix)).await;

        let urls = match scanned {
            Ok(Ok(urls)) => urls,
            Ok(Err(e)) => {
                warn!(dir = %dir.display(), error = %e, "image index scan failed");
                return "Image library is unavailable right now.".to_string();
            }
            Err(e) => {
                warn!(error = %e, "image index task failed");
                return "Image library is unavailable right now.".to_string();
            }
        };

        debug!(dir = %dir.display(), count = urls.len(), "image index scanned");
        match urls.choose(&mut rand::thread_rng()) {
            Some(url) => url.clone(),
            None => "No images found.".to_string(),
        }
    }
}

/// Public URLs of every `.jpg` / `.png` below `dir`, relative path appended to `prefix`.
pub fn image_urls(dir: &Path, prefix: &str) -> std::io::Result<Vec<String>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
                continue;
            }
            if !is_image(&path) {
                continue;
            }
            let Ok(rel) = path.strip_prefix(dir) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push(format!("{prefix}/{rel}"));
        }
    }

    out.sort();
    Ok(out)
}

fn is_image(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".jpg") || name.ends_with(".png")
}

/// Forwards the message to an external chat service (`GET <url>?word=<body>`).
#[derive(Clone, Debug)]
pub struct ChatBackendHandler {
    url: String,
    http: reqwest::Client,
}

impl ChatBackendHandler {
    pub fn new(url: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { url, http }
    }
}

#[async_trait]
impl CommandHandler for ChatBackendHandler {
    async fn handle(&self, body: &str) -> String {
        let resp = match self.http.get(&self.url).query(&[("word", body)]).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "chat backend request failed");
                return "The chat service is unreachable, please try again later.".to_string();
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(%status, "chat backend returned an error");
            return "The chat service is unavailable, please try again later.".to_string();
        }
        text
    }
}
