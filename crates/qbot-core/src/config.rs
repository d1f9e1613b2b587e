use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{commands::CommandsConfig, errors::Error, openapi::ApiVersion, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.sgroup.qq.com";
pub const SANDBOX_API_BASE_URL: &str = "https://sandbox.api.sgroup.qq.com";
pub const DEFAULT_TOKEN_URL: &str = "https://bots.qq.com/app/getAppAccessToken";

/// Typed configuration, read from `QBOT_*` environment variables.
#[derive(Clone)]
pub struct Config {
    // Credentials
    pub app_id: String,
    pub app_secret: Option<String>,
    pub bot_token: Option<String>,

    // OpenAPI
    pub api_version: ApiVersion,
    pub sandbox: bool,
    pub api_base_url: String,
    pub token_url: String,
    pub api_timeout: Duration,

    // Processing
    pub event_deadline: Duration,
    pub rate_limit_cooldown: Duration,

    // Token refresh
    pub token_refresh_margin: Duration,
    pub token_retry_interval: Duration,

    // Commands
    pub image_dir: PathBuf,
    pub image_url_prefix: String,
    pub chat_backend_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; `load` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(non_empty);
        let get_u64 = |key: &str| -> Result<Option<u64>> {
            match get(key) {
                None => Ok(None),
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| {
                        Error::Config(format!("{key} must be a non-negative integer, got {v:?}"))
                    }),
            }
        };

        // Required env vars
        let app_id = get("QBOT_APP_ID").ok_or_else(|| {
            Error::Config("QBOT_APP_ID environment variable is required".to_string())
        })?;
        let app_secret = get("QBOT_APP_SECRET");
        let bot_token = get("QBOT_BOT_TOKEN");
        if app_secret.is_none() && bot_token.is_none() {
            return Err(Error::Config(
                "either QBOT_APP_SECRET or QBOT_BOT_TOKEN environment variable is required"
                    .to_string(),
            ));
        }

        let api_version = match get("QBOT_API_VERSION") {
            Some(v) => v.parse::<ApiVersion>()?,
            None => ApiVersion::V1,
        };

        let sandbox = get("QBOT_SANDBOX").map(|v| parse_bool(&v)).unwrap_or(false);
        let api_base_url = get("QBOT_API_BASE_URL").unwrap_or_else(|| {
            if sandbox {
                SANDBOX_API_BASE_URL.to_string()
            } else {
                DEFAULT_API_BASE_URL.to_string()
            }
        });
        let token_url = get("QBOT_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        // Timeouts
        let api_timeout = Duration::from_millis(get_u64("QBOT_API_TIMEOUT_MS")?.unwrap_or(5_000));
        let event_deadline =
            Duration::from_millis(get_u64("QBOT_EVENT_DEADLINE_MS")?.unwrap_or(15_000));
        let rate_limit_cooldown =
            Duration::from_millis(get_u64("QBOT_RATE_LIMIT_COOLDOWN_MS")?.unwrap_or(1_000));

        let token_refresh_margin =
            Duration::from_secs(get_u64("QBOT_TOKEN_REFRESH_MARGIN_SECS")?.unwrap_or(60));
        let token_retry_interval =
            Duration::from_secs(get_u64("QBOT_TOKEN_RETRY_SECS")?.unwrap_or(10));

        // Commands
        let image_dir =
            PathBuf::from(get("QBOT_IMAGE_DIR").unwrap_or_else(|| "/root/images".to_string()));
        let image_url_prefix = get("QBOT_IMAGE_URL_PREFIX")
            .unwrap_or_else(|| "http://file.xiaocongyu.com".to_string());
        let chat_backend_url = get("QBOT_CHAT_BACKEND_URL");

        Ok(Self {
            app_id,
            app_secret,
            bot_token,
            api_version,
            sandbox,
            api_base_url,
            token_url,
            api_timeout,
            event_deadline,
            rate_limit_cooldown,
            token_refresh_margin,
            token_retry_interval,
            image_dir,
            image_url_prefix,
            chat_backend_url,
        })
    }

    pub fn commands(&self) -> CommandsConfig {
        CommandsConfig {
            image_dir: self.image_dir.clone(),
            image_url_prefix: self.image_url_prefix.clone(),
            chat_backend_url: self.chat_backend_url.clone(),
            ..CommandsConfig::default()
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<redacted>"))
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("api_version", &self.api_version)
            .field("sandbox", &self.sandbox)
            .field("api_base_url", &self.api_base_url)
            .field("token_url", &self.token_url)
            .field("api_timeout", &self.api_timeout)
            .field("event_deadline", &self.event_deadline)
            .field("rate_limit_cooldown", &self.rate_limit_cooldown)
            .field("token_refresh_margin", &self.token_refresh_margin)
            .field("token_retry_interval", &self.token_retry_interval)
            .field("image_dir", &self.image_dir)
            .field("image_url_prefix", &self.image_url_prefix)
            .field("chat_backend_url", &self.chat_backend_url)
            .finish()
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("QBOT_APP_ID", "1024"), ("QBOT_APP_SECRET", "s")]).unwrap();
        assert_eq!(cfg.api_version, ApiVersion::V1);
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cfg.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(cfg.api_timeout, Duration::from_secs(5));
        assert_eq!(cfg.event_deadline, Duration::from_secs(15));
        assert_eq!(cfg.rate_limit_cooldown, Duration::from_secs(1));
        assert_eq!(cfg.token_refresh_margin, Duration::from_secs(60));
        assert_eq!(cfg.token_retry_interval, Duration::from_secs(10));
        assert_eq!(cfg.image_dir, PathBuf::from("/root/images"));
        assert!(cfg.chat_backend_url.is_none());
    }

    #[test]
    fn sandbox_switches_host_unless_overridden() {
        let cfg = load(&[
            ("QBOT_APP_ID", "1"),
            ("QBOT_BOT_TOKEN", "t"),
            ("QBOT_SANDBOX", "yes"),
        ])
        .unwrap();
        assert!(cfg.sandbox);
        assert_eq!(cfg.api_base_url, SANDBOX_API_BASE_URL);

        let cfg = load(&[
            ("QBOT_APP_ID", "1"),
            ("QBOT_BOT_TOKEN", "t"),
            ("QBOT_SANDBOX", "true"),
            ("QBOT_API_BASE_URL", "http://127.0.0.1:9000"),
        ])
        .unwrap();
        assert_eq!(cfg.api_base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn missing_credentials_are_fatal() {
        assert!(matches!(load(&[]), Err(Error::Config(_))));
        assert!(matches!(load(&[("QBOT_APP_ID", "1")]), Err(Error::Config(_))));
        assert!(matches!(
            load(&[("QBOT_APP_ID", " "), ("QBOT_APP_SECRET", "s")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn bad_numbers_and_versions_are_rejected() {
        let err = load(&[
            ("QBOT_APP_ID", "1"),
            ("QBOT_APP_SECRET", "s"),
            ("QBOT_API_TIMEOUT_MS", "soon"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("QBOT_API_TIMEOUT_MS"));

        assert!(load(&[
            ("QBOT_APP_ID", "1"),
            ("QBOT_APP_SECRET", "s"),
            ("QBOT_API_VERSION", "zero"),
        ])
        .is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = load(&[("QBOT_APP_ID", "1"), ("QBOT_APP_SECRET", "hunter2")]).unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn dotenv_parsing() {
        let parsed = parse_dotenv(
            "# comment\nQBOT_APP_ID = 42\n\nQBOT_APP_SECRET=\"quoted\"\nnoequals\n=skip\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("QBOT_APP_ID".to_string(), "42".to_string()),
                ("QBOT_APP_SECRET".to_string(), "quoted".to_string()),
            ]
        );
    }
}
