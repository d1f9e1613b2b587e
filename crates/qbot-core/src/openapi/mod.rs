//! Versioned OpenAPI client abstraction.
//!
//! Callers hold an `Arc<dyn OpenApi>` obtained from an [`ApiRegistry`]; the
//! concrete version lives in an adapter crate and registers a constructor.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Method;

use crate::{
    domain::{ChannelId, GroupId, GuildId, UserId},
    errors::Error,
    token::TokenSource,
    Result,
};

pub mod dto;
pub mod errors;
pub mod filter;

pub use errors::{ApiError, ApiResult};
pub use filter::{FilterChain, IncomingResponse, OutgoingRequest, RequestFilter, ResponseFilter};

use dto::*;

/// Response header carrying the platform's request-correlation id.
pub const TRACE_ID_HEADER: &str = "X-Tps-trace-ID";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApiVersion(pub u32);

impl ApiVersion {
    pub const V1: ApiVersion = ApiVersion(1);
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let digits = raw
            .strip_prefix('v')
            .or_else(|| raw.strip_prefix('V'))
            .unwrap_or(raw);
        digits
            .parse::<u32>()
            .map(ApiVersion)
            .map_err(|_| Error::Config(format!("invalid api version: {s:?}")))
    }
}

/// Raw result of [`OpenApi::request`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub trace_id: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Everything a client instance is bound to.
#[derive(Clone, Debug)]
pub struct ApiOptions {
    pub app_id: String,
    pub tokens: TokenSource,
    pub timeout: Duration,
    pub sandbox: bool,
    /// Overrides the production/sandbox host (tests, proxies).
    pub base_url: Option<String>,
    pub filters: FilterChain,
}

impl ApiOptions {
    pub fn new(app_id: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            app_id: app_id.into(),
            tokens,
            timeout: DEFAULT_TIMEOUT,
            sandbox: false,
            base_url: None,
            filters: FilterChain::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }
}

/// Platform OpenAPI.
///
/// Typed operations default to [`ApiError::Unsupported`] so a version only
/// implements what it serves.
#[async_trait]
pub trait OpenApi: Send + Sync {
    fn version(&self) -> ApiVersion;

    /// Trace id of the most recent response this client received.
    fn last_trace_id(&self) -> Option<String>;

    /// Pass-through request. `path` is relative to the API host.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ApiResult<ApiResponse>;

    async fn me(&self) -> ApiResult<User> {
        Err(ApiError::Unsupported("me"))
    }

    async fn me_guilds(&self, _pager: &GuildPager) -> ApiResult<Vec<Guild>> {
        Err(ApiError::Unsupported("me_guilds"))
    }

    async fn guild(&self, _guild_id: &GuildId) -> ApiResult<Guild> {
        Err(ApiError::Unsupported("guild"))
    }

    async fn guild_member(&self, _guild_id: &GuildId, _user_id: &str) -> ApiResult<Member> {
        Err(ApiError::Unsupported("guild_member"))
    }

    async fn guild_members(
        &self,
        _guild_id: &GuildId,
        _pager: &GuildMembersPager,
    ) -> ApiResult<Vec<Member>> {
        Err(ApiError::Unsupported("guild_members"))
    }

    async fn delete_guild_member(&self, _guild_id: &GuildId, _user_id: &str) -> ApiResult<()> {
        Err(ApiError::Unsupported("delete_guild_member"))
    }

    async fn channel(&self, _channel_id: &ChannelId) -> ApiResult<Channel> {
        Err(ApiError::Unsupported("channel"))
    }

    async fn channels(&self, _guild_id: &GuildId) -> ApiResult<Vec<Channel>> {
        Err(ApiError::Unsupported("channels"))
    }

    async fn post_channel(
        &self,
        _guild_id: &GuildId,
        _value: ChannelValueObject,
    ) -> ApiResult<Channel> {
        Err(ApiError::Unsupported("post_channel"))
    }

    async fn patch_channel(
        &self,
        _channel_id: &ChannelId,
        _value: ChannelValueObject,
    ) -> ApiResult<Channel> {
        Err(ApiError::Unsupported("patch_channel"))
    }

    async fn delete_channel(&self, _channel_id: &ChannelId) -> ApiResult<()> {
        Err(ApiError::Unsupported("delete_channel"))
    }

    /// Guild sub-channel message.
    async fn post_message(
        &self,
        _channel_id: &ChannelId,
        _msg: &MessageToCreate,
    ) -> ApiResult<Message> {
        Err(ApiError::Unsupported("post_message"))
    }

    async fn post_group_message(
        &self,
        _group_id: &GroupId,
        _msg: &MessageToCreate,
    ) -> ApiResult<Message> {
        Err(ApiError::Unsupported("post_group_message"))
    }

    async fn post_c2c_message(
        &self,
        _user_id: &UserId,
        _msg: &MessageToCreate,
    ) -> ApiResult<Message> {
        Err(ApiError::Unsupported("post_c2c_message"))
    }

    async fn post_group_file(
        &self,
        _group_id: &GroupId,
        _req: &FileUploadRequest,
    ) -> ApiResult<FileUploadResponse> {
        Err(ApiError::Unsupported("post_group_file"))
    }

    async fn post_c2c_file(
        &self,
        _user_id: &UserId,
        _req: &FileUploadRequest,
    ) -> ApiResult<FileUploadResponse> {
        Err(ApiError::Unsupported("post_c2c_file"))
    }

    /// Answers an interaction; `body` is the already-encoded JSON payload.
    async fn put_interaction(&self, _interaction_id: &str, _body: &str) -> ApiResult<()> {
        Err(ApiError::Unsupported("put_interaction"))
    }
}

pub type ApiConstructor = fn(ApiOptions) -> Arc<dyn OpenApi>;

/// Version → constructor table. Owned by whoever wires the bot; no globals.
#[derive(Clone, Default)]
pub struct ApiRegistry {
    ctors: HashMap<ApiVersion, ApiConstructor>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `ctor` for `version`, returning the constructor it replaced.
    pub fn register(
        &mut self,
        version: ApiVersion,
        ctor: ApiConstructor,
    ) -> Option<ApiConstructor> {
        self.ctors.insert(version, ctor)
    }

    pub fn versions(&self) -> Vec<ApiVersion> {
        let mut v: Vec<ApiVersion> = self.ctors.keys().copied().collect();
        v.sort();
        v
    }

    /// Builds a client for `version`. Unregistered versions are a configuration
    /// error; there is no fallback to another version.
    pub fn select(&self, version: ApiVersion, options: ApiOptions) -> Result<Arc<dyn OpenApi>> {
        let ctor = self.ctors.get(&version).ok_or_else(|| {
            Error::Config(format!(
                "openapi {version} is not registered (available: {})",
                self.versions()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
        Ok(ctor(options))
    }
}

impl fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}
