//! OpenAPI v1 over reqwest.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use qbot_core::{
    config::{DEFAULT_API_BASE_URL, SANDBOX_API_BASE_URL},
    domain::{ChannelId, GroupId, GuildId, UserId},
    openapi::{
        dto::{
            Channel, ChannelValueObject, FileUploadRequest, FileUploadResponse, Guild,
            GuildMembersPager, GuildPager, Member, Message, MessageToCreate, User,
        },
        ApiError, ApiOptions, ApiResponse, ApiResult, ApiVersion, FilterChain, IncomingResponse,
        OpenApi, OutgoingRequest, TRACE_ID_HEADER,
    },
    token::TokenSource,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info};

const APP_ID_HEADER: &str = "x-union-appid";

pub fn user_agent() -> String {
    format!("qbot/{}", env!("CARGO_PKG_VERSION"))
}

pub struct OpenApiV1 {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    tokens: TokenSource,
    timeout: Duration,
    filters: FilterChain,
    last_trace: Mutex<Option<String>>,
}

impl OpenApiV1 {
    pub fn new(options: ApiOptions) -> Self {
        let base_url = options
            .base_url
            .unwrap_or_else(|| {
                if options.sandbox {
                    SANDBOX_API_BASE_URL.to_string()
                } else {
                    DEFAULT_API_BASE_URL.to_string()
                }
            })
            .trim_end_matches('/')
            .to_string();

        Self {
            http: reqwest::Client::new(),
            base_url,
            app_id: options.app_id,
            tokens: options.tokens,
            timeout: options.timeout,
            filters: options.filters,
            last_trace: Mutex::new(None),
        }
    }

    /// Registry constructor for [`ApiVersion::V1`].
    pub fn constructor(options: ApiOptions) -> Arc<dyn OpenApi> {
        Arc::new(Self::new(options))
    }

    fn headers(&self) -> ApiResult<HeaderMap> {
        let token = self.tokens.current();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&token.authorization())?);
        headers.insert(USER_AGENT, header_value(&user_agent())?);
        headers.insert(HeaderName::from_static(APP_ID_HEADER), header_value(&self.app_id)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> ApiResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut headers = self.headers()?;

        self.filters
            .run_request(&mut OutgoingRequest {
                method: &method,
                url: &url,
                headers: &mut headers,
                body,
            })
            .map_err(ApiError::Filter)?;

        let mut req = self
            .http
            .request(method.clone(), &url)
            .headers(headers)
            .timeout(self.timeout);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let started = Instant::now();
        let resp = req.send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let resp_headers = resp.headers().clone();
        let trace_id = resp_headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let bytes = resp.bytes().await.map_err(classify)?;

        info!(
            "[OPENAPI]{method} {path}, trace:{}, status:{status}, elapsed:{}ms",
            trace_id.as_deref().unwrap_or(""),
            started.elapsed().as_millis()
        );
        debug!(req = ?body, resp = %String::from_utf8_lossy(&bytes), "openapi payloads");

        if let Ok(mut last) = self.last_trace.lock() {
            *last = trace_id.clone();
        }

        self.filters
            .run_response(&IncomingResponse {
                method: &method,
                url: &url,
                status,
                headers: &resp_headers,
            })
            .map_err(ApiError::Filter)?;

        if !(200..300).contains(&status) {
            return Err(ApiError::Status {
                code: status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
                trace_id,
            });
        }

        Ok(ApiResponse {
            status,
            trace_id,
            body: bytes.to_vec(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> ApiResult<T> {
        self.execute(method, path, query, body).await?.json()
    }
}

#[async_trait]
impl OpenApi for OpenApiV1 {
    fn version(&self) -> ApiVersion {
        ApiVersion::V1
    }

    fn last_trace_id(&self) -> Option<String> {
        self.last_trace.lock().ok().and_then(|t| t.clone())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<ApiResponse> {
        self.execute(method, path, &[], body).await
    }

    async fn me(&self) -> ApiResult<User> {
        self.call(Method::GET, "/users/@me", &[], None).await
    }

    async fn me_guilds(&self, pager: &GuildPager) -> ApiResult<Vec<Guild>> {
        self.call(Method::GET, "/users/@me/guilds", &pager.query_params(), None)
            .await
    }

    async fn guild(&self, guild_id: &GuildId) -> ApiResult<Guild> {
        let path = format!("/guilds/{}", segment(&guild_id.0)?);
        self.call(Method::GET, &path, &[], None).await
    }

    async fn guild_member(&self, guild_id: &GuildId, user_id: &str) -> ApiResult<Member> {
        let path = format!("/guilds/{}/members/{}", segment(&guild_id.0)?, segment(user_id)?);
        self.call(Method::GET, &path, &[], None).await
    }

    async fn guild_members(
        &self,
        guild_id: &GuildId,
        pager: &GuildMembersPager,
    ) -> ApiResult<Vec<Member>> {
        let path = format!("/guilds/{}/members", segment(&guild_id.0)?);
        self.call(Method::GET, &path, &pager.query_params(), None).await
    }

    async fn delete_guild_member(&self, guild_id: &GuildId, user_id: &str) -> ApiResult<()> {
        let path = format!("/guilds/{}/members/{}", segment(&guild_id.0)?, segment(user_id)?);
        self.execute(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    async fn channel(&self, channel_id: &ChannelId) -> ApiResult<Channel> {
        let path = format!("/channels/{}", segment(&channel_id.0)?);
        self.call(Method::GET, &path, &[], None).await
    }

    async fn channels(&self, guild_id: &GuildId) -> ApiResult<Vec<Channel>> {
        let path = format!("/guilds/{}/channels", segment(&guild_id.0)?);
        self.call(Method::GET, &path, &[], None).await
    }

    async fn post_channel(
        &self,
        guild_id: &GuildId,
        mut value: ChannelValueObject,
    ) -> ApiResult<Channel> {
        if value.position == 0 {
            value.position = chrono::Utc::now().timestamp();
        }
        let path = format!("/guilds/{}/channels", segment(&guild_id.0)?);
        let body = to_body(&value)?;
        self.call(Method::POST, &path, &[], Some(&body)).await
    }

    async fn patch_channel(
        &self,
        channel_id: &ChannelId,
        mut value: ChannelValueObject,
    ) -> ApiResult<Channel> {
        if value.position == 0 {
            value.position = chrono::Utc::now().timestamp();
        }
        let path = format!("/channels/{}", segment(&channel_id.0)?);
        let body = to_body(&value)?;
        self.call(Method::PATCH, &path, &[], Some(&body)).await
    }

    async fn delete_channel(&self, channel_id: &ChannelId) -> ApiResult<()> {
        let path = format!("/channels/{}", segment(&channel_id.0)?);
        self.execute(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    async fn post_message(
        &self,
        channel_id: &ChannelId,
        msg: &MessageToCreate,
    ) -> ApiResult<Message> {
        let path = format!("/channels/{}/messages", segment(&channel_id.0)?);
        let body = to_body(msg)?;
        self.call(Method::POST, &path, &[], Some(&body)).await
    }

    async fn post_group_message(
        &self,
        group_id: &GroupId,
        msg: &MessageToCreate,
    ) -> ApiResult<Message> {
        let path = format!("/v2/groups/{}/messages", segment(&group_id.0)?);
        let body = to_body(msg)?;
        self.call(Method::POST, &path, &[], Some(&body)).await
    }

    async fn post_c2c_message(
        &self,
        user_id: &UserId,
        msg: &MessageToCreate,
    ) -> ApiResult<Message> {
        let path = format!("/v2/users/{}/messages", segment(&user_id.0)?);
        let body = to_body(msg)?;
        self.call(Method::POST, &path, &[], Some(&body)).await
    }

    async fn post_group_file(
        &self,
        group_id: &GroupId,
        req: &FileUploadRequest,
    ) -> ApiResult<FileUploadResponse> {
        let path = format!("/v2/groups/{}/files", segment(&group_id.0)?);
        let body = to_body(req)?;
        self.call(Method::POST, &path, &[], Some(&body)).await
    }

    async fn post_c2c_file(
        &self,
        user_id: &UserId,
        req: &FileUploadRequest,
    ) -> ApiResult<FileUploadResponse> {
        let path = format!("/v2/users/{}/files", segment(&user_id.0)?);
        let body = to_body(req)?;
        self.call(Method::POST, &path, &[], Some(&body)).await
    }

    async fn put_interaction(&self, interaction_id: &str, body: &str) -> ApiResult<()> {
        let path = format!("/interactions/{}", segment(interaction_id)?);
        let body: Value = serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidRequest(format!("interaction body is not json: {e}")))?;
        self.execute(Method::PUT, &path, &[], Some(&body)).await?;
        Ok(())
    }
}

/// Path parameter guard: ids are opaque tokens and must not reshape the path.
fn segment(id: &str) -> ApiResult<&str> {
    if id.is_empty() || id.contains(|c| matches!(c, '/' | '?' | '#')) {
        return Err(ApiError::InvalidRequest(format!("invalid path parameter {id:?}")));
    }
    Ok(id)
}

fn to_body<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

fn header_value(v: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(v)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid header value: {e}")))
}

fn classify(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(e.to_string())
    }
}
