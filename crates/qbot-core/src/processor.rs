//! Per-event pipeline: rate check, normalize, dispatch, build reply, send.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    domain::ConversationKind,
    errors::Error,
    limiter::RateLimiter,
    messaging::{
        text::{looks_like_media_url, normalize},
        types::{FriendEvent, FriendEventKind, InboundEvent},
    },
    openapi::{
        dto::{
            FileType, FileUploadRequest, FileUploadResponse, MediaInfo, Message, MessageKind,
            MessageReference, MessageToCreate, SearchInputResolved, SearchLayout, SearchRecord,
            SearchRsp, INTERACTION_DATA_TYPE_CHAT_SEARCH,
        },
        ApiError, ApiResult, OpenApi,
    },
    router::CommandRouter,
    Result,
};

/// Content of a rich-media reply; the media itself travels in `media.file_info`.
pub const MEDIA_REPLY_CONTENT: &str = "图片效果";

const FALLBACK_PREFIX: &str = "处理异常: ";
const UPLOAD_FAILED_PREFIX: &str = "图片上传失败: ";
const INLINE_SEARCH_KEYWORD: &str = "test";

/// How one inbound event ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Rejected by the rate limiter, or an interaction without an id to answer.
    Dropped,
    Sent,
    /// The reply failed and the single fallback reply went out.
    FallbackSent,
    /// Both the reply and the fallback failed.
    FallbackFailed,
}

pub struct MessageProcessor {
    api: Arc<dyn OpenApi>,
    router: CommandRouter,
    limiter: Arc<RateLimiter>,
    deadline: Duration,
}

impl MessageProcessor {
    pub fn new(
        api: Arc<dyn OpenApi>,
        router: CommandRouter,
        limiter: Arc<RateLimiter>,
        deadline: Duration,
    ) -> Self {
        Self {
            api,
            router,
            limiter,
            deadline,
        }
    }

    pub async fn process(&self, event: &InboundEvent) -> ProcessOutcome {
        if event.kind == ConversationKind::Interaction {
            return match self.process_interaction(event).await {
                Ok(()) => ProcessOutcome::Sent,
                Err(e) => {
                    warn!(error = %e, "interaction failed, sending fallback");
                    self.interaction_fallback(event, &e).await
                }
            };
        }

        if !self.limiter.allow(&event.text) {
            debug!(
                kind = event.kind.as_str(),
                conversation = %event.conversation_id,
                text = %event.text,
                "duplicate event dropped"
            );
            return ProcessOutcome::Dropped;
        }

        let input = normalize(&event.text);
        info!(
            kind = event.kind.as_str(),
            conversation = %event.conversation_id,
            %input,
            "command received"
        );

        let attempt = tokio::time::timeout(self.deadline, self.reply(event, &input)).await;
        let err = match attempt {
            Ok(Ok(_)) => return ProcessOutcome::Sent,
            Ok(Err(e)) => e,
            Err(_) => ApiError::Timeout,
        };

        warn!(
            kind = event.kind.as_str(),
            conversation = %event.conversation_id,
            error = %err,
            "reply failed, sending fallback"
        );
        self.fallback(event, &err).await
    }

    async fn reply(&self, event: &InboundEvent, input: &str) -> ApiResult<Message> {
        let candidate = self.router.dispatch(input).await.into_reply();

        let mut msg = reply_skeleton(event, 1);
        if looks_like_media_url(&candidate) {
            match self.upload(event, &candidate).await {
                Ok(file) => {
                    msg.msg_type = MessageKind::RichMedia;
                    msg.media = Some(MediaInfo {
                        file_info: file.file_info,
                    });
                    msg.content = MEDIA_REPLY_CONTENT.to_string();
                }
                Err(e) => {
                    warn!(url = %candidate, error = %e, "media upload failed");
                    msg.content = format!("{UPLOAD_FAILED_PREFIX}{}", e.user_reason());
                }
            }
        } else {
            msg.content = candidate;
        }

        self.send(event, &msg).await
    }

    async fn upload(&self, event: &InboundEvent, url: &str) -> ApiResult<FileUploadResponse> {
        let req = FileUploadRequest::from_url(FileType::Image, url);
        match event.kind {
            ConversationKind::Group => self.api.post_group_file(&event.group_id(), &req).await,
            ConversationKind::Direct => self.api.post_c2c_file(&event.user_id(), &req).await,
            ConversationKind::Guild | ConversationKind::Interaction => {
                Err(ApiError::InvalidRequest(
                    "rich media upload is not available in guild channels".to_string(),
                ))
            }
        }
    }

    async fn send(&self, event: &InboundEvent, msg: &MessageToCreate) -> ApiResult<Message> {
        match event.kind {
            ConversationKind::Group => self.api.post_group_message(&event.group_id(), msg).await,
            ConversationKind::Direct => self.api.post_c2c_message(&event.user_id(), msg).await,
            ConversationKind::Guild => self.api.post_message(&event.channel_id(), msg).await,
            ConversationKind::Interaction => Err(ApiError::InvalidRequest(
                "interactions are answered with put_interaction".to_string(),
            )),
        }
    }

    async fn fallback(&self, event: &InboundEvent, err: &ApiError) -> ProcessOutcome {
        let mut msg = reply_skeleton(event, 2);
        msg.content = format!("{FALLBACK_PREFIX}{}", err.user_reason());

        let sent = tokio::time::timeout(self.deadline, self.send(event, &msg)).await;
        match sent {
            Ok(Ok(_)) => ProcessOutcome::FallbackSent,
            Ok(Err(e)) => {
                warn!(conversation = %event.conversation_id, error = %e, "fallback reply failed");
                ProcessOutcome::FallbackFailed
            }
            Err(_) => {
                warn!(conversation = %event.conversation_id, "fallback reply timed out");
                ProcessOutcome::FallbackFailed
            }
        }
    }

    /// Answers an inline chat search. Only the `test` keyword is served.
    pub async fn process_interaction(&self, event: &InboundEvent) -> Result<()> {
        let data = event
            .interaction
            .as_ref()
            .ok_or_else(|| Error::Handler("interaction event without payload".to_string()))?;

        if data.data_type != INTERACTION_DATA_TYPE_CHAT_SEARCH {
            debug!(data_type = data.data_type, "interaction is not a chat search");
            return Err(Error::Handler("only inline search is supported".to_string()));
        }

        let search: SearchInputResolved = serde_json::from_value(data.resolved.clone())
            .map_err(|e| {
                debug!(error = %e, "undecodable search payload");
                Error::Handler("the search payload could not be read".to_string())
            })?;
        if search.keyword != INLINE_SEARCH_KEYWORD {
            return Err(Error::Handler(format!(
                "search keyword {:?} is not allowed",
                search.keyword
            )));
        }

        let body = serde_json::to_string(&inline_search_response())?;
        self.api.put_interaction(&data.id, &body).await?;
        info!(interaction = %data.id, "inline search answered");
        Ok(())
    }

    /// Answers a failed interaction once with a layout that carries the reason.
    async fn interaction_fallback(&self, event: &InboundEvent, err: &Error) -> ProcessOutcome {
        let Some(data) = event.interaction.as_ref().filter(|d| !d.id.is_empty()) else {
            return ProcessOutcome::Dropped;
        };

        let reason = match err {
            Error::Handler(reason) => reason.clone(),
            Error::Api(e) => e.user_reason().to_string(),
            _ => "the search could not be served".to_string(),
        };
        let rsp = SearchRsp {
            layouts: vec![SearchLayout {
                layout_type: 0,
                action_type: 0,
                title: format!("{FALLBACK_PREFIX}{reason}"),
                records: Vec::new(),
            }],
        };

        let sent = match serde_json::to_string(&rsp) {
            Ok(body) => {
                tokio::time::timeout(self.deadline, self.api.put_interaction(&data.id, &body)).await
            }
            Err(e) => {
                warn!(error = %e, "cannot encode interaction fallback");
                return ProcessOutcome::FallbackFailed;
            }
        };
        match sent {
            Ok(Ok(())) => ProcessOutcome::FallbackSent,
            Ok(Err(e)) => {
                warn!(interaction = %data.id, error = %e, "interaction fallback failed");
                ProcessOutcome::FallbackFailed
            }
            Err(_) => {
                warn!(interaction = %data.id, "interaction fallback timed out");
                ProcessOutcome::FallbackFailed
            }
        }
    }

    /// Greets users who add the bot; removals are only logged.
    pub async fn process_friend(&self, event: &FriendEvent) -> Result<()> {
        match event.kind {
            FriendEventKind::Delete => {
                info!(openid = %event.openid, "friend removed");
                Ok(())
            }
            FriendEventKind::Add => {
                info!(openid = %event.openid, "friend added");
                let msg = MessageToCreate {
                    content: format!("ID为 {} 的用户添加机器人为好友", event.openid),
                    timestamp: Utc::now().timestamp_millis(),
                    ..Default::default()
                };
                self.api
                    .post_c2c_message(&crate::domain::UserId(event.openid.clone()), &msg)
                    .await?;
                Ok(())
            }
        }
    }
}

fn reply_skeleton(event: &InboundEvent, seq: u32) -> MessageToCreate {
    let message_id = event.message_id.clone().filter(|id| !id.is_empty());
    MessageToCreate {
        msg_type: MessageKind::Text,
        msg_seq: Some(seq),
        message_reference: message_id.clone().map(|id| MessageReference {
            message_id: id,
            ignore_get_message_error: true,
        }),
        msg_id: message_id,
        timestamp: Utc::now().timestamp_millis(),
        ..Default::default()
    }
}

fn inline_search_response() -> SearchRsp {
    SearchRsp {
        layouts: vec![SearchLayout {
            layout_type: 0,
            action_type: 0,
            title: "内联搜索".to_string(),
            records: vec![SearchRecord {
                cover: "https://pub.idqqimg.com/pc/misc/files/20211208/311cfc87ce394c62b7c9f0508658cf25.png"
                    .to_string(),
                title: "内联搜索标题".to_string(),
                tips: "内联搜索 tips".to_string(),
                url: "https://www.qq.com".to_string(),
            }],
        }],
    }
}
