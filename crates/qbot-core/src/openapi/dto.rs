//! Request/response payloads for the OpenAPI v1 endpoints.
//!
//! Only the fields the bot reads or writes are modelled; unknown fields are
//! ignored on decode.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_openid: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub owner: bool,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub max_members: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub joined_at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub joined_at: String,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub channel_type: i64,
    #[serde(default)]
    pub sub_type: i64,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub owner_id: String,
}

/// Body of create/patch channel calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelValueObject {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub channel_type: i64,
    #[serde(default)]
    pub position: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner_id: String,
    #[serde(default)]
    pub sub_type: i64,
    #[serde(default)]
    pub private_type: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_user_ids: Vec<String>,
}

/// Paging for `GET /users/@me/guilds`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuildPager {
    pub before: Option<String>,
    pub after: Option<String>,
    pub limit: Option<u32>,
}

impl GuildPager {
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(before) = &self.before {
            out.push(("before".to_string(), before.clone()));
        }
        if let Some(after) = &self.after {
            out.push(("after".to_string(), after.clone()));
        }
        if let Some(limit) = self.limit {
            out.push(("limit".to_string(), limit.to_string()));
        }
        out
    }
}

/// Paging for `GET /guilds/{guild_id}/members`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuildMembersPager {
    pub after: Option<String>,
    pub limit: Option<u32>,
}

impl GuildMembersPager {
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(after) = &self.after {
            out.push(("after".to_string(), after.clone()));
        }
        if let Some(limit) = self.limit {
            out.push(("limit".to_string(), limit.to_string()));
        }
        out
    }
}

/// `msg_type` of an outbound message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageKind {
    #[default]
    Text,
    RichMedia,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text => 0,
            MessageKind::RichMedia => 7,
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(MessageKind::Text),
            7 => Ok(MessageKind::RichMedia),
            other => Err(format!("unsupported msg_type {other}")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReference {
    pub message_id: String,
    #[serde(default)]
    pub ignore_get_message_error: bool,
}

/// Uploaded-file reference carried by rich-media messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub file_info: String,
}

/// Outbound message body (`POST .../messages`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToCreate {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub msg_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
    /// Inbound message being answered (passive reply).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    /// Reply sequence for the same `msg_id`; the platform rejects duplicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_seq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Platform answer to a posted message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: serde_json::Value,
}

/// `file_type` values accepted by the rich-media upload endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Image,
    Video,
    Voice,
    File,
}

impl FileType {
    pub fn code(&self) -> u8 {
        match self {
            FileType::Image => 1,
            FileType::Video => 2,
            FileType::Voice => 3,
            FileType::File => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadRequest {
    pub file_type: u8,
    pub url: String,
    pub srv_send_msg: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
}

impl FileUploadRequest {
    pub fn from_url(file_type: FileType, url: impl Into<String>) -> Self {
        Self {
            file_type: file_type.code(),
            url: url.into(),
            srv_send_msg: false,
            file_data: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadResponse {
    #[serde(default)]
    pub file_uuid: String,
    #[serde(default)]
    pub file_info: String,
    #[serde(default)]
    pub ttl: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Interaction data type for inline chat search.
pub const INTERACTION_DATA_TYPE_CHAT_SEARCH: i64 = 9;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchInputResolved {
    #[serde(default)]
    pub keyword: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub cover: String,
    pub title: String,
    pub tips: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLayout {
    #[serde(rename = "layoutType")]
    pub layout_type: i64,
    #[serde(rename = "actionType")]
    pub action_type: i64,
    pub title: String,
    pub records: Vec<SearchRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRsp {
    pub layouts: Vec<SearchLayout>,
}
