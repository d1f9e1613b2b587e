use serde::{Deserialize, Serialize};

/// Open id of a user (C2C conversations, friend events).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Open id of a group conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

/// Guild (频道) id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuildId(pub String);

/// Sub-channel (子频道) id inside a guild.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

/// Which kind of conversation an inbound event came from.
///
/// The kind decides both the reply endpoint and the upload endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Group @bot message.
    Group,
    /// C2C (single chat) message.
    Direct,
    /// Guild sub-channel @bot message.
    Guild,
    /// Interaction callback (inline search etc).
    Interaction,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Group => "group",
            ConversationKind::Direct => "direct",
            ConversationKind::Guild => "guild",
            ConversationKind::Interaction => "interaction",
        }
    }
}
