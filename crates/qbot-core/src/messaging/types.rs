use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, ConversationKind, GroupId, UserId};

/// One inbound event, already unwrapped from the transport envelope.
///
/// Immutable once received; lives for one dispatch cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub kind: ConversationKind,
    /// Raw text, mention markup included.
    #[serde(default)]
    pub text: String,
    /// Group openid, user openid or channel id depending on `kind`.
    pub conversation_id: String,
    /// Id of the inbound message; replies reference it.
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub interaction: Option<InteractionData>,
}

impl InboundEvent {
    pub fn group(
        group_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::message(ConversationKind::Group, group_id, message_id, text)
    }

    pub fn direct(
        user_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut ev = Self::message(ConversationKind::Direct, user_id, message_id, text);
        ev.author_id = Some(ev.conversation_id.clone());
        ev
    }

    pub fn guild(
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::message(ConversationKind::Guild, channel_id, message_id, text)
    }

    fn message(
        kind: ConversationKind,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            conversation_id: conversation_id.into(),
            message_id: Some(message_id.into()),
            author_id: None,
            interaction: None,
        }
    }

    pub fn group_id(&self) -> GroupId {
        GroupId(self.conversation_id.clone())
    }

    pub fn channel_id(&self) -> ChannelId {
        ChannelId(self.conversation_id.clone())
    }

    /// C2C replies go to the author when known, else to the conversation id.
    pub fn user_id(&self) -> UserId {
        UserId(
            self.author_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| self.conversation_id.clone()),
        )
    }
}

/// Payload of an interaction callback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionData {
    pub id: String,
    pub data_type: i64,
    /// Type-specific payload, decoded by the processor.
    #[serde(default)]
    pub resolved: serde_json::Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendEventKind {
    Add,
    Delete,
}

/// C2C friend relation change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEvent {
    pub kind: FriendEventKind,
    pub openid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_minimal_group_event() {
        let ev: InboundEvent = serde_json::from_str(
            r#"{"kind":"group","text":"<@!1> /hello","conversation_id":"g1","message_id":"m1"}"#,
        )
        .unwrap();
        assert_eq!(ev.kind, ConversationKind::Group);
        assert_eq!(ev.group_id(), GroupId("g1".to_string()));
        assert!(ev.interaction.is_none());
    }

    #[test]
    fn direct_user_falls_back_to_conversation() {
        let mut ev = InboundEvent::direct("u1", "m1", "hi");
        assert_eq!(ev.user_id(), UserId("u1".to_string()));

        ev.author_id = Some(String::new());
        assert_eq!(ev.user_id(), UserId("u1".to_string()));
    }
}
