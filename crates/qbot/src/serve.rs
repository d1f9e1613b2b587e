//! Reads decoded platform events as JSON lines and processes each on its own task.

use std::sync::Arc;

use qbot_core::{
    messaging::types::{FriendEvent, InboundEvent},
    processor::MessageProcessor,
};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One input line: `{"event": "message", ...}` or `{"event": "friend", ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Envelope {
    Message(InboundEvent),
    Friend(FriendEvent),
}

/// Runs until EOF or cancellation, then waits for in-flight events.
pub async fn run<R>(
    processor: Arc<MessageProcessor>,
    reader: R,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut tasks = JoinSet::new();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "skipping malformed event line");
                continue;
            }
        };

        let processor = processor.clone();
        tasks.spawn(async move {
            match envelope {
                Envelope::Message(event) => {
                    let outcome = processor.process(&event).await;
                    debug!(?outcome, kind = event.kind.as_str(), "event processed");
                }
                Envelope::Friend(event) => {
                    if let Err(e) = processor.process_friend(&event).await {
                        warn!(error = %e, openid = %event.openid, "friend event failed");
                    }
                }
            }
        });

        // Reap finished tasks so the set does not grow with uptime.
        while tasks.try_join_next().is_some() {}
    }

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "event task panicked");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use qbot_core::{
        commands::{hello, GREETING},
        domain::{ConversationKind, GroupId, UserId},
        limiter::RateLimiter,
        messaging::types::FriendEventKind,
        openapi::{
            dto::{Message, MessageToCreate},
            ApiError, ApiResponse, ApiResult, ApiVersion, OpenApi,
        },
        router::CommandRouter,
    };
    use reqwest::Method;

    use super::*;

    #[derive(Default)]
    struct RecordingApi {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl OpenApi for RecordingApi {
        fn version(&self) -> ApiVersion {
            ApiVersion::V1
        }

        fn last_trace_id(&self) -> Option<String> {
            None
        }

        async fn request(
            &self,
            _method: Method,
            _path: &str,
            _body: Option<&serde_json::Value>,
        ) -> ApiResult<ApiResponse> {
            Err(ApiError::Unsupported("request"))
        }

        async fn post_group_message(
            &self,
            group_id: &GroupId,
            msg: &MessageToCreate,
        ) -> ApiResult<Message> {
            self.sent.lock().unwrap().push((group_id.0.clone(), msg.content.clone()));
            Ok(Message::default())
        }

        async fn post_c2c_message(
            &self,
            user_id: &UserId,
            msg: &MessageToCreate,
        ) -> ApiResult<Message> {
            self.sent.lock().unwrap().push((user_id.0.clone(), msg.content.clone()));
            Ok(Message::default())
        }
    }

    fn processor(api: Arc<RecordingApi>) -> Arc<MessageProcessor> {
        Arc::new(MessageProcessor::new(
            api,
            CommandRouter::new().command("/hello", hello),
            Arc::new(RateLimiter::new(Duration::from_secs(1))),
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn parses_envelopes() {
        let line = concat!(
            r#"{"event":"message","kind":"direct","text":"/hello","#,
            r#""conversation_id":"u1","message_id":"m1"}"#,
        );
        let msg: Envelope = serde_json::from_str(line).unwrap();
        assert!(matches!(msg, Envelope::Message(ev) if ev.kind == ConversationKind::Direct));

        let friend: Envelope =
            serde_json::from_str(r#"{"event":"friend","kind":"add","openid":"O1"}"#).unwrap();
        assert!(matches!(friend, Envelope::Friend(ev) if ev.kind == FriendEventKind::Add));
    }

    #[tokio::test]
    async fn processes_lines_until_eof_and_skips_garbage() {
        let api = Arc::new(RecordingApi::default());
        let input = concat!(
            r#"{"event":"message","kind":"group","text":"<@!1> /hello","#,
            r#""conversation_id":"g1","message_id":"m1"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"event":"friend","kind":"add","openid":"O1"}"#,
            "\n",
        );

        run(processor(api.clone()), input.as_bytes(), CancellationToken::new())
            .await
            .unwrap();

        let mut sent = api.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                ("O1".to_string(), "ID为 O1 的用户添加机器人为好友".to_string()),
                ("g1".to_string(), GREETING.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_reads_nothing() {
        let api = Arc::new(RecordingApi::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let input = r#"{"event":"friend","kind":"add","openid":"O1"}"#;
        run(processor(api.clone()), input.as_bytes(), cancel).await.unwrap();
        assert!(api.sent.lock().unwrap().is_empty());
    }
}
