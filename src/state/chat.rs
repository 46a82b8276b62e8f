//! Chat transcript driven by streamed replies.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::{Operation, OperationState, StreamSite};
use crate::ollama::{ChatMessage, ChatRequest, GenerateResult, OllamaClient, OllamaError, Role};

/// One message in the transcript, stamped when it was recorded locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            message: ChatMessage::new(role, content),
            timestamp: Utc::now(),
        }
    }
}

/// A chat conversation against one model.
///
/// Turns are kept in insertion order. Each `send` streams the assistant
/// reply through the session's [`StreamSite`], so a newer send stops an
/// older one from delivering further frames.
#[derive(Debug)]
pub struct ChatSession {
    ollama: OllamaClient,
    model: String,
    turns: Mutex<Vec<ChatTurn>>,
    site: StreamSite,
    status: Operation<GenerateResult>,
}

impl ChatSession {
    pub fn new(ollama: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            ollama,
            model: model.into(),
            turns: Mutex::new(Vec::new()),
            site: StreamSite::new(),
            status: Operation::new(),
        }
    }

    /// Session using the client's default model.
    pub fn with_default_model(ollama: OllamaClient) -> Self {
        let model = ollama.default_model().to_string();
        Self::new(ollama, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn lock_turns(&self) -> MutexGuard<'_, Vec<ChatTurn>> {
        self.turns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the transcript.
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.lock_turns().clone()
    }

    pub fn status(&self) -> OperationState<GenerateResult> {
        self.status.state()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<OperationState<GenerateResult>> {
        self.status.subscribe()
    }

    /// Send a user message and stream the reply.
    ///
    /// `on_frame` sees every fragment as it arrives. The assistant turn is
    /// appended whenever the reply came back complete (`done = true`), even
    /// if a newer send started in the meantime. A reply cut short by a newer
    /// send or by [`stop`](Self::stop) returns its partial text with
    /// `done = false` and leaves no assistant turn behind. Only the latest
    /// send settles [`status`](Self::status).
    pub async fn send<F>(&self, content: &str, on_frame: F) -> Result<GenerateResult, OllamaError>
    where
        F: FnMut(&GenerateResult),
    {
        let messages = {
            let mut turns = self.lock_turns();
            turns.push(ChatTurn::new(Role::User, content));
            turns.iter().map(|t| t.message.clone()).collect::<Vec<_>>()
        };

        let ticket = self.site.begin();
        let request = ChatRequest::new(self.model.clone(), messages);
        let result = self
            .status
            .run_if_current(
                self.ollama.chat_stream(request, Some(ticket.token()), on_frame),
                || self.site.is_current(&ticket),
            )
            .await?;

        if result.done {
            self.lock_turns()
                .push(ChatTurn::new(Role::Assistant, result.response.clone()));
        } else {
            tracing::debug!(model = %self.model, chars = result.response.len(), "chat reply cut short");
        }
        Ok(result)
    }

    /// Stop the in-flight reply, if any.
    pub fn stop(&self) {
        self.site.cancel();
    }

    /// Drop the transcript and stop any in-flight reply.
    pub fn clear(&self) {
        self.site.cancel();
        self.lock_turns().clear();
        self.status.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mock_ollama, spawn_mock, unreachable_url};
    use axum::body::Body;
    use axum::routing::post;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn session_for(router: Router) -> ChatSession {
        let base = spawn_mock(router).await;
        ChatSession::new(OllamaClient::new(base, "m").unwrap(), "m")
    }

    /// Emits one frame immediately, then one every 200ms.
    fn slow_chat() -> Router {
        Router::new().route(
            "/api/chat",
            post(|| async {
                let frames = futures::stream::unfold(0u32, |i| async move {
                    if i >= 5 {
                        return None;
                    }
                    if i > 0 {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    let line = format!(
                        "{{\"model\":\"m\",\"message\":{{\"content\":\"t{i} \"}},\"done\":false}}\n"
                    );
                    Some((Ok::<_, std::io::Error>(line), i + 1))
                });
                Body::from_stream(frames)
            }),
        )
    }

    #[tokio::test]
    async fn test_send_appends_user_and_assistant_turns() {
        let session = session_for(mock_ollama(vec!["Hello", ", ", "friend"])).await;
        let mut fragments = Vec::new();
        let result = session
            .send("hi", |f| fragments.push(f.response.clone()))
            .await
            .unwrap();

        assert_eq!(result.response, "Hello, friend");
        assert_eq!(fragments.concat(), "Hello, friend");

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].message.role, Role::User);
        assert_eq!(turns[0].message.content, "hi");
        assert_eq!(turns[1].message.role, Role::Assistant);
        assert_eq!(turns[1].message.content, "Hello, friend");
        assert!(turns[0].timestamp <= turns[1].timestamp);
        assert_eq!(session.status().data().map(|r| r.done), Some(true));
    }

    #[tokio::test]
    async fn test_turns_keep_insertion_order() {
        let session = session_for(mock_ollama(vec!["ok"])).await;
        session.send("one", |_| {}).await.unwrap();
        session.send("two", |_| {}).await.unwrap();
        let contents: Vec<_> = session
            .turns()
            .into_iter()
            .map(|t| t.message.content)
            .collect();
        assert_eq!(contents, vec!["one", "ok", "two", "ok"]);
    }

    #[tokio::test]
    async fn test_failure_settles_error_and_keeps_user_turn() {
        let session = ChatSession::new(OllamaClient::new(unreachable_url().await, "m").unwrap(), "m");
        let err = session.send("hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, OllamaError::Generation(_)));
        assert_eq!(session.turns().len(), 1);
        assert!(session.status().error().is_some());
    }

    #[tokio::test]
    async fn test_stopped_stream_gets_no_more_callbacks() {
        let session = Arc::new(session_for(slow_chat()).await);
        let seen = Arc::new(AtomicUsize::new(0));

        let task = {
            let session = Arc::clone(&session);
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                session
                    .send("hi", move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            })
        };

        for _ in 0..100 {
            if seen.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        session.stop();
        let at_stop = seen.load(Ordering::SeqCst);
        assert!(at_stop >= 1);

        let result = task.await.unwrap().unwrap();
        assert!(!result.done);
        assert!(result.response.starts_with("t0 "));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(seen.load(Ordering::SeqCst), at_stop);
        assert_eq!(session.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_send_leaves_newer_send_in_flight() {
        let session = Arc::new(session_for(slow_chat()).await);
        let first_seen = Arc::new(AtomicUsize::new(0));

        let first = {
            let session = Arc::clone(&session);
            let seen = Arc::clone(&first_seen);
            tokio::spawn(async move {
                session
                    .send("one", move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            })
        };
        for _ in 0..100 {
            if first_seen.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let second = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send("two", |_| {}).await })
        };

        let first_result = first.await.unwrap().unwrap();
        assert!(!first_result.done);
        // The newer send is still streaming and owns the status.
        assert!(session.status().is_loading());

        let second_result = second.await.unwrap().unwrap();
        assert!(second_result.done);
        assert_eq!(second_result.response, "t0 t1 t2 t3 t4 ");
        assert_eq!(session.status().data().map(|r| r.done), Some(true));

        let roles: Vec<_> = session.turns().into_iter().map(|t| t.message.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_complete_reply_kept_when_newer_send_starts_at_the_end() {
        let session = Arc::new(session_for(mock_ollama(vec!["Hello", "!"])).await);
        let cb_session = Arc::clone(&session);

        let result = session
            .send("hi", move |frame| {
                if frame.done {
                    // A newer send takes the surface right as this one finishes.
                    let _ = cb_session.site.begin();
                }
            })
            .await
            .unwrap();

        assert!(result.done);
        assert_eq!(result.response, "Hello!");
        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].message.role, Role::Assistant);
        assert_eq!(turns[1].message.content, "Hello!");
    }

    #[tokio::test]
    async fn test_clear_resets_transcript() {
        let session = session_for(mock_ollama(vec!["ok"])).await;
        session.send("hi", |_| {}).await.unwrap();
        session.clear();
        assert!(session.turns().is_empty());
        assert_eq!(session.status(), OperationState::Idle);
    }
}
