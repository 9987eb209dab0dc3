//! Drives a [`Conversation`] against a real completion client.
//!
//! At most one model call is in flight. The call runs in its own tokio task
//! so the UI keeps redrawing while it waits; [`ChatSession::poll`] picks the
//! result up once the task has finished.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ai::CompletionClient;
use crate::conversation::{Conversation, Snapshot, SubmitOutcome};
use crate::error::CompletionError;

type CompletionTask = JoinHandle<Result<Option<String>, CompletionError>>;

/// The client plus the model it is asked for
#[derive(Clone)]
pub struct Backend {
    pub client: Arc<dyn CompletionClient>,
    pub model: String,
}

impl Backend {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

pub struct ChatSession {
    conversation: Conversation,
    backend: Option<Backend>,
    in_flight: Option<CompletionTask>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl ChatSession {
    /// `backend` may be `None` for the scripted variant; a dispatch without
    /// one fails the turn instead of panicking.
    pub fn new(conversation: Conversation, backend: Option<Backend>) -> Self {
        let (snapshot_tx, _) = watch::channel(conversation.snapshot());
        Self {
            conversation,
            backend,
            in_flight: None,
            snapshot_tx,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.conversation.snapshot()
    }

    /// Receives a fresh snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.conversation.is_busy()
    }

    /// Submit user text; spawns the model call when the conversation asks for one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, text: impl Into<String>) -> SubmitOutcome {
        let outcome = self.conversation.submit(text);

        if let SubmitOutcome::Dispatched(prompt) = &outcome {
            match &self.backend {
                Some(backend) => {
                    let client = Arc::clone(&backend.client);
                    let model = backend.model.clone();
                    let prompt = prompt.clone();
                    debug!(provider = %client.provider(), model = %model, "spawning completion task");
                    self.in_flight = Some(tokio::spawn(async move {
                        client.complete(&model, &prompt).await
                    }));
                }
                None => {
                    self.conversation.settle(Err(CompletionError::NoClient));
                }
            }
        }

        if outcome.accepted() {
            self.publish();
        }
        outcome
    }

    /// Settle the conversation if the outstanding call has finished.
    ///
    /// Returns true when the conversation changed.
    pub async fn poll(&mut self) -> bool {
        let finished = self
            .in_flight
            .as_ref()
            .is_some_and(|task| task.is_finished());

        if finished {
            self.settle().await
        } else {
            false
        }
    }

    /// Wait for the outstanding call, if any, and apply its result
    pub async fn settle(&mut self) -> bool {
        let Some(task) = self.in_flight.take() else {
            return false;
        };

        let result = match task.await {
            Ok(result) => result,
            Err(join_error) => {
                warn!(error = %join_error, "completion task did not finish");
                Err(CompletionError::TaskAborted(join_error.to_string()))
            }
        };

        let changed = self.conversation.settle(result);
        if changed {
            self.publish();
        }
        changed
    }

    /// One full turn: submit and wait for the reply
    pub async fn send(&mut self, text: impl Into<String>) -> SubmitOutcome {
        let outcome = self.submit(text);
        if matches!(outcome, SubmitOutcome::Dispatched(_)) {
            self.settle().await;
        }
        outcome
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.conversation.snapshot());
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            debug!("aborting outstanding completion task");
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ChatMode, Script, SessionState};
    use crate::provider::Provider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Replies with a fixed result and counts calls
    struct MockClient {
        reply: Result<Option<String>, u16>,
        calls: AtomicUsize,
        prompts: std::sync::Mutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockClient {
        fn replying(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.map(str::to_string)),
                calls: AtomicUsize::new(0),
                prompts: std::sync::Mutex::new(Vec::new()),
                gate: None,
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(status),
                calls: AtomicUsize::new(0),
                prompts: std::sync::Mutex::new(Vec::new()),
                gate: None,
            })
        }

        /// Blocks until the returned notify fires
        fn held(reply: &str) -> (Arc<Self>, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            let client = Arc::new(Self {
                reply: Ok(Some(reply.to_string())),
                calls: AtomicUsize::new(0),
                prompts: std::sync::Mutex::new(Vec::new()),
                gate: Some(Arc::clone(&gate)),
            });
            (client, gate)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for MockClient {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn complete(&self, _model: &str, prompt: &str) -> Result<Option<String>, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(CompletionError::Api {
                    provider: "mock",
                    status: *status,
                    body: "boom".to_string(),
                }),
            }
        }
    }

    fn mock_session(mode: ChatMode, client: Arc<MockClient>) -> ChatSession {
        ChatSession::new(
            Conversation::new(mode),
            Some(Backend::new(client, "test-model")),
        )
    }

    #[tokio::test]
    async fn test_send_replaces_placeholder_with_reply() {
        let client = MockClient::replying(Some("hello back"));
        let mut session = mock_session(ChatMode::Open, client.clone());

        let outcome = session.send("hi").await;

        assert!(matches!(outcome, SubmitOutcome::Dispatched(_)));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.user_messages, vec!["hi".to_string()]);
        assert_eq!(snapshot.bot_messages.last(), Some(&"hello back".to_string()));
        assert_eq!(snapshot.bot_messages.len(), 2);
        assert_eq!(snapshot.state, SessionState::Ready);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_carries_instruction_prefix() {
        let client = MockClient::replying(Some("ok"));
        let mut session = mock_session(ChatMode::Open, client.clone());

        session.send("wat is de hoofdstad?").await;

        let prompts = client.prompts.lock().unwrap().clone();
        assert_eq!(
            prompts,
            vec![format!("{}wat is de hoofdstad?", Script::default().instruction)]
        );
    }

    #[tokio::test]
    async fn test_empty_reply_falls_back() {
        let client = MockClient::replying(None);
        let mut session = mock_session(ChatMode::Open, client);

        session.send("hi").await;

        assert_eq!(
            session.snapshot().bot_messages.last(),
            Some(&Script::default().empty_fallback)
        );
    }

    #[tokio::test]
    async fn test_failure_is_visible_and_recoverable() {
        let client = MockClient::failing(500);
        let mut session = mock_session(ChatMode::Open, client.clone());

        session.send("hi").await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Failed);
        assert!(snapshot.last_error.as_deref().unwrap_or_default().contains("500"));

        session.send("again").await;
        assert_eq!(client.calls(), 2);
        assert_eq!(session.snapshot().user_messages.len(), 2);
    }

    #[tokio::test]
    async fn test_gate_blocks_model_until_unlocked() {
        let client = MockClient::replying(Some("antwoord"));
        let mode = ChatMode::Gated {
            secret: "OPEN".to_string(),
        };
        let mut session = mock_session(mode, client.clone());

        assert_eq!(session.send("wrong").await, SubmitOutcome::AccessDenied);
        assert_eq!(session.send("OPEN").await, SubmitOutcome::AccessGranted);
        assert_eq!(client.calls(), 0);

        session.send("vraag").await;
        assert_eq!(client.calls(), 1);
        assert_eq!(session.snapshot().bot_messages.last(), Some(&"antwoord".to_string()));
    }

    #[tokio::test]
    async fn test_busy_session_ignores_submits() {
        let (client, gate) = MockClient::held("done");
        let mut session = mock_session(ChatMode::Open, client.clone());

        assert!(matches!(session.submit("first"), SubmitOutcome::Dispatched(_)));
        let while_busy = session.snapshot();
        assert_eq!(while_busy.bot_messages.last(), Some(&Script::default().placeholder));

        assert_eq!(session.submit("second"), SubmitOutcome::Ignored);
        assert_eq!(session.snapshot(), while_busy);
        assert!(!session.poll().await);

        gate.notify_one();
        session.settle().await;

        assert_eq!(client.calls(), 1);
        assert_eq!(session.snapshot().user_messages, vec!["first".to_string()]);
        assert_eq!(session.snapshot().bot_messages.last(), Some(&"done".to_string()));
    }

    #[tokio::test]
    async fn test_poll_settles_finished_task() {
        let client = MockClient::replying(Some("klaar"));
        let mut session = mock_session(ChatMode::Open, client);

        session.submit("hi");
        while !session.poll().await {
            tokio::task::yield_now().await;
        }

        assert_eq!(session.snapshot().state, SessionState::Ready);
        assert!(!session.poll().await);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let client = MockClient::replying(Some("hallo"));
        let mut session = mock_session(ChatMode::Open, client);
        let mut rx = session.subscribe();

        session.send("hi").await;

        assert!(rx.has_changed().expect("sender alive"));
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.bot_messages.last(), Some(&"hallo".to_string()));
    }

    #[tokio::test]
    async fn test_scripted_session_needs_no_backend() {
        let mut session = ChatSession::new(Conversation::new(ChatMode::Scripted), None);

        assert_eq!(session.send("hoi").await, SubmitOutcome::Scripted);
        assert_eq!(
            session.snapshot().bot_messages.last(),
            Some(&Script::default().scripted_reply)
        );
    }

    #[tokio::test]
    async fn test_dispatch_without_backend_fails_turn() {
        let mut session = ChatSession::new(Conversation::new(ChatMode::Open), None);

        session.send("hi").await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Failed);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_drop_aborts_outstanding_call() {
        let (client, _gate) = MockClient::held("never");
        let mut session = mock_session(ChatMode::Open, client.clone());

        session.submit("hi");
        tokio::task::yield_now().await;
        drop(session);
        tokio::task::yield_now().await;

        // Only the mock's own handle is left once the aborted task is gone.
        for _ in 0..10 {
            if Arc::strong_count(&client) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(Arc::strong_count(&client), 1);
    }
}
