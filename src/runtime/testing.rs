//! Mock implementations for testing
//!
//! These mocks enable integration testing without a real model.

use crate::capability::{Availability, Capability, CapabilityError, Reply};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Capability
// ============================================================================

/// Session handed out by [`MockCapability`]
#[derive(Debug)]
pub struct MockSession {
    pub id: u64,
}

/// Mock capability that returns queued replies
pub struct MockCapability {
    supported: bool,
    availability: Mutex<Availability>,
    replies: Mutex<VecDeque<Result<Reply, CapabilityError>>>,
    session_failures: Mutex<VecDeque<CapabilityError>>,
    delay: Option<Duration>,
    /// Relaxed-safety flag of every session created, in order
    sessions: Mutex<Vec<bool>>,
    /// Record of all respond calls as (session id, prompt)
    calls: Mutex<Vec<(u64, String)>>,
    /// Notified when a respond call starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

#[allow(dead_code)]
impl MockCapability {
    pub fn new() -> Self {
        Self {
            supported: true,
            availability: Mutex::new(Availability::Available),
            replies: Mutex::new(VecDeque::new()),
            session_failures: Mutex::new(VecDeque::new()),
            delay: None,
            sessions: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            request_started: Arc::new(Notify::new()),
        }
    }

    /// A platform that cannot host the model at all
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Sleep this long inside every respond call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_availability(&self, availability: Availability) {
        *self.availability.lock().unwrap() = availability;
    }

    /// Queue a successful reply
    pub fn queue_reply(&self, content: &str) {
        self.replies.lock().unwrap().push_back(Ok(Reply::new(content)));
    }

    /// Queue an error reply
    pub fn queue_error(&self, error: CapabilityError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Make the next `create_session` fail
    pub fn fail_next_session(&self, error: CapabilityError) {
        self.session_failures.lock().unwrap().push_back(error);
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session_flags(&self) -> Vec<bool> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn recorded_calls(&self) -> Vec<(u64, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn recorded_prompts(&self) -> Vec<String> {
        self.recorded_calls().into_iter().map(|(_, p)| p).collect()
    }
}

impl Default for MockCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for MockCapability {
    type Session = MockSession;

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn availability(&self) -> Availability {
        self.availability.lock().unwrap().clone()
    }

    async fn create_session(&self, relaxed_safety: bool) -> Result<MockSession, CapabilityError> {
        if let Some(error) = self.session_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut sessions = self.sessions.lock().unwrap();
        sessions.push(relaxed_safety);
        Ok(MockSession {
            id: sessions.len() as u64,
        })
    }

    async fn respond(
        &self,
        session: &mut MockSession,
        prompt: &str,
    ) -> Result<Reply, CapabilityError> {
        self.calls
            .lock()
            .unwrap()
            .push((session.id, prompt.to_string()));
        self.request_started.notify_waiters();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CapabilityError::unknown("No mock reply queued")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Test Controller Builder
// ============================================================================

use crate::runtime::{spawn, ControllerEvent, ControllerHandle, Snapshot};
use crate::session::SessionManager;
use tokio::sync::broadcast;

/// Helper for building test controllers with minimal boilerplate
pub struct TestController {
    pub handle: ControllerHandle,
    pub events: broadcast::Receiver<ControllerEvent>,
    pub capability: Arc<MockCapability>,
    _join: tokio::task::JoinHandle<()>,
}

impl TestController {
    pub async fn start(capability: MockCapability) -> Self {
        let capability = Arc::new(capability);
        let (handle, events, join) = spawn(SessionManager::new(capability.clone()));
        let controller = Self {
            handle,
            events,
            capability,
            _join: join,
        };
        // The first command is served only after startup completes
        controller.snapshot().await;
        controller
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.handle.snapshot().await.expect("controller stopped")
    }

    /// Wait for an event matching `pred`, skipping others
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        pred: impl Fn(&ControllerEvent) -> bool,
    ) -> Option<ControllerEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.events.recv()).await {
                Ok(Ok(event)) if pred(&event) => return Some(event),
                Ok(Ok(_)) => continue,
                _ => return None,
            }
        }
    }

    /// Wait until the in-flight send completes
    pub async fn wait_for_idle(&mut self) -> bool {
        self.wait_for(Duration::from_secs(5), |e| {
            matches!(e, ControllerEvent::LoadingChanged { loading: false })
        })
        .await
        .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::session::SessionState;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_mock_capability_queue() {
        let cap = MockCapability::new();
        cap.queue_reply("one");
        cap.queue_error(CapabilityError::network("down"));
        let mut session = cap.create_session(true).await.unwrap();

        assert_eq!(cap.respond(&mut session, "a").await.unwrap().content, "one");
        assert!(cap.respond(&mut session, "b").await.is_err());
        assert!(cap.respond(&mut session, "c").await.is_err());
        assert_eq!(cap.recorded_prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_startup_creates_session_when_available() {
        let ctl = TestController::start(MockCapability::new()).await;
        let snap = ctl.snapshot().await;
        assert_eq!(snap.session, SessionState::Ready);
        assert!(snap.error.is_none());
        assert!(!snap.loading);
        assert_eq!(ctl.capability.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_startup_unavailable_sets_error_without_session() {
        let cap = MockCapability::new();
        cap.set_availability(Availability::Unavailable("not downloaded".into()));
        let ctl = TestController::start(cap).await;

        let snap = ctl.snapshot().await;
        assert_eq!(snap.session, SessionState::NoSession);
        assert!(snap.error.unwrap().contains("not available"));
        assert!(snap.messages.is_empty());
        assert_eq!(ctl.capability.sessions_created(), 0);
    }

    #[tokio::test]
    async fn test_simple_exchange() {
        let cap = MockCapability::new();
        cap.queue_reply("hi there");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("hello").await.unwrap();
        assert!(ctl.wait_for_idle().await);

        let snap = ctl.snapshot().await;
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].role, Role::User);
        assert_eq!(snap.messages[0].text, "hello");
        assert_eq!(snap.messages[1].role, Role::Assistant);
        assert_eq!(snap.messages[1].text, "hi there");
        assert_eq!(snap.messages[1].original_prompt.as_deref(), Some("hello"));
        assert!(snap.messages[1].metrics.is_some());
        assert!(!snap.loading);
    }

    #[tokio::test]
    async fn test_user_message_appended_before_reply() {
        let cap = MockCapability::new().with_delay(Duration::from_secs(60));
        cap.queue_reply("slow");
        let ctl = TestController::start(cap).await;

        ctl.handle.submit("hello").await.unwrap();
        let snap = ctl.snapshot().await;
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].role, Role::User);
        assert!(snap.loading);
    }

    #[tokio::test]
    async fn test_blank_submit_is_noop() {
        let ctl = TestController::start(MockCapability::new()).await;

        ctl.handle.submit("   \n ").await.unwrap();
        let snap = ctl.snapshot().await;
        assert!(snap.messages.is_empty());
        assert!(!snap.loading);
        assert!(ctl.capability.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_submit_while_loading_is_rejected() {
        let cap = MockCapability::new().with_delay(Duration::from_millis(200));
        cap.queue_reply("first reply");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("first").await.unwrap();
        ctl.handle.submit("second").await.unwrap();
        let rejected = ctl
            .wait_for(WAIT, |e| matches!(e, ControllerEvent::Rejected { .. }))
            .await;
        assert!(rejected.is_some());
        assert!(ctl.wait_for_idle().await);

        let snap = ctl.snapshot().await;
        let texts: Vec<_> = snap.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "first reply"]);
        assert_eq!(ctl.capability.recorded_prompts(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_unsafe_failure_appends_error_and_reinitializes() {
        let cap = MockCapability::new();
        cap.queue_error(CapabilityError::unknown("Unsafe content detected"));
        cap.queue_reply("all good");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("something edgy").await.unwrap();
        assert!(ctl.wait_for_idle().await);

        let snap = ctl.snapshot().await;
        assert_eq!(snap.session, SessionState::NoSession);
        assert!(snap.error.as_deref().unwrap().contains("Unsafe content detected"));
        let failure = &snap.messages[1];
        assert_eq!(failure.role, Role::Assistant);
        assert!(failure.text.contains("Unsafe content detected"));

        ctl.handle.submit("something tame").await.unwrap();
        assert!(ctl.wait_for_idle().await);

        assert_eq!(ctl.capability.sessions_created(), 2);
        let calls = ctl.capability.recorded_calls();
        assert_ne!(calls[0].0, calls[1].0);
        assert_eq!(ctl.snapshot().await.session, SessionState::Ready);
    }

    #[tokio::test]
    async fn test_regenerate_appends_new_reply() {
        let cap = MockCapability::new();
        cap.queue_reply("first answer");
        cap.queue_reply("second answer");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("explain X").await.unwrap();
        assert!(ctl.wait_for_idle().await);
        let original = ctl.snapshot().await.messages[1].clone();

        ctl.handle.regenerate(original.id).await.unwrap();
        assert!(ctl.wait_for_idle().await);

        let snap = ctl.snapshot().await;
        assert_eq!(snap.messages.len(), 3);
        assert_eq!(snap.messages[1], original);
        assert_eq!(snap.messages[2].text, "second answer");
        assert_eq!(snap.messages[2].original_prompt.as_deref(), Some("explain X"));
        assert_eq!(
            ctl.capability.recorded_prompts(),
            vec!["explain X", "explain X"]
        );
    }

    #[tokio::test]
    async fn test_regenerate_user_message_is_rejected() {
        let cap = MockCapability::new();
        cap.queue_reply("answer");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("question").await.unwrap();
        assert!(ctl.wait_for_idle().await);
        let user = ctl.snapshot().await.messages[0].clone();

        ctl.handle.regenerate(user.id).await.unwrap();
        assert!(ctl
            .wait_for(WAIT, |e| matches!(e, ControllerEvent::Rejected { .. }))
            .await
            .is_some());
        assert_eq!(ctl.snapshot().await.messages.len(), 2);
        assert_eq!(ctl.capability.recorded_prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_regenerate_while_loading_is_rejected() {
        let cap = MockCapability::new().with_delay(Duration::from_millis(200));
        cap.queue_reply("answer");
        cap.queue_reply("second");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("question").await.unwrap();
        assert!(ctl.wait_for_idle().await);

        ctl.handle.submit("follow up").await.unwrap();
        ctl.handle.regenerate_latest().await.unwrap();
        assert!(ctl
            .wait_for(WAIT, |e| matches!(e, ControllerEvent::Rejected { .. }))
            .await
            .is_some());
        assert!(ctl.wait_for_idle().await);
        assert_eq!(
            ctl.capability.recorded_prompts(),
            vec!["question", "follow up"]
        );
    }

    #[tokio::test]
    async fn test_clear_empties_and_resets_session() {
        let cap = MockCapability::new();
        cap.queue_reply("answer");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("question").await.unwrap();
        assert!(ctl.wait_for_idle().await);

        ctl.handle.clear().await.unwrap();
        let snap = ctl.snapshot().await;
        assert!(snap.messages.is_empty());
        assert_eq!(snap.session, SessionState::Ready);
        assert_eq!(ctl.capability.sessions_created(), 2);
    }

    #[tokio::test]
    async fn test_clear_with_failed_reinit_leaves_no_session() {
        let ctl = TestController::start(MockCapability::new()).await;
        ctl.capability
            .set_availability(Availability::Unavailable("disabled".into()));

        ctl.handle.clear().await.unwrap();
        let snap = ctl.snapshot().await;
        assert!(snap.messages.is_empty());
        assert_eq!(snap.session, SessionState::NoSession);
    }

    #[tokio::test]
    async fn test_clear_mid_send_discards_late_reply() {
        let cap = MockCapability::new().with_delay(Duration::from_secs(60));
        cap.queue_reply("never shown");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("long question").await.unwrap();
        ctl.handle.clear().await.unwrap();
        assert!(ctl.wait_for_idle().await);

        let snap = ctl.snapshot().await;
        assert!(snap.messages.is_empty());
        assert!(!snap.loading);
        assert_eq!(snap.session, SessionState::Ready);
        assert_eq!(ctl.capability.sessions_created(), 2);
    }

    #[tokio::test]
    async fn test_input_buffer_cleared_on_submit() {
        let cap = MockCapability::new();
        cap.queue_reply("reply");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.set_input("draft text").await.unwrap();
        assert_eq!(ctl.snapshot().await.input, "draft text");

        ctl.handle.submit_input().await.unwrap();
        assert!(ctl.wait_for_idle().await);

        let snap = ctl.snapshot().await;
        assert_eq!(snap.input, "");
        assert_eq!(snap.messages[0].text, "draft text");
    }

    #[tokio::test]
    async fn test_dismiss_error() {
        let cap = MockCapability::new();
        cap.queue_error(CapabilityError::network("connection reset"));
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("hi").await.unwrap();
        assert!(ctl.wait_for_idle().await);
        assert!(ctl.snapshot().await.error.is_some());
        assert_eq!(ctl.snapshot().await.session, SessionState::Ready);

        ctl.handle.dismiss_error().await.unwrap();
        assert!(ctl
            .wait_for(WAIT, |e| matches!(e, ControllerEvent::ErrorDismissed))
            .await
            .is_some());
        let snap = ctl.snapshot().await;
        assert!(snap.error.is_none());
        // The inline transcript entry stays
        assert!(snap.messages[1].text.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_events_follow_submission_order() {
        let cap = MockCapability::new();
        cap.queue_reply("pong");
        let mut ctl = TestController::start(cap).await;

        ctl.handle.submit("ping").await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = ctl.wait_for(WAIT, |_| true).await {
            let done = matches!(event, ControllerEvent::LoadingChanged { loading: false });
            seen.push(event);
            if done {
                break;
            }
        }

        let kinds: Vec<_> = seen
            .iter()
            .map(|e| match e {
                ControllerEvent::MessageAppended { message } => match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                ControllerEvent::LoadingChanged { loading: true } => "loading",
                ControllerEvent::LoadingChanged { loading: false } => "done",
                _ => "other",
            })
            .filter(|k| *k != "other")
            .collect();
        assert_eq!(kinds, vec!["user", "loading", "assistant", "done"]);
    }

    /// Collect every event until the controller stops
    async fn drain(mut events: broadcast::Receiver<ControllerEvent>) -> Vec<ControllerEvent> {
        let mut seen = Vec::new();
        loop {
            match events.recv().await {
                Ok(event) => seen.push(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return seen,
            }
        }
    }

    #[tokio::test]
    async fn test_reply_delivered_after_last_handle_dropped() {
        let cap = Arc::new(MockCapability::new().with_delay(Duration::from_millis(50)));
        cap.queue_reply("piped answer");
        let (handle, events, join) = spawn(SessionManager::new(cap.clone()));

        handle.submit("piped question").await.unwrap();
        drop(handle);

        let seen = tokio::time::timeout(WAIT, drain(events)).await.unwrap();
        tokio::time::timeout(WAIT, join).await.unwrap().unwrap();

        let replies: Vec<_> = seen
            .iter()
            .filter_map(|e| match e {
                ControllerEvent::MessageAppended { message } if message.role == Role::Assistant => {
                    Some(message.text.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(replies, vec!["piped answer"]);
        assert_eq!(cap.recorded_prompts(), vec!["piped question"]);
        assert_eq!(
            seen.last(),
            Some(&ControllerEvent::LoadingChanged { loading: false })
        );
    }

    #[tokio::test]
    async fn test_idle_controller_stops_when_handles_dropped() {
        let cap = Arc::new(MockCapability::new());
        let (handle, events, join) = spawn(SessionManager::new(cap.clone()));
        drop(handle);

        tokio::time::timeout(WAIT, join).await.unwrap().unwrap();
        let seen = drain(events).await;
        assert!(!seen
            .iter()
            .any(|e| matches!(e, ControllerEvent::MessageAppended { .. })));
        assert!(cap.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_startup_error_reaches_spawn_receiver_once() {
        let cap = MockCapability::new();
        cap.set_availability(Availability::Unavailable("not downloaded".into()));
        let (handle, events, join) = spawn(SessionManager::new(Arc::new(cap)));

        assert!(handle.snapshot().await.unwrap().error.is_some());
        drop(handle);
        tokio::time::timeout(WAIT, join).await.unwrap().unwrap();

        let errors: Vec<_> = drain(events)
            .await
            .into_iter()
            .filter(|e| matches!(e, ControllerEvent::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            ControllerEvent::Error { message } => assert!(message.contains("not available")),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let json = serde_json::to_value(ControllerEvent::LoadingChanged { loading: true }).unwrap();
        assert_eq!(json["type"], "loading_changed");
        assert_eq!(json["loading"], true);

        let json = serde_json::to_value(ControllerEvent::SessionChanged {
            state: SessionState::NoSession,
        })
        .unwrap();
        assert_eq!(json["state"], "no_session");
    }
}
