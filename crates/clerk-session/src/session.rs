//! One autofill run: the worker task plus the boundary-facing method surface.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clerk_core::{
    Drained, EventChannel, EventKind, Gate, ProgressEvent, SessionControl, SessionError, SessionId,
    SessionState, Transition, Worker, events::DEFAULT_IDLE_TIMEOUT,
};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which the event stream yields a keep-alive.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// A question put to the human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub field_context: String,
}

/// An action requested from the remote browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: String,
    pub payload: Value,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    pub pending_question: Option<String>,
    pub field_context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One autofill run.
///
/// Worker-side calls go through [`SessionControl`] and block on one of three
/// gates; boundary-side calls never block.
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    events: Arc<EventChannel>,
    cancel: CancellationToken,
    scan: Gate<(), Value>,
    action: Gate<ActionRequest, Value>,
    question: Gate<Question, String>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Create an idle session.
    #[must_use]
    pub fn new(id: SessionId, config: &SessionConfig) -> Self {
        let cancel = CancellationToken::new();
        Self {
            id,
            created_at: Utc::now(),
            state: Mutex::new(SessionState::Idle),
            events: Arc::new(EventChannel::with_idle_timeout(config.idle_timeout)),
            scan: Gate::new("scan", cancel.clone()),
            action: Gate::new("action", cancel.clone()),
            question: Gate::new("question", cancel.clone()),
            cancel,
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Point-in-time view including the outstanding question, if any.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        let pending = self.question.pending();
        SessionSnapshot {
            session_id: self.id.clone(),
            state,
            pending_question: pending.as_ref().map(|q| q.question.clone()),
            field_context: pending.map(|q| q.field_context),
            created_at: self.created_at,
        }
    }

    fn push(&self, state: SessionState, kind: EventKind, message: impl Into<String>, extra: Value) {
        self.events
            .push(ProgressEvent::new(kind, message, state).with_extra(extra));
    }

    /// Start the worker.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidState`] unless the session is idle.
    pub fn start(self: &Arc<Self>, worker: Arc<dyn Worker>) -> Result<(), SessionError> {
        {
            let mut state = lock(&self.state);
            *state = state.apply(Transition::Start)?;
            self.push(*state, EventKind::Started, "Agent is starting...", Value::Null);
        }
        tracing::info!(session_id = %self.id, "session started");

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move { session.run_worker(worker).await });
        *lock(&self.worker) = Some(handle);
        Ok(())
    }

    async fn run_worker(self: Arc<Self>, worker: Arc<dyn Worker>) {
        self.report("Agent starting...");

        // Nested task so a panicking worker still ends in a terminal state.
        let control: Arc<dyn SessionControl> = Arc::clone(&self) as Arc<dyn SessionControl>;
        let outcome = tokio::spawn(async move { worker.run(control).await }).await;

        match outcome {
            Ok(Ok(summary)) => {
                tracing::info!(session_id = %self.id, summary_len = summary.len(), "worker finished");
                self.finish(Transition::FinishOk, EventKind::Done, "Form filling complete!");
            }
            Ok(Err(err)) if err.is_stopped() => {
                tracing::info!(session_id = %self.id, "worker observed stop");
                self.finish(Transition::Stop, EventKind::Stopped, "Session stopped.");
            }
            Ok(Err(err)) => {
                tracing::error!(session_id = %self.id, error = %err, "worker failed");
                self.finish(Transition::FinishError, EventKind::Error, format!("Agent error: {err}"));
            }
            Err(err) => {
                tracing::error!(session_id = %self.id, error = %err, "worker panicked");
                self.finish(Transition::FinishError, EventKind::Error, format!("Agent error: {err}"));
            }
        }
    }

    fn finish(&self, transition: Transition, kind: EventKind, message: impl Into<String>) {
        let mut state = lock(&self.state);
        if state.is_terminal() {
            tracing::debug!(session_id = %self.id, state = %*state, "already terminal");
            return;
        }
        match state.apply(transition) {
            Ok(next) => {
                *state = next;
                self.push(next, kind, message, Value::Null);
            }
            Err(err) => {
                // Only reachable if the worker abandoned a pending question.
                tracing::warn!(session_id = %self.id, error = %err, "forcing error state");
                *state = SessionState::Error;
                self.push(*state, EventKind::Error, format!("Agent error: {err}"), Value::Null);
            }
        }
    }

    /// Open `gate`, announce the request, and wait for its reply.
    ///
    /// The announcement happens under the state lock so no request event can
    /// follow a terminal event.
    async fn rendezvous<Q, R>(
        &self,
        gate: &Gate<Q, R>,
        request: Q,
        transition: Option<Transition>,
        event: (EventKind, String, Value),
    ) -> Result<R, SessionError> {
        let waiter = gate.open(request);
        {
            let mut state = lock(&self.state);
            if state.is_terminal() {
                return Err(SessionError::Stopped);
            }
            if let Some(transition) = transition {
                *state = state.apply(transition)?;
            }
            let (kind, message, extra) = event;
            self.push(*state, kind, message, extra);
        }
        tracing::debug!(session_id = %self.id, gate = gate.name(), "waiting for reply");
        waiter
            .wait()
            .await
            .map_err(|err| SessionError::from_gate(gate.name(), err))
    }

    /// Block until the boundary supplies the page model.
    ///
    /// # Errors
    /// Returns [`SessionError::Stopped`] if the session stops first.
    pub async fn request_page_scan(&self) -> Result<Value, SessionError> {
        let event = (EventKind::ScanRequest, "Scanning page...".to_string(), Value::Null);
        self.rendezvous(&self.scan, (), None, event).await
    }

    /// Supply the page model. Accepted in any state; returns whether a scan
    /// was waiting for it.
    pub fn provide_page_data(&self, data: Value) -> bool {
        self.scan.reply(data)
    }

    /// Block until the boundary reports the result of `kind`.
    ///
    /// Lifecycle event names (`done`, `stopped`, `scan_request`, ...) cannot
    /// be used as action kinds.
    ///
    /// # Errors
    /// Returns [`SessionError::ReservedAction`] for a lifecycle name and
    /// [`SessionError::Stopped`] if the session stops first.
    pub async fn request_action(&self, kind: &str, payload: Value) -> Result<Value, SessionError> {
        let event_kind = EventKind::from(kind);
        if !matches!(event_kind, EventKind::Action(_)) {
            return Err(SessionError::ReservedAction(kind.to_string()));
        }
        let request = ActionRequest {
            kind: kind.to_string(),
            payload: payload.clone(),
        };
        let event = (event_kind, format!("Executing {kind}..."), payload);
        self.rendezvous(&self.action, request, None, event).await
    }

    /// Supply an action result. Returns whether an action was waiting for it.
    pub fn provide_action_result(&self, result: Value) -> bool {
        self.action.reply(result)
    }

    /// Block until the human answers `question`.
    ///
    /// # Errors
    /// Returns [`SessionError::Stopped`] if the session stops first.
    pub async fn request_human_answer(
        &self,
        question: &str,
        field_context: &str,
    ) -> Result<String, SessionError> {
        let request = Question {
            question: question.to_string(),
            field_context: field_context.to_string(),
        };
        let event = (
            EventKind::AskHuman,
            question.to_string(),
            json!({ "question": question, "field_context": field_context }),
        );
        let answer = self
            .rendezvous(&self.question, request, Some(Transition::AskHuman), event)
            .await?;

        let mut state = lock(&self.state);
        if state.is_terminal() {
            return Err(SessionError::Stopped);
        }
        if *state == SessionState::WaitingForHuman {
            *state = state.apply(Transition::AnswerReceived)?;
        }
        self.push(*state, EventKind::Resumed, "Got answer, continuing...", Value::Null);
        Ok(answer)
    }

    /// Supply the human's answer.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidState`] unless a question is waiting.
    pub fn provide_answer(&self, answer: impl Into<String>) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        *state = state.apply(Transition::AnswerReceived)?;
        if !self.question.reply(answer.into()) {
            tracing::warn!(session_id = %self.id, "answer arrived with no waiting question");
        }
        Ok(())
    }

    /// Stop the session and wake every gate.
    ///
    /// Idempotent; returns `true` only for the call that stopped it.
    pub fn stop(&self) -> bool {
        let mut state = lock(&self.state);
        if state.is_terminal() {
            return false;
        }
        let Ok(next) = state.apply(Transition::Stop) else {
            return false;
        };
        *state = next;
        self.cancel.cancel();
        self.push(next, EventKind::Stopped, "Session stopped by user.", Value::Null);
        tracing::info!(session_id = %self.id, "session stopped");
        true
    }

    /// Future events, ending after the first terminal event.
    #[must_use]
    pub fn event_stream(&self) -> BoxStream<'static, Drained> {
        self.events.stream()
    }

    /// Wait for the worker task to end, if one was started.
    pub async fn join(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(session_id = %self.id, error = %err, "worker task failed");
            }
        }
    }
}

#[async_trait]
impl SessionControl for Session {
    async fn scan_page(&self) -> Result<Value, SessionError> {
        self.request_page_scan().await
    }

    async fn execute_action(&self, kind: &str, payload: Value) -> Result<Value, SessionError> {
        self.request_action(kind, payload).await
    }

    async fn ask_human(&self, question: &str, field_context: &str) -> Result<String, SessionError> {
        self.request_human_answer(question, field_context).await
    }

    fn report(&self, message: &str) {
        let state = lock(&self.state);
        if !state.is_terminal() {
            self.push(*state, EventKind::Running, message, Value::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clerk_core::WorkerError;
    use futures::{StreamExt, future::BoxFuture};
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    type Script =
        dyn Fn(Arc<dyn SessionControl>) -> BoxFuture<'static, Result<String, WorkerError>> + Send + Sync;

    /// Worker that runs a test-provided script.
    struct ScriptWorker(Box<Script>);

    #[async_trait]
    impl Worker for ScriptWorker {
        async fn run(&self, control: Arc<dyn SessionControl>) -> Result<String, WorkerError> {
            (self.0)(control).await
        }
    }

    fn worker<F>(script: F) -> Arc<dyn Worker>
    where
        F: Fn(Arc<dyn SessionControl>) -> BoxFuture<'static, Result<String, WorkerError>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(ScriptWorker(Box::new(script)))
    }

    fn session() -> Arc<Session> {
        Arc::new(Session::new("s1".to_string(), &SessionConfig::default()))
    }

    async fn next_event(stream: &mut BoxStream<'static, Drained>) -> ProgressEvent {
        loop {
            let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("no event within 5s")
                .expect("stream closed");
            if let Drained::Event(event) = item {
                return event;
            }
        }
    }

    async fn wait_for(stream: &mut BoxStream<'static, Drained>, kind: EventKind) -> ProgressEvent {
        loop {
            let event = next_event(stream).await;
            if event.kind == kind {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_scan_then_human_answer_then_done() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let session = session();
        let mut stream = session.event_stream();

        session
            .start(worker(move |control| {
                let tx = tx.clone();
                Box::pin(async move {
                    let page = control.scan_page().await?;
                    tx.send(page).ok();
                    let answer = control.ask_human("salary?", "f0").await?;
                    tx.send(json!(answer)).ok();
                    Ok("done".to_string())
                })
            }))
            .unwrap();

        assert_eq!(next_event(&mut stream).await.kind, EventKind::Started);
        wait_for(&mut stream, EventKind::ScanRequest).await;
        let page = json!({ "fields": [{ "ref": "f0" }] });
        assert!(session.provide_page_data(page.clone()));
        assert_eq!(rx.recv().await, Some(page));

        let ask = wait_for(&mut stream, EventKind::AskHuman).await;
        assert_eq!(ask.state, SessionState::WaitingForHuman);
        assert_eq!(ask.extra.get("field_context"), Some(&json!("f0")));
        assert_eq!(session.state(), SessionState::WaitingForHuman);
        assert_eq!(session.snapshot().pending_question.as_deref(), Some("salary?"));

        session.provide_answer("90000").unwrap();
        assert_eq!(rx.recv().await, Some(json!("90000")));

        let resumed = next_event(&mut stream).await;
        assert_eq!(resumed.kind, EventKind::Resumed);
        assert_eq!(resumed.state, SessionState::Running);

        let last = wait_for(&mut stream, EventKind::Done).await;
        assert_eq!(last.state, SessionState::Done);
        assert!(stream.next().await.is_none());
        session.join().await;
        assert_eq!(session.state(), SessionState::Done);
    }

    #[tokio::test]
    async fn test_gates_do_not_cross_talk() {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Value)>();
        let session = session();
        let mut stream = session.event_stream();

        session
            .start(worker(move |control| {
                let tx = tx.clone();
                Box::pin(async move {
                    for i in 0..3 {
                        let page = control.scan_page().await?;
                        tx.send(("scan".into(), page)).ok();
                        let result = control
                            .execute_action("fill_field", json!({ "ref": format!("f{i}"), "value": "x" }))
                            .await?;
                        tx.send(("action".into(), result)).ok();
                    }
                    Ok(String::new())
                })
            }))
            .unwrap();

        for i in 0..3 {
            wait_for(&mut stream, EventKind::ScanRequest).await;
            // Action replies while a scan is pending go nowhere.
            assert!(!session.provide_action_result(json!({ "stray": i })));
            assert!(session.provide_page_data(json!({ "page": i })));
            assert_eq!(rx.recv().await, Some(("scan".into(), json!({ "page": i }))));

            let event = wait_for(&mut stream, EventKind::Action("fill_field".into())).await;
            assert_eq!(event.extra.get("ref"), Some(&json!(format!("f{i}"))));
            assert!(session.provide_action_result(json!({ "ok": i })));
            assert_eq!(rx.recv().await, Some(("action".into(), json!({ "ok": i }))));
        }

        wait_for(&mut stream, EventKind::Done).await;
    }

    #[tokio::test]
    async fn test_answer_without_question_is_rejected() {
        let session = session();
        let mut stream = session.event_stream();
        session
            .start(worker(|control| {
                Box::pin(async move {
                    control.scan_page().await?;
                    Ok(String::new())
                })
            }))
            .unwrap();
        wait_for(&mut stream, EventKind::ScanRequest).await;

        let err = session.provide_answer("90000").unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidState {
                action: "provide answer",
                state: SessionState::Running,
            }
        );
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
    }

    #[tokio::test]
    async fn test_stop_during_scan() {
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionError>();
        let session = session();
        let mut stream = session.event_stream();
        session
            .start(worker(move |control| {
                let tx = tx.clone();
                Box::pin(async move {
                    let err = control.scan_page().await.unwrap_err();
                    tx.send(err.clone()).ok();
                    Err(err.into())
                })
            }))
            .unwrap();
        wait_for(&mut stream, EventKind::ScanRequest).await;

        assert!(session.stop());
        assert!(!session.stop());
        let err = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("scan not cancelled");
        assert_eq!(err, Some(SessionError::Stopped));

        let last = next_event(&mut stream).await;
        assert_eq!(last.kind, EventKind::Stopped);
        assert!(stream.next().await.is_none());

        session.join().await;
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.provide_page_data(json!({ "late": true })));

        // The worker's own stop acknowledgement adds no second terminal event.
        let mut later = session.event_stream();
        let pending = tokio::time::timeout(Duration::from_millis(50), later.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_human() {
        let session = session();
        let mut stream = session.event_stream();
        session
            .start(worker(|control| {
                Box::pin(async move {
                    control.ask_human("hair colour?", "").await?;
                    Ok(String::new())
                })
            }))
            .unwrap();
        wait_for(&mut stream, EventKind::AskHuman).await;

        assert!(session.stop());
        assert_eq!(wait_for(&mut stream, EventKind::Stopped).await.state, SessionState::Stopped);
        session.join().await;
        assert!(session.provide_answer("brown").is_err());
        assert_eq!(session.snapshot().pending_question, None);
    }

    #[tokio::test]
    async fn test_worker_failure_becomes_error_event() {
        let session = session();
        let mut stream = session.event_stream();
        session
            .start(worker(|_| Box::pin(async { Err(WorkerError::Failed("model unavailable".into())) })))
            .unwrap();

        let last = wait_for(&mut stream, EventKind::Error).await;
        assert_eq!(last.message, "Agent error: model unavailable");
        assert!(stream.next().await.is_none());
        session.join().await;
        assert_eq!(session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn test_lifecycle_action_name_is_rejected() {
        let session = session();
        let mut stream = session.event_stream();
        session
            .start(worker(|control| {
                Box::pin(async move {
                    let err = control.execute_action("done", json!({})).await.unwrap_err();
                    assert_eq!(err, SessionError::ReservedAction("done".into()));
                    Err(err.into())
                })
            }))
            .unwrap();

        assert_eq!(next_event(&mut stream).await.kind, EventKind::Started);
        // No "done" event closes the stream before the worker's failure.
        let last = wait_for(&mut stream, EventKind::Error).await;
        assert_eq!(last.message, "Agent error: Action name \"done\" is reserved");
        assert!(stream.next().await.is_none());
        session.join().await;
        assert_eq!(session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_error_event() {
        let session = session();
        let mut stream = session.event_stream();
        session
            .start(worker(|_| {
                Box::pin(async {
                    let page: Option<String> = None;
                    Ok(page.expect("page model"))
                })
            }))
            .unwrap();

        wait_for(&mut stream, EventKind::Error).await;
        session.join().await;
        assert_eq!(session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn test_start_twice_and_after_stop() {
        let stopped = session();
        assert!(stopped.stop());
        let err = stopped
            .start(worker(|_| Box::pin(async { Ok(String::new()) })))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Stopped,
                ..
            }
        ));

        let session = session();
        let mut stream = session.event_stream();
        session
            .start(worker(|control| {
                Box::pin(async move {
                    control.scan_page().await?;
                    Ok(String::new())
                })
            }))
            .unwrap();
        wait_for(&mut stream, EventKind::ScanRequest).await;
        assert!(session
            .start(worker(|_| Box::pin(async { Ok(String::new()) })))
            .is_err());
        session.stop();
    }
}
