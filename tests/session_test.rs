// tests/session_test.rs — Integration tests: stream session with mock channels

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use ragline::backend::Device;
use ragline::infra::errors::RaglineError;
use ragline::session::{
    ChannelEvent, Citation, EventChannel, EventStream, Role, SessionState, SessionUpdate,
    StartOutcome, StreamSession,
};

// ── Mock channels ────────────────────────────────────────────────

/// Plays one pre-recorded script per `open` call. An exhausted script queue
/// hands out a channel that never emits.
struct ScriptedChannel {
    scripts: Mutex<VecDeque<Vec<Result<ChannelEvent, RaglineError>>>>,
    opened: Arc<AtomicUsize>,
}

impl ScriptedChannel {
    fn new(scripts: Vec<Vec<Result<ChannelEvent, RaglineError>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl EventChannel for ScriptedChannel {
    async fn open(&self, _question: &str, _device: Device) -> Result<EventStream, RaglineError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(events) => Ok(Box::pin(futures::stream::iter(events))),
            None => Ok(Box::pin(futures::stream::pending())),
        }
    }
}

/// Sets its flag when the channel stream is dropped, i.e. when the session
/// actually tore the channel down.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

type Feed = mpsc::UnboundedSender<Result<ChannelEvent, RaglineError>>;

/// Hands out one externally fed stream per `open` call, so tests control
/// event timing. Each stream reports its own teardown through a drop flag.
struct ControlledChannel {
    feeds: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<ChannelEvent, RaglineError>>>>,
    opened: Arc<AtomicUsize>,
    closed: Vec<Arc<AtomicBool>>,
}

impl ControlledChannel {
    fn with_feeds(count: usize) -> (Self, Vec<Feed>) {
        let mut senders = Vec::new();
        let mut receivers = VecDeque::new();
        let mut closed = Vec::new();
        for _ in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push_back(rx);
            closed.push(Arc::new(AtomicBool::new(false)));
        }
        (
            Self {
                feeds: Mutex::new(receivers),
                opened: Arc::new(AtomicUsize::new(0)),
                closed,
            },
            senders,
        )
    }
}

#[async_trait]
impl EventChannel for ControlledChannel {
    async fn open(&self, _question: &str, _device: Device) -> Result<EventStream, RaglineError> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        let mut rx = self
            .feeds
            .lock()
            .unwrap()
            .pop_front()
            .expect("more opens than prepared feeds");
        let flag = DropFlag(self.closed[n].clone());
        let stream = async_stream::stream! {
            let _flag = flag;
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };
        Ok(Box::pin(stream))
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn token(text: &str) -> Result<ChannelEvent, RaglineError> {
    Ok(ChannelEvent::Token(text.into()))
}

fn sources(payload: &str) -> Result<ChannelEvent, RaglineError> {
    Ok(ChannelEvent::Sources(payload.into()))
}

fn done() -> Result<ChannelEvent, RaglineError> {
    Ok(ChannelEvent::Done)
}

fn transport_error() -> Result<ChannelEvent, RaglineError> {
    Err(RaglineError::Stream {
        message: "connection reset".into(),
    })
}

fn session_over(channel: impl EventChannel + 'static) -> StreamSession {
    StreamSession::new(Arc::new(channel), Device::Cpu, None)
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Apply signals until the session reports a terminal update.
async fn drive_to_terminal(session: &mut StreamSession) -> SessionUpdate {
    loop {
        let signal = tokio::time::timeout(Duration::from_secs(1), session.recv_signal())
            .await
            .expect("timed out waiting for a stream signal")
            .expect("signal channel closed");
        match session.apply(signal) {
            update @ (SessionUpdate::Finished { .. } | SessionUpdate::Failed { .. }) => {
                return update
            }
            _ => {}
        }
    }
}

fn assistant_content(session: &StreamSession, index: usize) -> String {
    let msg = &session.conversation().messages()[index];
    assert_eq!(msg.role, Role::Assistant);
    msg.content.clone()
}

// ── Scenarios from the session contract ──────────────────────────

#[tokio::test]
async fn test_happy_path_tokens_sources_done() {
    let channel = ScriptedChannel::new(vec![vec![
        token("The"),
        token(" answer"),
        sources(r#"[{"source":"doc.pdf","page":2}]"#),
        done(),
    ]]);
    let mut session = session_over(channel);

    assert_eq!(
        session.start("What is X?"),
        StartOutcome::Started { superseded: false }
    );
    assert_eq!(session.state(), SessionState::Connecting);

    let terminal = drive_to_terminal(&mut session).await;
    assert_eq!(
        terminal,
        SessionUpdate::Finished {
            notice: "Done".into()
        }
    );

    assert_eq!(session.state(), SessionState::Idle);
    let log = session.conversation();
    assert_eq!(log.messages().len(), 2);
    assert_eq!(log.messages()[0].role, Role::User);
    assert_eq!(log.messages()[0].content, "What is X?");
    assert_eq!(assistant_content(&session, 1), "The answer");
    assert_eq!(
        session.conversation().citations(),
        &[Citation {
            source: "doc.pdf".into(),
            page: Some(2),
            excerpt: None,
        }]
    );
}

#[tokio::test]
async fn test_tokens_append_in_arrival_order() {
    let fragments = ["int", "erle", "av", "ed ", "tokens"];
    let mut script: Vec<_> = fragments.iter().map(|t| token(t)).collect();
    script.push(done());
    let mut session = session_over(ScriptedChannel::new(vec![script]));

    session.start("order check");
    drive_to_terminal(&mut session).await;

    assert_eq!(assistant_content(&session, 1), fragments.concat());
}

#[tokio::test]
async fn test_question_is_trimmed_and_empty_rejected() {
    let channel = ScriptedChannel::new(vec![]);
    let opened = channel.opened.clone();
    let mut session = session_over(channel);

    assert_eq!(session.start("   \n\t "), StartOutcome::Rejected);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.conversation().is_empty());
    assert_eq!(opened.load(Ordering::SeqCst), 0);

    session.start("  padded question  ");
    assert_eq!(session.conversation().messages()[0].content, "padded question");
}

#[tokio::test]
async fn test_malformed_sources_degrade_to_empty_set() {
    let mut session = session_over(ScriptedChannel::new(vec![vec![
        token("Answer"),
        sources("not json"),
        done(),
    ]]));

    session.start("resilience");
    let terminal = drive_to_terminal(&mut session).await;

    // A bad payload is not a session error
    assert!(matches!(terminal, SessionUpdate::Finished { .. }));
    assert!(session.conversation().citations().is_empty());
    assert_eq!(assistant_content(&session, 1), "Answer");
}

#[tokio::test]
async fn test_sources_batch_replaces_previous_wholesale() {
    let mut session = session_over(ScriptedChannel::new(vec![vec![
        sources(r#"[{"source":"a.pdf"},{"source":"b.pdf"}]"#),
        sources(r#"[{"source":"c.pdf","page":7,"text":"quoted"}]"#),
        done(),
    ]]));

    session.start("replace");
    drive_to_terminal(&mut session).await;

    assert_eq!(
        session.conversation().citations(),
        &[Citation {
            source: "c.pdf".into(),
            page: Some(7),
            excerpt: Some("quoted".into()),
        }]
    );
}

#[tokio::test]
async fn test_transport_error_marks_answer_and_returns_idle() {
    let mut session = session_over(ScriptedChannel::new(vec![vec![
        token("Partial"),
        transport_error(),
    ]]));

    session.start("doomed");
    let terminal = drive_to_terminal(&mut session).await;

    match terminal {
        SessionUpdate::Failed { notice } => assert!(notice.contains("connection reset")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(assistant_content(&session, 1), "Partial\n[stream error]");
}

#[tokio::test]
async fn test_open_failure_surfaces_as_transport_error() {
    struct RefusingChannel;

    #[async_trait]
    impl EventChannel for RefusingChannel {
        async fn open(&self, _q: &str, _d: Device) -> Result<EventStream, RaglineError> {
            Err(RaglineError::Stream {
                message: "connection refused".into(),
            })
        }
    }

    let mut session = session_over(RefusingChannel);
    session.start("unreachable");
    let terminal = drive_to_terminal(&mut session).await;
    assert!(matches!(terminal, SessionUpdate::Failed { .. }));
    assert_eq!(session.state(), SessionState::Idle);
}

// ── Single-flight and cancellation ───────────────────────────────

#[tokio::test]
async fn test_start_supersedes_inflight_channel() {
    let (channel, feeds) = ControlledChannel::with_feeds(2);
    let opened = channel.opened.clone();
    let first_closed = channel.closed[0].clone();
    let mut session = session_over(channel);

    session.start("Q1");
    wait_for(|| opened.load(Ordering::SeqCst) == 1).await;

    assert_eq!(
        session.start("Q2"),
        StartOutcome::Started { superseded: true }
    );

    // The first channel is torn down before the second stream flows
    wait_for(|| first_closed.load(Ordering::SeqCst)).await;
    wait_for(|| opened.load(Ordering::SeqCst) == 2).await;
    assert!(feeds[0].send(token("late")).is_err());

    feeds[1].send(token("second answer")).unwrap();
    feeds[1].send(done()).unwrap();
    drive_to_terminal(&mut session).await;

    // Q1's assistant message stays in the log, empty and frozen
    let log = session.conversation();
    assert_eq!(log.messages().len(), 4);
    assert_eq!(log.messages()[0].content, "Q1");
    assert_eq!(assistant_content(&session, 1), "");
    assert_eq!(log.messages()[2].content, "Q2");
    assert_eq!(assistant_content(&session, 3), "second answer");
    assert_eq!(opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancel_discards_late_signals() {
    let (channel, feeds) = ControlledChannel::with_feeds(1);
    let opened = channel.opened.clone();
    let mut session = session_over(channel);

    session.start("stale check");
    wait_for(|| opened.load(Ordering::SeqCst) == 1).await;

    feeds[0].send(token("The")).unwrap();
    let signal = session.recv_signal().await.unwrap();
    assert_eq!(session.apply(signal), SessionUpdate::Token("The".into()));
    assert_eq!(session.state(), SessionState::Streaming);

    // Queue more events, give the pump a beat to forward them, then cancel.
    feeds[0].send(token(" ghost")).unwrap();
    feeds[0].send(sources(r#"[{"source":"ghost.pdf"}]"#)).unwrap();
    feeds[0].send(done()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(session.cancel("Stopped"), Some("Stopped".into()));
    assert_eq!(session.state(), SessionState::Idle);

    // Whatever made it into the queue is discarded without touching state
    while let Some(signal) = session.try_signal() {
        assert_eq!(session.apply(signal), SessionUpdate::Stale);
    }
    assert_eq!(assistant_content(&session, 1), "The");
    assert!(session.conversation().citations().is_empty());
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let (channel, _feeds) = ControlledChannel::with_feeds(1);
    let opened = channel.opened.clone();
    let mut session = session_over(channel);

    // Cancel with nothing running: no notice
    assert_eq!(session.cancel("Stopped"), None);

    session.start("q");
    wait_for(|| opened.load(Ordering::SeqCst) == 1).await;

    assert_eq!(session.cancel("Stopped"), Some("Stopped".into()));
    assert_eq!(session.cancel("Stopped"), None);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_nothing_honored_after_done() {
    let (channel, feeds) = ControlledChannel::with_feeds(1);
    let opened = channel.opened.clone();
    let mut session = session_over(channel);

    session.start("finality");
    wait_for(|| opened.load(Ordering::SeqCst) == 1).await;

    feeds[0].send(token("A")).unwrap();
    feeds[0].send(done()).unwrap();
    drive_to_terminal(&mut session).await;

    // The pump stopped reading at done; the feed is gone
    assert!(feeds[0].send(token("B")).is_err());
    assert_eq!(assistant_content(&session, 1), "A");
}

#[tokio::test]
async fn test_reset_cancels_and_clears_everything() {
    let (channel, feeds) = ControlledChannel::with_feeds(1);
    let opened = channel.opened.clone();
    let closed = channel.closed[0].clone();
    let mut session = session_over(channel);

    session.start("to be discarded");
    wait_for(|| opened.load(Ordering::SeqCst) == 1).await;
    feeds[0].send(token("partial")).unwrap();
    let signal = session.recv_signal().await.unwrap();
    session.apply(signal);

    session.reset();

    wait_for(|| closed.load(Ordering::SeqCst)).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.conversation().is_empty());
    assert!(session.conversation().citations().is_empty());
}

#[tokio::test]
async fn test_new_start_clears_citation_set() {
    let mut session = session_over(ScriptedChannel::new(vec![
        vec![sources(r#"[{"source":"old.pdf"}]"#), done()],
        vec![token("fresh"), done()],
    ]));

    session.start("first");
    drive_to_terminal(&mut session).await;
    assert_eq!(session.conversation().citations().len(), 1);

    session.start("second");
    // Cleared synchronously on start, before any event arrives
    assert!(session.conversation().citations().is_empty());
    drive_to_terminal(&mut session).await;
    assert!(session.conversation().citations().is_empty());
}

// ── Configurable idle timeout (absent by default) ────────────────

#[tokio::test]
async fn test_idle_timeout_converts_silence_into_transport_error() {
    let (channel, _feeds) = ControlledChannel::with_feeds(1);
    let mut session = StreamSession::new(
        Arc::new(channel),
        Device::Gpu,
        Some(Duration::from_millis(50)),
    );

    session.start("silent backend");
    let terminal = drive_to_terminal(&mut session).await;

    match terminal {
        SessionUpdate::Failed { notice } => assert!(notice.contains("no events")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Idle);
}

// ── Channel stream sanity ────────────────────────────────────────

#[tokio::test]
async fn test_scripted_stream_shape() {
    // Guards the mock itself so the tests above fail loudly, not silently
    let channel = ScriptedChannel::new(vec![vec![token("x"), done()]]);
    let mut stream = channel.open("q", Device::Cpu).await.unwrap();
    assert!(matches!(
        stream.next().await,
        Some(Ok(ChannelEvent::Token(_)))
    ));
    assert!(matches!(stream.next().await, Some(Ok(ChannelEvent::Done))));
    assert!(stream.next().await.is_none());
}
