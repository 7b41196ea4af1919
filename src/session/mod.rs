// src/session/mod.rs — The streaming chat session
//
// Owns at most one live push channel at a time. `start` supersedes any
// in-flight stream before opening a new one, and every signal coming back
// from a channel is stamped with the generation it was issued under; signals
// from a superseded or cancelled generation are discarded without touching
// state. All mutation happens on the caller's task via `apply`, so no locks
// are needed.

pub mod conversation;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::backend::Device;
use crate::infra::errors::RaglineError;

pub use conversation::{Citation, ConversationLog, Message, Role};

/// Marker appended to the live answer when the transport fails mid-stream.
pub const STREAM_ERROR_MARKER: &str = "\n[stream error]";

/// One tagged event from the push channel. Transport failures travel as the
/// `Err` side of the stream item.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Incremental answer fragment, appended verbatim in arrival order.
    Token(String),
    /// Serialized citation batch; replaces the previous set wholesale.
    Sources(String),
    /// Normal end of stream. Nothing after this is honored.
    Done,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ChannelEvent, RaglineError>> + Send>>;

/// Transport seam. The production implementation is
/// `backend::sse::SseChannel`; tests script their own.
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn open(&self, question: &str, device: Device) -> Result<EventStream, RaglineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Done,
    Errored,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Streaming)
    }

    /// Transition table. Terminal states only collapse back to Idle; Idle
    /// only opens into Connecting.
    fn accepts(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Connecting)
                | (Connecting, Streaming)
                | (Connecting, Done)
                | (Connecting, Errored)
                | (Connecting, Idle)
                | (Streaming, Done)
                | (Streaming, Errored)
                | (Streaming, Idle)
                | (Done, Idle)
                | (Errored, Idle)
        )
    }
}

/// A raw channel event stamped with the generation it was issued under.
#[derive(Debug)]
pub struct Signal {
    generation: u64,
    event: Result<ChannelEvent, RaglineError>,
}

/// What `apply` did with a signal; drives rendering.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Fragment appended to the live assistant message.
    Token(String),
    /// Citation set replaced.
    Sources,
    /// Stream completed normally; session is Idle again.
    Finished { notice: String },
    /// Transport failed; a visible marker was appended and the session is
    /// Idle again.
    Failed { notice: String },
    /// Signal from a superseded or cancelled generation; nothing changed.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Question was empty after trimming; nothing happened.
    Rejected,
    Started {
        /// True when an in-flight stream was cancelled to make room.
        superseded: bool,
    },
}

pub struct StreamSession {
    channel: Arc<dyn EventChannel>,
    conversation: ConversationLog,
    state: SessionState,
    generation: u64,
    device: Device,
    idle_timeout: Option<Duration>,
    // Invariant: Some iff state is Connecting or Streaming.
    pump: Option<JoinHandle<()>>,
    tx: UnboundedSender<Signal>,
    rx: UnboundedReceiver<Signal>,
}

impl StreamSession {
    pub fn new(
        channel: Arc<dyn EventChannel>,
        device: Device,
        idle_timeout: Option<Duration>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            channel,
            conversation: ConversationLog::new(),
            state: SessionState::Idle,
            generation: 0,
            device,
            idle_timeout,
            pump: None,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.conversation
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn set_device(&mut self, device: Device) {
        self.device = device;
    }

    /// Submit a question. Cancels any in-flight stream first, appends the
    /// user message and a fresh live assistant message, clears citations,
    /// and opens a new channel under a new generation.
    pub fn start(&mut self, question: &str) -> StartOutcome {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return StartOutcome::Rejected;
        }

        let superseded = self.close_channel();

        self.generation += 1;
        let generation = self.generation;

        self.conversation.append_user(trimmed);
        self.conversation.begin_assistant();
        self.conversation.clear_citations();
        self.transition(SessionState::Connecting);

        let channel = Arc::clone(&self.channel);
        let question = trimmed.to_string();
        let device = self.device;
        let idle_timeout = self.idle_timeout;
        let tx = self.tx.clone();
        self.pump = Some(tokio::spawn(pump(
            channel,
            question,
            device,
            generation,
            idle_timeout,
            tx,
        )));

        StartOutcome::Started { superseded }
    }

    /// Cancel the active session, surfacing `reason` as a one-shot notice.
    /// Idempotent: with no channel open this is a no-op with no notice.
    pub fn cancel(&mut self, reason: &str) -> Option<String> {
        if self.close_channel() {
            Some(reason.to_string())
        } else {
            None
        }
    }

    /// New conversation: cancels any active stream first, then clears the
    /// whole log and citation set.
    pub fn reset(&mut self) -> Option<String> {
        let notice = self.cancel("Stopped");
        self.conversation.reset_all();
        notice
    }

    /// Drop the citation set without touching the log.
    pub fn clear_citations(&mut self) {
        self.conversation.clear_citations();
    }

    /// Next signal from the channel pump. Resolves only while a stream is
    /// delivering; callers stop polling once `apply` reports a terminal
    /// update.
    pub async fn recv_signal(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    /// Non-blocking variant for synchronous render loops.
    pub fn try_signal(&mut self) -> Option<Signal> {
        self.rx.try_recv().ok()
    }

    /// Fold one signal into session state. Signals from any generation other
    /// than the current one, or arriving after a terminal event, are
    /// discarded unseen.
    pub fn apply(&mut self, signal: Signal) -> SessionUpdate {
        if signal.generation != self.generation || !self.state.is_active() {
            return SessionUpdate::Stale;
        }

        match signal.event {
            Ok(ChannelEvent::Token(text)) => {
                if self.state == SessionState::Connecting {
                    self.transition(SessionState::Streaming);
                }
                self.conversation.append_to_live(&text);
                SessionUpdate::Token(text)
            }
            Ok(ChannelEvent::Sources(payload)) => {
                if self.state == SessionState::Connecting {
                    self.transition(SessionState::Streaming);
                }
                self.conversation
                    .set_citations(Citation::parse_batch(&payload));
                SessionUpdate::Sources
            }
            Ok(ChannelEvent::Done) => {
                self.finish(SessionState::Done);
                SessionUpdate::Finished {
                    notice: "Done".into(),
                }
            }
            Err(e) => {
                self.conversation.append_to_live(STREAM_ERROR_MARKER);
                self.finish(SessionState::Errored);
                SessionUpdate::Failed {
                    notice: format!("Stream error: {e}"),
                }
            }
        }
    }

    /// Tear down the live channel, if any. Returns true when there was one.
    fn close_channel(&mut self) -> bool {
        let Some(pump) = self.pump.take() else {
            return false;
        };
        pump.abort();
        // Signals already queued under the old generation are discarded by
        // the check in `apply`.
        self.generation += 1;
        self.conversation.finalize_live();
        self.transition(SessionState::Idle);
        true
    }

    /// Seal the live message and pass through the terminal state back to
    /// Idle. The notice on the returned update is the only externally
    /// visible residue of Done/Errored.
    fn finish(&mut self, terminal: SessionState) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.conversation.finalize_live();
        self.transition(terminal);
        self.transition(SessionState::Idle);
    }

    fn transition(&mut self, to: SessionState) {
        if self.state == to {
            return;
        }
        if !self.state.accepts(to) {
            tracing::warn!(
                "ignoring invalid session transition {:?} -> {:?}",
                self.state,
                to
            );
            return;
        }
        self.state = to;
    }
}

/// Drives one channel: opens it, forwards every event stamped with this
/// pump's generation, and stops after a terminal event. Aborting the task
/// drops the stream, which closes the underlying transport.
async fn pump(
    channel: Arc<dyn EventChannel>,
    question: String,
    device: Device,
    generation: u64,
    idle_timeout: Option<Duration>,
    tx: UnboundedSender<Signal>,
) {
    let mut stream = match channel.open(&question, device).await {
        Ok(s) => s,
        Err(e) => {
            let _ = tx.send(Signal {
                generation,
                event: Err(e),
            });
            return;
        }
    };

    loop {
        let item = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(item) => item,
                Err(_) => {
                    let _ = tx.send(Signal {
                        generation,
                        event: Err(RaglineError::stream(format!(
                            "no events for {}s",
                            limit.as_secs()
                        ))),
                    });
                    return;
                }
            },
            None => stream.next().await,
        };

        match item {
            Some(event) => {
                let terminal = matches!(event, Ok(ChannelEvent::Done) | Err(_));
                let _ = tx.send(Signal { generation, event });
                if terminal {
                    return;
                }
            }
            // Stream ended without done: the connection was dropped.
            None => {
                let _ = tx.send(Signal {
                    generation,
                    event: Err(RaglineError::stream("connection closed before completion")),
                });
                return;
            }
        }
    }
}
