// src/backend/sse.rs — SSE adapter for the chat stream endpoint
//
// Maps the backend's named server-sent events (token / sources / done) onto
// the typed ChannelEvent stream the session consumes. One connection per
// question; the EventSource is closed on `done` and on the first transport
// error. Closing happens again implicitly when the stream is dropped, which
// is a no-op on an already-closed source.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use std::time::Duration;
use url::Url;

use crate::backend::Device;
use crate::infra::errors::RaglineError;
use crate::session::{ChannelEvent, EventChannel, EventStream};

pub struct SseChannel {
    base: String,
    client: reqwest::Client,
}

impl SseChannel {
    pub fn new(base_url: &str) -> Result<Self, RaglineError> {
        let base = base_url.trim_end_matches('/').to_string();
        Url::parse(&base)?;

        // No overall timeout: the answer streams for as long as the model
        // takes. Only connecting is bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RaglineError::stream(e.to_string()))?;

        Ok(Self { base, client })
    }

    fn stream_url(&self, question: &str, device: Device) -> Result<Url, RaglineError> {
        build_stream_url(&self.base, question, device)
    }
}

fn build_stream_url(base: &str, question: &str, device: Device) -> Result<Url, RaglineError> {
    let mut url = Url::parse(&format!("{base}/api/chat/stream"))?;
    url.query_pairs_mut()
        .append_pair("question", question)
        .append_pair("device", device.as_str());
    Ok(url)
}

#[async_trait]
impl EventChannel for SseChannel {
    async fn open(&self, question: &str, device: Device) -> Result<EventStream, RaglineError> {
        let url = self.stream_url(question, device)?;

        let mut es = self
            .client
            .get(url)
            .eventsource()
            .map_err(|e| RaglineError::stream(e.to_string()))?;

        let stream = async_stream::stream! {
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(msg)) => match msg.event.as_str() {
                        "token" => yield Ok(ChannelEvent::Token(msg.data)),
                        "sources" => yield Ok(ChannelEvent::Sources(msg.data)),
                        "done" => {
                            es.close();
                            yield Ok(ChannelEvent::Done);
                            break;
                        }
                        other => {
                            tracing::debug!("ignoring unknown SSE event '{other}'");
                        }
                    },
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        // EventSource would reconnect on its own; we don't
                        // retry, so shut it down on the first failure.
                        es.close();
                        yield Err(RaglineError::stream(format!("SSE stream error: {e}")));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
