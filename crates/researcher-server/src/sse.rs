use std::convert::Infallible;
use std::pin::Pin;

use axum::response::sse::Event;
use researcher_core::ResearcherError;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

const EVENT_BUFFER: usize = 64;

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Writing half of a per-run server-sent event stream.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Serialize `payload` as the data of a named event. Fails with
    /// `HostDisconnected` once the client has dropped the stream.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        name: &'static str,
        payload: &T,
    ) -> Result<(), ResearcherError> {
        let data = serde_json::to_string(payload).map_err(anyhow::Error::from)?;
        self.tx
            .send(Event::default().event(name).data(data))
            .await
            .map_err(|_| ResearcherError::HostDisconnected(format!("stream closed before `{name}`")))
    }
}

pub fn event_channel() -> (EventSender, SseStream) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    (EventSender { tx }, Box::pin(stream))
}
