use bytes::Bytes;
use contentmix_core::{ContentItem, JsonArrayEncoder, ResultSink, SinkError, SinkFuture};
use tokio::sync::mpsc::Sender;

/// Chunks buffered between the engine and the response body before `emit`
/// starts waiting on the client.
pub const CHUNK_BUFFER: usize = 16;

/// Sink that frames items as a JSON array and forwards each chunk to a
/// streaming response body.
///
/// The channel is bounded, so a client that stops reading stalls the engine
/// once [`CHUNK_BUFFER`] chunks are queued.
pub struct ChunkSink {
    tx: Sender<Bytes>,
    encoder: JsonArrayEncoder,
}

impl ChunkSink {
    pub fn new(tx: Sender<Bytes>) -> Self {
        Self {
            tx,
            encoder: JsonArrayEncoder::new(),
        }
    }

    /// Sends the opening bracket.
    pub async fn open(&mut self) {
        let chunk = self.encoder.open();
        self.send_static(chunk).await;
    }

    /// Sends the closing bracket. Safe to call after an aborted run.
    pub async fn close(&mut self) {
        let chunk = self.encoder.close();
        self.send_static(chunk).await;
    }

    pub fn written(&self) -> usize {
        self.encoder.written()
    }

    async fn send_static(&self, chunk: &'static [u8]) {
        if !chunk.is_empty() {
            // a disconnected client has nothing left to receive
            let _ = self.tx.send(Bytes::from_static(chunk)).await;
        }
    }
}

impl ResultSink for ChunkSink {
    fn emit<'a>(&'a mut self, item: ContentItem) -> SinkFuture<'a> {
        Box::pin(async move {
            let chunk = self.encoder.item(&item)?;
            self.tx
                .send(Bytes::from(chunk))
                .await
                .map_err(|_| SinkError::Closed)
        })
    }
}
