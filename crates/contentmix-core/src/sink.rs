//! # Result Sinks
//!
//! The engine hands every emitted [`ContentItem`] to a [`ResultSink`], in final
//! order, from its single collection path. Sinks never see concurrent calls.
//! `emit` is awaited before the next item is produced, so a sink that waits
//! (for example on a full channel) holds the engine back.
//!
//! | Sink | Description |
//! |------|-------------|
//! | [`JsonArrayWriter`] | Streams a JSON array to any `io::Write` |
//! | [`CollectingSink`] | Buffers items in memory |
//!
//! [`JsonArrayEncoder`] holds the framing state (`[`, separators, `]`) so
//! transports that are not `io::Write` can reuse it.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;

use crate::error::SinkError;
use crate::ContentItem;

pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

/// Consumer of the ordered result stream.
pub trait ResultSink: Send {
    fn emit<'a>(&'a mut self, item: ContentItem) -> SinkFuture<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Pending,
    Open { written: usize },
    Closed,
}

/// Incremental JSON array framing.
///
/// `open` must come first; `close` is idempotent and implicitly opens an array
/// that never received `open`, so the output is always a well-formed array.
#[derive(Debug, Clone)]
pub struct JsonArrayEncoder {
    framing: Framing,
}

impl Default for JsonArrayEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonArrayEncoder {
    pub fn new() -> Self {
        Self {
            framing: Framing::Pending,
        }
    }

    pub fn open(&mut self) -> &'static [u8] {
        match self.framing {
            Framing::Pending => {
                self.framing = Framing::Open { written: 0 };
                b"["
            }
            Framing::Open { .. } | Framing::Closed => b"",
        }
    }

    /// Encodes one array element, including the leading separator.
    pub fn item(&mut self, item: &ContentItem) -> Result<Vec<u8>, SinkError> {
        let written = match self.framing {
            Framing::Open { written } => written,
            Framing::Pending | Framing::Closed => return Err(SinkError::Closed),
        };

        let mut buf = Vec::with_capacity(256);
        if written > 0 {
            buf.push(b',');
        }
        serde_json::to_writer(&mut buf, item)?;
        self.framing = Framing::Open {
            written: written + 1,
        };
        Ok(buf)
    }

    pub fn close(&mut self) -> &'static [u8] {
        match self.framing {
            Framing::Pending => {
                self.framing = Framing::Closed;
                b"[]"
            }
            Framing::Open { .. } => {
                self.framing = Framing::Closed;
                b"]"
            }
            Framing::Closed => b"",
        }
    }

    pub fn written(&self) -> usize {
        match self.framing {
            Framing::Open { written } => written,
            Framing::Pending | Framing::Closed => 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.framing == Framing::Closed
    }
}

/// Sink that writes a JSON array to an `io::Write`, flushing after each element.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    encoder: JsonArrayEncoder,
}

impl<W: Write> JsonArrayWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            encoder: JsonArrayEncoder::new(),
        }
    }

    /// Writes the opening bracket.
    pub fn begin(&mut self) -> Result<(), SinkError> {
        let bytes = self.encoder.open();
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the closing bracket and returns the underlying writer.
    pub fn finish(mut self) -> Result<W, SinkError> {
        let bytes = self.encoder.close();
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write + Send> JsonArrayWriter<W> {
    fn write_item(&mut self, item: &ContentItem) -> Result<(), SinkError> {
        if matches!(self.encoder.framing, Framing::Pending) {
            self.begin()?;
        }
        let bytes = self.encoder.item(item)?;
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> ResultSink for JsonArrayWriter<W> {
    fn emit<'a>(&'a mut self, item: ContentItem) -> SinkFuture<'a> {
        let result = self.write_item(&item);
        Box::pin(async move { result })
    }
}

/// Sink that keeps every item in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    items: Vec<ContentItem>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ContentItem> {
        self.items
    }
}

impl ResultSink for CollectingSink {
    fn emit<'a>(&'a mut self, item: ContentItem) -> SinkFuture<'a> {
        self.items.push(item);
        Box::pin(async { Ok::<(), SinkError>(()) })
    }
}
