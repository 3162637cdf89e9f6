/// Blob streaming
///
/// Two independent directions over the driver's chunked data protocol:
///
/// - **Insert**: a blob parameter installs a lazy source per row instead of
///   a materialized buffer. During execute the driver pulls chunks through
///   `fill` at its own pace, which bounds memory regardless of blob size.
/// - **Fetch**: a factory produces one sink per materialized row; the
///   engine forwards driver chunks to the sink from a fixed scratch buffer
///   and invokes the sink's `finish` when the final chunk arrives. Each
///   row's sink is destroyed right after `finish`, so at most one row
///   accumulates at a time unless the caller's sink aggregates.
use std::io::Read;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Whether a blob travels as binary bytes or driver-terminated character
/// data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Binary,
    Character,
}

/// A pull source for one row's blob bytes.
///
/// `fill` writes the next chunk into `buf` and returns the number of bytes
/// written; zero means the blob is complete.
pub trait BlobRead: Send {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Adapter turning any [`Read`] implementation into a blob source.
pub struct ReadSource<R>(pub R);

impl<R: Read + Send> BlobRead for ReadSource<R> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.0
            .read(buf)
            .map_err(|e| Error::protocol(format!("blob source read failed: {e}")))
    }
}

/// An owned byte source with a known length.
pub struct BytesSource {
    data: Bytes,
}

impl BlobRead for BytesSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        use bytes::Buf;
        let n = self.data.len().min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data.advance(n);
        Ok(n)
    }
}

impl BytesSource {
    fn new(data: Bytes) -> Self {
        BytesSource { data }
    }
}

/// One row of an insert-direction blob parameter: a source plus, when the
/// source can report it, the total length up front. An unknown length
/// forces the chunked at-execute protocol.
pub struct InsertBlobRow {
    pub(crate) source: Box<dyn BlobRead>,
    pub(crate) length: Option<usize>,
}

/// Insert-direction blob parameter covering every row of one execute.
pub struct InsertBlob {
    kind: BlobKind,
    rows: Vec<Option<InsertBlobRow>>,
}

impl InsertBlob {
    pub fn new(kind: BlobKind) -> Self {
        InsertBlob {
            kind,
            rows: Vec::new(),
        }
    }

    /// One-row blob from owned bytes, length known up front.
    pub fn from_bytes(kind: BlobKind, data: impl Into<Bytes>) -> Self {
        let mut blob = InsertBlob::new(kind);
        blob.push_bytes(data);
        blob
    }

    /// One-row blob from a reader of unknown length.
    pub fn from_reader(kind: BlobKind, reader: impl BlobRead + 'static) -> Self {
        let mut blob = InsertBlob::new(kind);
        blob.push_reader(reader);
        blob
    }

    pub fn push_bytes(&mut self, data: impl Into<Bytes>) -> &mut Self {
        let data = data.into();
        let length = data.len();
        self.rows.push(Some(InsertBlobRow {
            source: Box::new(BytesSource::new(data)),
            length: Some(length),
        }));
        self
    }

    pub fn push_reader(&mut self, reader: impl BlobRead + 'static) -> &mut Self {
        self.rows.push(Some(InsertBlobRow {
            source: Box::new(reader),
            length: None,
        }));
        self
    }

    /// A reader whose total length is known without consuming it.
    pub fn push_sized_reader(
        &mut self,
        reader: impl BlobRead + 'static,
        length: usize,
    ) -> &mut Self {
        self.rows.push(Some(InsertBlobRow {
            source: Box::new(reader),
            length: Some(length),
        }));
        self
    }

    /// A NULL row; the execute loop skips it.
    pub fn push_null(&mut self) -> &mut Self {
        self.rows.push(None);
        self
    }

    pub fn kind(&self) -> BlobKind {
        self.kind
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn into_rows(self) -> Vec<Option<InsertBlobRow>> {
        self.rows
    }

    /// Reject declared lengths the driver's signed indicator cannot encode.
    pub(crate) fn check_length(length: usize) -> Result<()> {
        if length > isize::MAX as usize / 2 {
            return Err(Error::BlobTooLarge { length });
        }
        Ok(())
    }
}

/// Consumer of one row's fetched blob bytes.
///
/// `chunk` receives each driver chunk in order; `finish` runs exactly once
/// after the final chunk, consuming the sink so the implementation can hand
/// its accumulated state back to the caller.
pub trait BlobSink {
    fn chunk(&mut self, data: &[u8]) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Fetch-direction blob column: a factory invoked once per non-NULL row.
pub struct FetchBlob {
    kind: BlobKind,
    factory: Box<dyn FnMut(usize) -> Result<Box<dyn BlobSink>>>,
}

impl FetchBlob {
    /// `factory` is called with the 0-based row number within the fetched
    /// row array.
    pub fn new(
        kind: BlobKind,
        factory: impl FnMut(usize) -> Result<Box<dyn BlobSink>> + 'static,
    ) -> Self {
        FetchBlob {
            kind,
            factory: Box::new(factory),
        }
    }

    pub fn kind(&self) -> BlobKind {
        self.kind
    }

    pub(crate) fn make_sink(&mut self, row: usize) -> Result<Box<dyn BlobSink>> {
        (self.factory)(row)
    }
}

impl std::fmt::Debug for FetchBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchBlob").field("kind", &self.kind).finish()
    }
}
