//! Range assembly: stitches cached chunks into one lazy byte sequence.
//!
//! A positional read rarely lines up with chunk boundaries, so the
//! assembler resolves the first and last chunk from the index, pulls each
//! one through the chunk cache in ordinal order, trims the head of the
//! first block and the tail of the last, and yields the rest untouched.
//! Nothing is buffered across chunks.
//!
//! ## Usage
//!
//! ```ignore
//! use tierhouse_core::BytesRange;
//! use tierhouse_storage::FetchChunkStream;
//!
//! let mut stream =
//!     FetchChunkStream::new(chunks, meta, manifest, BytesRange::new(5, 14))?;
//!
//! // pull block by block...
//! while let Some(block) = stream.next_chunk().await? {
//!     consume(block);
//! }
//!
//! // ...or hand the host an AsyncRead
//! let reader = FetchChunkStream::new(chunks, meta, manifest, range)?.into_async_read();
//! ```

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tierhouse_core::{BytesRange, SegmentManifest, SegmentMetadata};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::cache::CachingChunkManager;
use crate::error::Result;

/// Lazy plaintext stream over one byte range of a segment.
///
/// Blocks arrive in increasing offset order with no gaps or duplicates;
/// in total exactly `range.len()` bytes are emitted. Dropping the stream
/// early abandons nothing but the read position: chunk loads already in
/// flight finish and stay cached for other readers.
pub struct FetchChunkStream {
    chunks: CachingChunkManager,
    meta: SegmentMetadata,
    manifest: Arc<SegmentManifest>,
    next_ordinal: u32,
    last_ordinal: u32,
    skip: u64,
    remaining: u64,
}

impl FetchChunkStream {
    pub fn new(
        chunks: CachingChunkManager,
        meta: SegmentMetadata,
        manifest: Arc<SegmentManifest>,
        range: BytesRange,
    ) -> Result<Self> {
        let index = manifest.chunk_index();
        let first = index.find_chunk_for_original_offset(range.from)?;
        let last = index.find_chunk_for_original_offset(range.to)?;
        Ok(Self {
            chunks,
            meta,
            manifest,
            next_ordinal: first.ordinal,
            last_ordinal: last.ordinal,
            skip: range.from - first.original_from,
            remaining: range.len(),
        })
    }

    pub fn first_ordinal(&self) -> u32 {
        self.next_ordinal
    }

    pub fn last_ordinal(&self) -> u32 {
        self.last_ordinal
    }

    /// Pulls the next plaintext block of the range.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        while self.remaining > 0 && self.next_ordinal <= self.last_ordinal {
            let payload = self
                .chunks
                .get_chunk(&self.meta, &self.manifest, self.next_ordinal)
                .await?;
            self.next_ordinal += 1;

            let mut block = payload;
            if self.skip > 0 {
                let skip = (self.skip as usize).min(block.len());
                block = block.slice(skip..);
                self.skip -= skip as u64;
            }
            if block.len() as u64 > self.remaining {
                block = block.slice(..self.remaining as usize);
            }
            self.remaining -= block.len() as u64;
            if !block.is_empty() {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    /// Drains the stream into one buffer. Intended for tests and small
    /// ranges; large reads should consume block by block.
    pub async fn read_to_end(mut self) -> Result<Bytes> {
        let mut out = Vec::new();
        while let Some(block) = self.next_chunk().await? {
            out.extend_from_slice(&block);
        }
        Ok(Bytes::from(out))
    }

    /// Adapts the pull API to the host's byte-stream interface.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send {
        futures::stream::try_unfold(self, |mut stream| async move {
            match stream.next_chunk().await {
                Ok(Some(block)) => Ok(Some((block, stream))),
                Ok(None) => Ok(None),
                Err(e) => Err(std::io::Error::other(e)),
            }
        })
    }

    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(self.into_stream().boxed())
    }
}
