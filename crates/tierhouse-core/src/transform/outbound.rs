//! Read-path stages: dechunk, decrypt, decompress.

use bytes::Bytes;

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::security::SegmentCipher;
use crate::transform::DetransformStream;

/// Cuts the fetched byte range back into transformed blocks, one per
/// seeded chunk, each exactly `transformed_size` bytes long.
pub struct BaseDechunker {
    source: Bytes,
    position: usize,
    chunks: std::vec::IntoIter<Chunk>,
}

impl BaseDechunker {
    /// `source` must hold the transformed bytes of `chunks`, contiguous
    /// and in ordinal order, as returned by a ranged fetch.
    pub fn new(source: Bytes, chunks: Vec<Chunk>) -> Self {
        Self {
            source,
            position: 0,
            chunks: chunks.into_iter(),
        }
    }
}

impl DetransformStream for BaseDechunker {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let Some(chunk) = self.chunks.next() else {
            return Ok(None);
        };
        let size = chunk.transformed_size as usize;
        let available = self.source.len() - self.position;
        if size > available {
            return Err(Error::ChunkTruncated {
                expected: chunk.transformed_size,
                available,
            });
        }
        let block = self.source.slice(self.position..self.position + size);
        self.position += size;
        Ok(Some(block))
    }
}

/// Opens each sealed block with the segment cipher.
pub struct DecryptionTransform {
    inner: Box<dyn DetransformStream>,
    cipher: SegmentCipher,
}

impl DecryptionTransform {
    pub fn new(inner: Box<dyn DetransformStream>, cipher: SegmentCipher) -> Self {
        Self { inner, cipher }
    }
}

impl DetransformStream for DecryptionTransform {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.inner.next_chunk()? {
            Some(block) => Ok(Some(Bytes::from(self.cipher.decrypt_chunk(&block)?))),
            None => Ok(None),
        }
    }
}

/// Decompresses each block independently.
pub struct DecompressionTransform {
    inner: Box<dyn DetransformStream>,
}

impl DecompressionTransform {
    pub fn new(inner: Box<dyn DetransformStream>) -> Self {
        Self { inner }
    }
}

impl DetransformStream for DecompressionTransform {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.inner.next_chunk()? {
            Some(block) => {
                let plain = lz4_flex::decompress_size_prepended(&block)
                    .map_err(|e| Error::CompressionCorrupt(e.to_string()))?;
                Ok(Some(Bytes::from(plain)))
            }
            None => Ok(None),
        }
    }
}
