//! Write-path stages: split, compress, encrypt.

use std::io::Read;

use bytes::Bytes;

use crate::error::Result;
use crate::security::{SegmentCipher, ENCRYPTION_OVERHEAD};
use crate::transform::TransformStream;

/// Splits a byte source into fixed-size plaintext blocks. The final block
/// may be shorter; no block is empty.
pub struct BaseChunker<R: Read + Send> {
    source: R,
    chunk_size: u32,
    exhausted: bool,
}

impl<R: Read + Send> BaseChunker<R> {
    pub fn new(source: R, chunk_size: u32) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            source,
            chunk_size,
            exhausted: false,
        }
    }
}

impl<R: Read + Send> TransformStream for BaseChunker<R> {
    fn original_chunk_size(&self) -> u32 {
        self.chunk_size
    }

    fn transformed_chunk_size(&self) -> Option<u32> {
        Some(self.chunk_size)
    }

    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut block = vec![0u8; self.chunk_size as usize];
        let mut filled = 0;
        while filled < block.len() {
            match self.source.read(&mut block[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled < block.len() {
            self.exhausted = true;
        }
        if filled == 0 {
            return Ok(None);
        }
        block.truncate(filled);
        Ok(Some(Bytes::from(block)))
    }
}

/// Compresses each block independently. Output sizes vary with content.
pub struct CompressionTransform {
    inner: Box<dyn TransformStream>,
}

impl CompressionTransform {
    pub fn new(inner: Box<dyn TransformStream>) -> Self {
        Self { inner }
    }
}

impl TransformStream for CompressionTransform {
    fn original_chunk_size(&self) -> u32 {
        self.inner.original_chunk_size()
    }

    fn transformed_chunk_size(&self) -> Option<u32> {
        None
    }

    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self
            .inner
            .next_chunk()?
            .map(|block| Bytes::from(lz4_flex::compress_prepend_size(&block))))
    }
}

/// Seals each block with the segment cipher, growing it by the nonce and
/// the authentication tag.
pub struct EncryptionTransform {
    inner: Box<dyn TransformStream>,
    cipher: SegmentCipher,
}

impl EncryptionTransform {
    pub fn new(inner: Box<dyn TransformStream>, cipher: SegmentCipher) -> Self {
        Self { inner, cipher }
    }
}

impl TransformStream for EncryptionTransform {
    fn original_chunk_size(&self) -> u32 {
        self.inner.original_chunk_size()
    }

    fn transformed_chunk_size(&self) -> Option<u32> {
        self.inner
            .transformed_chunk_size()
            .map(|size| size + ENCRYPTION_OVERHEAD as u32)
    }

    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.inner.next_chunk()? {
            Some(block) => Ok(Some(Bytes::from(self.cipher.encrypt_chunk(&block)?))),
            None => Ok(None),
        }
    }
}
