//! Block accounting for chunked upload sessions.
//!
//! A payload of `total` bytes is cut into `total / block_size` full blocks
//! plus, when `total % block_size != 0`, one trailing partial block.

use crate::error::{CloudError, CloudResult};

/// OneDrive requires session fragments to be multiples of 320 KiB.
pub const ONEDRIVE_BLOCK_MULTIPLE: usize = 327_680;

/// Cursor over the blocks of one payload.
#[derive(Debug, Clone)]
pub struct UploadState {
    data: Vec<u8>,
    block_size: usize,
    current_block: usize,
    number_full_blocks: usize,
    partial_last_block_length: usize,
}

impl UploadState {
    /// Rejects empty payloads and a zero block size.
    pub fn new(block_size: usize, data: Vec<u8>) -> CloudResult<Self> {
        if block_size == 0 {
            return Err(CloudError::InvalidUploadState("block size must be non-zero".into()));
        }
        if data.is_empty() {
            return Err(CloudError::InvalidUploadState("no data to upload".into()));
        }

        let number_full_blocks = data.len() / block_size;
        let partial_last_block_length = data.len() % block_size;

        Ok(Self {
            data,
            block_size,
            current_block: 0,
            number_full_blocks,
            partial_last_block_length,
        })
    }

    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn number_full_blocks(&self) -> usize {
        self.number_full_blocks
    }

    pub fn partial_last_block(&self) -> bool {
        self.partial_last_block_length > 0
    }

    pub fn partial_last_block_length(&self) -> usize {
        self.partial_last_block_length
    }

    pub fn number_of_blocks(&self) -> usize {
        self.number_full_blocks + usize::from(self.partial_last_block())
    }

    /// Zero-based index of the block about to be sent.
    pub fn current_block(&self) -> usize {
        self.current_block
    }

    pub fn current_start_offset(&self) -> usize {
        self.current_block * self.block_size
    }

    /// Exclusive end of the current block.
    pub fn current_end_offset(&self) -> usize {
        (self.current_start_offset() + self.block_size).min(self.total_bytes())
    }

    pub fn current_block_data(&self) -> &[u8] {
        &self.data[self.current_start_offset()..self.current_end_offset()]
    }

    pub fn is_last_block(&self) -> bool {
        self.current_block + 1 == self.number_of_blocks()
    }

    /// `Content-Range` header value for the current block. The end is inclusive.
    pub fn content_range(&self) -> String {
        format!(
            "bytes {}-{}/{}",
            self.current_start_offset(),
            self.current_end_offset() - 1,
            self.total_bytes()
        )
    }

    /// Moves to the next block. Returns false once the last block has been sent.
    pub fn advance_to_next_block(&mut self) -> bool {
        if self.current_block >= self.number_of_blocks() {
            return false;
        }
        self.current_block += 1;
        self.current_block < self.number_of_blocks()
    }
}
