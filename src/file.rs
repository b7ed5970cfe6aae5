// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! File I/O: byte ranges mapped onto the 488-byte-stride data-block chain.
//!
//! Each data block addresses exactly one 488-byte stride of the file even
//! when its `data_size` is smaller; positions past `data_size` and strides
//! with no block at all read as zeros (sparse holes).

use crate::block::{update_checksum, DataBlock, Header, SecType, HEADER_CHECKSUM_WORD};
use crate::consts::{MAX_DATABLOCKS, MAX_FILE_SIZE, OFS_DATA_SIZE, T_HEADER};
use crate::error::{AdfError, Result};
use crate::volume::Volume;

const STRIDE: u64 = OFS_DATA_SIZE as u64;

impl Volume {
    /// Validate a file header and return (byte_size, first_data).
    fn file_header_guard(&self, header: u32) -> Result<(u32, u32)> {
        let hdr = Header::new(self.image.read_block(header)?);
        if hdr.block_type() != T_HEADER {
            return Err(AdfError::Corrupt {
                block: header,
                detail: format!("block type {} is not a header", hdr.block_type()),
            });
        }
        match hdr.sec_type() {
            Some(SecType::File) => Ok((hdr.byte_size(), hdr.first_data())),
            Some(SecType::Dir) | Some(SecType::Root) => Err(AdfError::IsDirectory),
            None => Err(AdfError::Corrupt {
                block: header,
                detail: format!("impossible sec_type {}", hdr.sec_type_raw()),
            }),
        }
    }

    /// Read up to `size` bytes at `offset`, zero-filling sparse holes.
    pub fn file_read(&self, header: u32, offset: u64, size: u32) -> Result<Vec<u8>> {
        let (file_size, first_data) = self.file_header_guard(header)?;
        if offset >= file_size as u64 || size == 0 {
            return Ok(Vec::new());
        }
        let n = (size as u64).min(file_size as u64 - offset) as usize;
        let mut out = vec![0u8; n];

        let total = self.image.total_blocks();
        let mut steps = 0u32;
        let mut cur = first_data;
        let mut skip = offset / STRIDE;
        while skip > 0 && cur != 0 {
            cur = DataBlock::new(self.image.read_block(cur)?).next_data();
            skip -= 1;
            steps += 1;
            if steps > total {
                return Err(AdfError::Corrupt {
                    block: header,
                    detail: "cycle in data chain".to_string(),
                });
            }
        }

        let mut produced = 0usize;
        let mut pos = offset;
        while produced < n {
            let block_off = (pos % STRIDE) as usize;
            let chunk = (n - produced).min(OFS_DATA_SIZE - block_off);
            if cur != 0 {
                let db = DataBlock::new(self.image.read_block(cur)?);
                let data_size = db.data_size() as usize;
                if block_off < data_size {
                    let avail = (data_size - block_off).min(chunk);
                    out[produced..produced + avail]
                        .copy_from_slice(&db.payload()[block_off..block_off + avail]);
                }
                cur = db.next_data();
                steps += 1;
                if steps > total {
                    return Err(AdfError::Corrupt {
                        block: header,
                        detail: "cycle in data chain".to_string(),
                    });
                }
            }
            produced += chunk;
            pos += chunk as u64;
        }
        Ok(out)
    }

    /// Write `buf` at `offset`, allocating and linking data blocks on
    /// demand. Returns the committed byte count; a full volume mid-write
    /// yields a partial count, never an inconsistent image.
    pub fn file_write(&mut self, header: u32, buf: &[u8], offset: u64) -> Result<usize> {
        if self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let (file_size, mut first_data) = self.file_header_guard(header)?;
        if buf.is_empty() {
            return Ok(0);
        }
        if offset >= MAX_FILE_SIZE as u64 {
            return Err(AdfError::NoSpace);
        }
        let write_n = buf.len().min((MAX_FILE_SIZE as u64 - offset) as usize);

        if first_data == 0 {
            let nb = self.alloc_data_block(header, 1)?;
            let b = self.image.block_mut(header)?;
            Header::new(&mut *b).set_first_data(nb);
            update_checksum(b, HEADER_CHECKSUM_WORD);
            first_data = nb;
        }

        // Walk to the block covering `offset`, bridging any gap with fresh
        // zero-filled blocks.
        let mut cur = first_data;
        let mut seq: u32 = 1;
        while (seq as u64) * STRIDE <= offset {
            let next = DataBlock::new(self.image.read_block(cur)?).next_data();
            if next == 0 {
                let nb = self.alloc_data_block(header, seq + 1)?;
                let b = self.image.block_mut(cur)?;
                DataBlock::new(&mut *b).set_next_data(nb);
                update_checksum(b, HEADER_CHECKSUM_WORD);
                cur = nb;
            } else {
                cur = next;
            }
            seq += 1;
        }

        let mut written = 0usize;
        let mut pos = offset;
        while written < write_n {
            let block_off = (pos - (seq as u64 - 1) * STRIDE) as usize;
            let chunk = (write_n - written).min(OFS_DATA_SIZE - block_off);
            {
                let b = self.image.block_mut(cur)?;
                let mut db = DataBlock::new(&mut *b);
                db.payload_mut()[block_off..block_off + chunk]
                    .copy_from_slice(&buf[written..written + chunk]);
                let end = (block_off + chunk) as u32;
                if end > db.data_size() {
                    db.set_data_size(end);
                }
                update_checksum(b, HEADER_CHECKSUM_WORD);
            }
            written += chunk;
            pos += chunk as u64;
            if written == write_n {
                break;
            }
            let next = DataBlock::new(self.image.read_block(cur)?).next_data();
            if next == 0 {
                match self.alloc_data_block(header, seq + 1) {
                    Ok(nb) => {
                        let b = self.image.block_mut(cur)?;
                        DataBlock::new(&mut *b).set_next_data(nb);
                        update_checksum(b, HEADER_CHECKSUM_WORD);
                        cur = nb;
                    }
                    Err(AdfError::NoSpace) => break,
                    Err(e) => return Err(e),
                }
            } else {
                cur = next;
            }
            seq += 1;
        }

        // Grow the size only once the bytes it covers are on the chain, so
        // a failed allocation never leaves a size with no blocks behind it.
        let new_size = (file_size as u64).max(offset + written as u64) as u32;
        if new_size != file_size {
            let b = self.image.block_mut(header)?;
            Header::new(&mut *b).set_byte_size(new_size);
            update_checksum(b, HEADER_CHECKSUM_WORD);
        }
        self.touch_header(header)?;
        Ok(written)
    }

    /// Shrink (or sparsely grow) a file to `new_size` bytes.
    pub fn file_truncate(&mut self, header: u32, new_size: u32) -> Result<()> {
        if self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let (cur_size, first_data) = self.file_header_guard(header)?;
        if new_size == cur_size {
            return Ok(());
        }

        if new_size < cur_size {
            let keep = (new_size as u64).div_ceil(STRIDE) as u32;
            if keep == 0 {
                if first_data != 0 {
                    self.free_data_chain(first_data)?;
                }
                let b = self.image.block_mut(header)?;
                let mut hdr = Header::new(&mut *b);
                hdr.set_first_data(0);
                for slot in 0..MAX_DATABLOCKS {
                    hdr.set_table_entry(slot, 0);
                }
                hdr.set_high_seq(0);
                update_checksum(b, HEADER_CHECKSUM_WORD);
            } else {
                // Bounded by the 72-block ceiling, so no cycle guard needed.
                let mut cur = first_data;
                let mut seq = 1u32;
                while seq < keep && cur != 0 {
                    cur = DataBlock::new(self.image.read_block(cur)?).next_data();
                    seq += 1;
                }
                // The chain can be shorter than `keep` for sparse files;
                // then there is nothing to trim.
                if cur != 0 && seq == keep {
                    let tail = DataBlock::new(self.image.read_block(cur)?).next_data();
                    let term = match new_size % OFS_DATA_SIZE as u32 {
                        0 => OFS_DATA_SIZE as u32,
                        rem => rem,
                    };
                    {
                        let b = self.image.block_mut(cur)?;
                        let mut db = DataBlock::new(&mut *b);
                        db.set_next_data(0);
                        db.set_data_size(term);
                        update_checksum(b, HEADER_CHECKSUM_WORD);
                    }
                    if tail != 0 {
                        self.free_data_chain(tail)?;
                    }
                }
                let b = self.image.block_mut(header)?;
                let mut hdr = Header::new(&mut *b);
                for seq in keep + 1..=MAX_DATABLOCKS as u32 {
                    hdr.set_table_entry(MAX_DATABLOCKS - seq as usize, 0);
                }
                if hdr.high_seq() > keep {
                    hdr.set_high_seq(keep);
                }
                update_checksum(b, HEADER_CHECKSUM_WORD);
            }
        }

        {
            let b = self.image.block_mut(header)?;
            Header::new(&mut *b).set_byte_size(new_size);
            update_checksum(b, HEADER_CHECKSUM_WORD);
        }
        self.touch_header(header)
    }

    /// Allocate and initialise data block number `seq` (1-based) of a file,
    /// recording it in the header's data-block table.
    fn alloc_data_block(&mut self, header: u32, seq: u32) -> Result<u32> {
        if seq as usize > MAX_DATABLOCKS {
            // The 72-entry table is full and extension blocks are not
            // supported: the file is at its size ceiling.
            return Err(AdfError::NoSpace);
        }
        let block = self.allocate()?;
        {
            let b = self.image.block_mut(block)?;
            DataBlock::new(&mut *b).init(header, seq);
            update_checksum(b, HEADER_CHECKSUM_WORD);
        }
        {
            let b = self.image.block_mut(header)?;
            let mut hdr = Header::new(&mut *b);
            hdr.set_table_entry(MAX_DATABLOCKS - seq as usize, block);
            if hdr.high_seq() < seq {
                hdr.set_high_seq(seq);
            }
            update_checksum(b, HEADER_CHECKSUM_WORD);
        }
        Ok(block)
    }

    /// Free every block of a data chain.
    pub(crate) fn free_data_chain(&mut self, first: u32) -> Result<()> {
        let total = self.image.total_blocks();
        let mut cur = first;
        let mut steps = 0u32;
        while cur != 0 {
            let next = DataBlock::new(self.image.read_block(cur)?).next_data();
            self.free_block(cur)?;
            cur = next;
            steps += 1;
            if steps > total {
                return Err(AdfError::Corrupt {
                    block: first,
                    detail: "cycle in data chain".to_string(),
                });
            }
        }
        Ok(())
    }
}
