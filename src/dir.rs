// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};

use crate::block::{update_checksum, Header, SecType, HEADER_CHECKSUM_WORD};
use crate::consts::HASH_TABLE_SIZE;
use crate::error::{AdfError, Result};
use crate::volume::Volume;

/// A directory entry as seen by the façade and the host binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub block: u32,
    pub is_dir: bool,
    pub size: u32,
    pub mtime: i64,
}

/// AmigaDOS directory hash: seed with the length, then `h = h*13 + upper(c)`
/// over the bytes, all wrapping; bucket is `h mod 72`. Only ASCII case is
/// folded.
pub fn hash_name(name: &str) -> u32 {
    let mut h = name.len() as u32;
    for &b in name.as_bytes() {
        h = h.wrapping_mul(13).wrapping_add(b.to_ascii_uppercase() as u32);
    }
    h % HASH_TABLE_SIZE as u32
}

impl Volume {
    fn chain_cycle(&self, block: u32) -> AdfError {
        AdfError::Corrupt {
            block,
            detail: "cycle in hash chain".to_string(),
        }
    }

    /// Build an [`Entry`] from a header block. Headers with an empty name
    /// yield `None` and are skipped by listings.
    fn header_entry(&self, block: u32) -> Result<Option<Entry>> {
        let hdr = Header::new(self.image.read_block(block)?);
        let name = hdr.name();
        if name.is_empty() {
            return Ok(None);
        }
        let is_dir = match hdr.sec_type() {
            Some(SecType::Dir) | Some(SecType::Root) => true,
            Some(SecType::File) => false,
            None => {
                return Err(AdfError::Corrupt {
                    block,
                    detail: format!("impossible sec_type {}", hdr.sec_type_raw()),
                })
            }
        };
        Ok(Some(Entry {
            name,
            block,
            is_dir,
            size: if is_dir { 0 } else { hdr.byte_size() },
            mtime: hdr.date().to_unix(),
        }))
    }

    /// Look up `name` in a directory, comparing names byte-exactly.
    pub fn dir_lookup(&self, dir_block: u32, name: &str) -> Result<Option<u32>> {
        let bucket = hash_name(name) as usize;
        let mut cur = Header::new(self.image.read_block(dir_block)?).table_entry(bucket);
        let mut steps = 0u32;
        while cur != 0 {
            let hdr = Header::new(self.image.read_block(cur)?);
            if hdr.name() == name {
                return Ok(Some(cur));
            }
            cur = hdr.hash_chain();
            steps += 1;
            if steps > self.total_blocks() {
                return Err(self.chain_cycle(dir_block));
            }
        }
        Ok(None)
    }

    /// Enumerate every entry of a directory. Empty-named headers are
    /// skipped, but the chain walk always continues to its terminator.
    pub fn dir_list(&self, dir_block: u32) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for bucket in 0..HASH_TABLE_SIZE {
            let mut cur = Header::new(self.image.read_block(dir_block)?).table_entry(bucket);
            let mut steps = 0u32;
            while cur != 0 {
                if let Some(entry) = self.header_entry(cur)? {
                    entries.push(entry);
                }
                cur = Header::new(self.image.read_block(cur)?).hash_chain();
                steps += 1;
                if steps > self.total_blocks() {
                    return Err(self.chain_cycle(dir_block));
                }
            }
        }
        Ok(entries)
    }

    /// True when every hash slot of the directory is empty.
    pub fn dir_is_empty(&self, dir_block: u32) -> Result<bool> {
        let hdr = Header::new(self.image.read_block(dir_block)?);
        Ok((0..HASH_TABLE_SIZE).all(|slot| hdr.table_entry(slot) == 0))
    }

    /// Insert `child` at the head of its hash bucket.
    pub(crate) fn dir_insert(&mut self, dir_block: u32, child: u32, name: &str) -> Result<()> {
        let bucket = hash_name(name) as usize;
        let prev = Header::new(self.image.read_block(dir_block)?).table_entry(bucket);
        {
            let buf = self.image.block_mut(child)?;
            Header::new(&mut *buf).set_hash_chain(prev);
            update_checksum(buf, HEADER_CHECKSUM_WORD);
        }
        {
            let buf = self.image.block_mut(dir_block)?;
            Header::new(&mut *buf).set_table_entry(bucket, child);
        }
        self.touch_header(dir_block)
    }

    /// Unlink `child` from its hash bucket, splicing the chain around it.
    pub(crate) fn dir_remove(&mut self, dir_block: u32, child: u32, name: &str) -> Result<()> {
        let bucket = hash_name(name) as usize;
        let child_next = Header::new(self.image.read_block(child)?).hash_chain();
        let head = Header::new(self.image.read_block(dir_block)?).table_entry(bucket);

        if head == child {
            let buf = self.image.block_mut(dir_block)?;
            Header::new(&mut *buf).set_table_entry(bucket, child_next);
        } else {
            let mut cur = head;
            let mut steps = 0u32;
            loop {
                if cur == 0 {
                    return Err(AdfError::NotFound);
                }
                let next = Header::new(self.image.read_block(cur)?).hash_chain();
                if next == child {
                    let buf = self.image.block_mut(cur)?;
                    Header::new(&mut *buf).set_hash_chain(child_next);
                    update_checksum(buf, HEADER_CHECKSUM_WORD);
                    break;
                }
                cur = next;
                steps += 1;
                if steps > self.total_blocks() {
                    return Err(self.chain_cycle(dir_block));
                }
            }
        }
        self.touch_header(dir_block)
    }
}
