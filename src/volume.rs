// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::block::{
    update_checksum, BitmapBlock, BootBlock, DataBlock, Header, RootBlock, SecType,
    BITMAP_CHECKSUM_WORD, HEADER_CHECKSUM_WORD,
};
use crate::consts::*;
use crate::date::AmigaDate;
use crate::dir::Entry;
use crate::error::{AdfError, Result};
use crate::image::DiskImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskType {
    OFS,
    FFS,
}

impl DiskType {
    pub fn fs_byte(self) -> u8 {
        match self {
            DiskType::OFS => DOSFS_OFS,
            DiskType::FFS => DOSFS_FFS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub filesystem: String,
    pub volume_name: String,
    pub disk_size: u64,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub used_blocks: u32,
    pub heads: u8,
    pub sectors_per_track: u8,
    pub cylinders: u32,
    pub hash_table_size: u32,
    pub modified: i64,
    pub read_only: bool,
}

/// A mounted ADF volume: the byte image plus the in-memory allocation sets
/// and the directory cache.
pub struct Volume {
    pub(crate) image: DiskImage,
    root_block: u32,
    ffs: bool,
    name: String,
    free: BTreeSet<u32>,
    used: BTreeSet<u32>,
    pub(crate) dir_cache: HashMap<String, Vec<Entry>>,
}

impl Volume {
    pub fn open(path: &Path) -> Result<Self> {
        Self::mount(DiskImage::open(path)?)
    }

    /// Parse the image and build the free/used block sets.
    pub fn mount(image: DiskImage) -> Result<Self> {
        let root_block = ROOT_BLOCK_DD;
        if root_block >= image.total_blocks() {
            return Err(AdfError::InvalidImage(format!(
                "image of {} blocks has no room for a root block at {}",
                image.total_blocks(),
                root_block
            )));
        }

        let boot = BootBlock::new(image.read_block(0)?);
        let ffs = boot.is_ffs();
        if !boot.dos_prefix_ok() {
            debug!("boot block has no DOS tag, assuming DD floppy geometry");
        }

        let root = Header::new(image.read_block(root_block)?);
        if root.block_type() != T_HEADER {
            return Err(AdfError::InvalidImage(format!(
                "root block type {} is not a header",
                root.block_type()
            )));
        }
        if !matches!(root.sec_type(), Some(SecType::Root)) {
            return Err(AdfError::InvalidImage(format!(
                "root block sec_type {} is not a root",
                root.sec_type_raw()
            )));
        }
        let name = RootBlock::new(image.read_block(root_block)?).volume_name();

        let mut volume = Self {
            image,
            root_block,
            ffs,
            name,
            free: BTreeSet::new(),
            used: BTreeSet::new(),
            dir_cache: HashMap::new(),
        };
        volume.build_block_sets().map_err(|e| match e {
            AdfError::Corrupt { block, detail } => {
                AdfError::InvalidImage(format!("block {block}: {detail}"))
            }
            other => other,
        })?;

        info!(
            name = %volume.name,
            ffs = volume.ffs,
            read_only = volume.image.is_read_only(),
            free = volume.free.len(),
            "mounted volume"
        );
        Ok(volume)
    }

    /// Write a fresh filesystem onto the image and mount it.
    pub fn format(mut image: DiskImage, disk_type: DiskType, name: &str) -> Result<Self> {
        if name.len() > MAX_NAME_LEN {
            return Err(AdfError::NameTooLong);
        }
        let total = image.total_blocks();
        let root_block = ROOT_BLOCK_DD;
        let bitmap_block = root_block + 1;
        if bitmap_block >= total {
            return Err(AdfError::InvalidImage(format!(
                "image of {total} blocks is too small to format"
            )));
        }

        for b in 0..total {
            image.block_mut(b)?.fill(0);
        }

        BootBlock::new(image.block_mut(0)?).set_dos_type(disk_type.fs_byte());

        let now = AmigaDate::now();
        {
            let buf = image.block_mut(root_block)?;
            let mut hdr = Header::new(&mut *buf);
            hdr.set_block_type(T_HEADER);
            hdr.set_sec_type(ST_ROOT);
            hdr.set_date(now);
            let mut root = RootBlock::new(&mut *buf);
            root.set_hash_table_size(HASH_TABLE_SIZE as u32);
            root.set_bm_flag(u32::MAX);
            root.set_bm_page(0, bitmap_block);
            root.set_volume_name(name);
            root.set_volume_date(now);
            root.set_creation_date(now);
            update_checksum(buf, HEADER_CHECKSUM_WORD);
        }

        {
            let buf = image.block_mut(bitmap_block)?;
            let mut bm = BitmapBlock::new(&mut *buf);
            for word in 0..BM_WORDS {
                bm.set_map_word(word, u32::MAX);
            }
            for b in [0, 1, root_block, bitmap_block] {
                let rem = b % BLOCKS_PER_BM_PAGE;
                bm.set_bit((rem / 32) as usize, (rem % 32) as usize, false);
            }
            update_checksum(buf, BITMAP_CHECKSUM_WORD);
        }

        info!(name, ?disk_type, "formatted volume");
        Self::mount(image)
    }

    fn build_block_sets(&mut self) -> Result<()> {
        let total = self.image.total_blocks();
        self.free = (2..total).collect();
        self.used = BTreeSet::new();
        self.used.insert(0);
        self.used.insert(1);

        // Bitmap pass: a clear bit means the block is used.
        for page in 0..BM_PAGES_ROOT {
            let bm_block = RootBlock::new(self.image.read_block(self.root_block)?).bm_page(page);
            if bm_block == 0 {
                continue;
            }
            if bm_block >= total {
                warn!(bm_block, page, "bitmap page out of range, ignoring");
                continue;
            }
            self.mark_used(bm_block);
            let base = page as u32 * BLOCKS_PER_BM_PAGE;
            for word in 0..BM_WORDS {
                let map_word = BitmapBlock::new(self.image.read_block(bm_block)?).map_word(word);
                for bit in 0..32u32 {
                    let block = base + word as u32 * 32 + bit;
                    if block >= total {
                        break;
                    }
                    if map_word & (1 << bit) == 0 {
                        self.mark_used(block);
                    }
                }
            }
        }

        self.mark_used(self.root_block);
        self.scan_reachable()?;
        Ok(())
    }

    /// Walk every header reachable from the root hash table, marking
    /// headers, hash chains and data chains as used. In a well-formed
    /// tree every block is referenced exactly once, so both walks are
    /// capped at `total_blocks` steps and a cyclic chain is reported as
    /// corruption instead of being absorbed.
    fn scan_reachable(&mut self) -> Result<()> {
        let total = self.image.total_blocks();
        let mut stack: Vec<u32> = Vec::new();
        for slot in 0..HASH_TABLE_SIZE {
            let child = Header::new(self.image.read_block(self.root_block)?).table_entry(slot);
            if child != 0 {
                stack.push(child);
            }
        }

        let mut steps = 0u32;
        while let Some(block) = stack.pop() {
            steps += 1;
            if steps > total {
                return Err(AdfError::Corrupt {
                    block,
                    detail: "cycle in directory tree".to_string(),
                });
            }
            let buf = match self.image.read_block(block) {
                Ok(b) => b,
                Err(_) => {
                    warn!(block, "reachable block out of range, skipping");
                    continue;
                }
            };
            let hdr = Header::new(buf);
            let sec_type = hdr.sec_type();
            let first_data = hdr.first_data();
            let hash_chain = hdr.hash_chain();
            let mut children = Vec::new();
            if matches!(sec_type, Some(SecType::Root) | Some(SecType::Dir)) {
                for slot in 0..HASH_TABLE_SIZE {
                    let child = hdr.table_entry(slot);
                    if child != 0 {
                        children.push(child);
                    }
                }
            }
            self.mark_used(block);
            stack.extend(children);
            if hash_chain != 0 {
                stack.push(hash_chain);
            }

            if matches!(sec_type, Some(SecType::File)) {
                let mut data = first_data;
                let mut chain_steps = 0u32;
                while data != 0 {
                    chain_steps += 1;
                    if chain_steps > total {
                        return Err(AdfError::Corrupt {
                            block: data,
                            detail: "cycle in data chain".to_string(),
                        });
                    }
                    self.mark_used(data);
                    data = match self.image.read_block(data) {
                        Ok(b) => DataBlock::new(b).next_data(),
                        Err(_) => {
                            warn!(data, "data block out of range, stopping chain walk");
                            0
                        }
                    };
                }
            }
        }
        Ok(())
    }

    fn mark_used(&mut self, block: u32) {
        self.free.remove(&block);
        self.used.insert(block);
    }

    /// Allocate the lowest-numbered free block, flip its bitmap bit and
    /// zero it.
    pub fn allocate(&mut self) -> Result<u32> {
        let Some(&block) = self.free.iter().next() else {
            return Err(AdfError::NoSpace);
        };
        self.free.remove(&block);
        if let Err(e) = self.set_bitmap_bit(block, false) {
            self.free.insert(block);
            return Err(e);
        }
        self.image.block_mut(block)?.fill(0);
        self.used.insert(block);
        Ok(block)
    }

    /// Return a block to the free pool. System blocks are refused.
    pub fn free_block(&mut self, block: u32) -> Result<()> {
        if block < 2 || block == self.root_block {
            return Err(AdfError::Invalid(format!(
                "refusing to free system block {block}"
            )));
        }
        self.set_bitmap_bit(block, true)?;
        self.used.remove(&block);
        self.free.insert(block);
        Ok(())
    }

    fn set_bitmap_bit(&mut self, block: u32, free: bool) -> Result<()> {
        let page = (block / BLOCKS_PER_BM_PAGE) as usize;
        if page >= BM_PAGES_ROOT {
            return Err(AdfError::NoSpace);
        }
        let bm_block = RootBlock::new(self.image.read_block(self.root_block)?).bm_page(page);
        if bm_block == 0 {
            // Bitmap extension blocks are not supported.
            return Err(AdfError::NoSpace);
        }
        let rem = block % BLOCKS_PER_BM_PAGE;
        let buf = self.image.block_mut(bm_block)?;
        BitmapBlock::new(&mut *buf).set_bit((rem / 32) as usize, (rem % 32) as usize, free);
        update_checksum(buf, BITMAP_CHECKSUM_WORD);
        Ok(())
    }

    /// Stamp `date` into a header block and refresh its checksum.
    pub(crate) fn set_header_date(&mut self, block: u32, date: AmigaDate) -> Result<()> {
        let buf = self.image.block_mut(block)?;
        Header::new(&mut *buf).set_date(date);
        update_checksum(buf, HEADER_CHECKSUM_WORD);
        Ok(())
    }

    pub(crate) fn touch_header(&mut self, block: u32) -> Result<()> {
        self.set_header_date(block, AmigaDate::now())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.image.flush()
    }

    pub fn info(&self) -> Result<VolumeInfo> {
        let total = self.image.total_blocks();
        let root = Header::new(self.image.read_block(self.root_block)?);
        let modified = root.date().to_unix();
        let ht_size = RootBlock::new(self.image.read_block(self.root_block)?).hash_table_size();
        let filesystem = if self.ffs { "FFS" } else { "OFS" };
        Ok(VolumeInfo {
            filesystem: filesystem.to_string(),
            volume_name: self.name.clone(),
            disk_size: total as u64 * BLOCK_SIZE as u64,
            total_blocks: total,
            free_blocks: self.free.len() as u32,
            used_blocks: self.used.len() as u32,
            heads: 2,
            sectors_per_track: 11,
            cylinders: total / 22,
            hash_table_size: ht_size,
            modified,
            read_only: self.image.is_read_only(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ffs(&self) -> bool {
        self.ffs
    }

    pub fn is_read_only(&self) -> bool {
        self.image.is_read_only()
    }

    pub fn root_block(&self) -> u32 {
        self.root_block
    }

    pub fn total_blocks(&self) -> u32 {
        self.image.total_blocks()
    }

    pub fn free_count(&self) -> u32 {
        self.free.len() as u32
    }

    pub fn free_set(&self) -> &BTreeSet<u32> {
        &self.free
    }

    pub fn used_set(&self) -> &BTreeSet<u32> {
        &self.used
    }
}
