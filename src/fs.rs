// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Path-indexed operations consumed by the host-filesystem binding.
//!
//! Paths are absolute, `/`-separated and matched byte-exactly. Listings are
//! cached per directory path; every mutation drops the whole cache.

use crate::block::{update_checksum, Header, HEADER_CHECKSUM_WORD};
use crate::consts::{MAX_NAME_LEN, ST_DIR, ST_FILE, T_HEADER};
use crate::date::AmigaDate;
use crate::dir::Entry;
use crate::error::{AdfError, Result};
use crate::volume::Volume;

fn canonical(path: &str) -> String {
    let mut out = String::from("/");
    for comp in path.split('/').filter(|c| !c.is_empty()) {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(comp);
    }
    out
}

/// Split a canonical path into (parent path, final component).
fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(index) => (&path[..index], &path[index + 1..]),
        None => ("/", path),
    }
}

impl Volume {
    fn root_entry(&self) -> Result<Entry> {
        let hdr = Header::new(self.image.read_block(self.root_block())?);
        Ok(Entry {
            name: String::new(),
            block: self.root_block(),
            is_dir: true,
            size: 0,
            mtime: hdr.date().to_unix(),
        })
    }

    fn list_cached(&mut self, path: &str, dir_block: u32) -> Result<Vec<Entry>> {
        if let Some(entries) = self.dir_cache.get(path) {
            return Ok(entries.clone());
        }
        let entries = self.dir_list(dir_block)?;
        self.dir_cache.insert(path.to_string(), entries.clone());
        Ok(entries)
    }

    fn lookup_entry(&mut self, path: &str) -> Result<Entry> {
        let path = canonical(path);
        if path == "/" {
            return self.root_entry();
        }
        let (parent, name) = split_path(&path);
        let parent = parent.to_string();
        let dir_block = self.resolve_dir(&parent)?;
        let entries = self.list_cached(&parent, dir_block)?;
        entries
            .into_iter()
            .find(|e| e.name == name)
            .ok_or(AdfError::NotFound)
    }

    fn resolve_dir(&mut self, path: &str) -> Result<u32> {
        let path = canonical(path);
        if path == "/" {
            return Ok(self.root_block());
        }
        let entry = self.lookup_entry(&path)?;
        if !entry.is_dir {
            return Err(AdfError::NotDirectory);
        }
        Ok(entry.block)
    }

    fn invalidate_cache(&mut self) {
        self.dir_cache.clear();
    }

    /// Validate and split a destination path for create/mkdir.
    fn destination(&mut self, path: &str) -> Result<(u32, String)> {
        let path = canonical(path);
        if path == "/" {
            return Err(AdfError::Exists);
        }
        let (parent, name) = split_path(&path);
        if name.len() > MAX_NAME_LEN {
            return Err(AdfError::NameTooLong);
        }
        let parent = parent.to_string();
        let name = name.to_string();
        let parent_block = self.resolve_dir(&parent)?;
        if self.dir_lookup(parent_block, &name)?.is_some() {
            return Err(AdfError::Exists);
        }
        Ok((parent_block, name))
    }

    fn new_header(&mut self, parent_block: u32, name: &str, sec_type: i32) -> Result<u32> {
        let block = self.allocate()?;
        let now = AmigaDate::now();
        {
            let buf = self.image.block_mut(block)?;
            let mut hdr = Header::new(&mut *buf);
            hdr.set_block_type(T_HEADER);
            hdr.set_header_key(block);
            hdr.set_parent(parent_block);
            hdr.set_sec_type(sec_type);
            hdr.set_name(name);
            hdr.set_date(now);
            update_checksum(buf, HEADER_CHECKSUM_WORD);
        }
        self.dir_insert(parent_block, block, name)?;
        Ok(block)
    }

    /// Metadata for the entry at `path`.
    pub fn getattr(&mut self, path: &str) -> Result<Entry> {
        self.lookup_entry(path)
    }

    /// List a directory. "." and ".." are the binding's concern.
    pub fn readdir(&mut self, path: &str) -> Result<Vec<Entry>> {
        let path = canonical(path);
        let dir_block = self.resolve_dir(&path)?;
        self.list_cached(&path, dir_block)
    }

    /// Resolve `path` to its header block, the opaque file handle.
    pub fn open(&mut self, path: &str, write: bool) -> Result<u32> {
        if write && self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let entry = self.lookup_entry(path)?;
        if entry.is_dir {
            return Err(AdfError::IsDirectory);
        }
        Ok(entry.block)
    }

    pub fn read(&self, handle: u32, offset: u64, size: u32) -> Result<Vec<u8>> {
        self.file_read(handle, offset, size)
    }

    pub fn write(&mut self, handle: u32, data: &[u8], offset: u64) -> Result<usize> {
        let written = self.file_write(handle, data, offset)?;
        self.invalidate_cache();
        Ok(written)
    }

    pub fn create(&mut self, path: &str) -> Result<u32> {
        if self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let (parent_block, name) = self.destination(path)?;
        let block = self.new_header(parent_block, &name, ST_FILE)?;
        self.invalidate_cache();
        Ok(block)
    }

    pub fn mkdir(&mut self, path: &str) -> Result<u32> {
        if self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let (parent_block, name) = self.destination(path)?;
        let block = self.new_header(parent_block, &name, ST_DIR)?;
        self.invalidate_cache();
        Ok(block)
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        if self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let entry = self.lookup_entry(path)?;
        if entry.is_dir {
            return Err(AdfError::IsDirectory);
        }
        let path = canonical(path);
        let (parent, _) = split_path(&path);
        let parent_block = self.resolve_dir(parent)?;
        self.dir_remove(parent_block, entry.block, &entry.name)?;
        let first_data = Header::new(self.image.read_block(entry.block)?).first_data();
        if first_data != 0 {
            self.free_data_chain(first_data)?;
        }
        self.free_block(entry.block)?;
        self.invalidate_cache();
        Ok(())
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
        if self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let entry = self.lookup_entry(path)?;
        if entry.is_dir {
            return Err(AdfError::IsDirectory);
        }
        let size = u32::try_from(size).map_err(|_| AdfError::NoSpace)?;
        self.file_truncate(entry.block, size)?;
        self.invalidate_cache();
        Ok(())
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        if self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let path = canonical(path);
        if path == "/" {
            return Err(AdfError::Invalid(
                "cannot remove the root directory".to_string(),
            ));
        }
        let entry = self.lookup_entry(&path)?;
        if !entry.is_dir {
            return Err(AdfError::NotDirectory);
        }
        if !self.dir_is_empty(entry.block)? {
            return Err(AdfError::NotEmpty);
        }
        let (parent, _) = split_path(&path);
        let parent_block = self.resolve_dir(parent)?;
        self.dir_remove(parent_block, entry.block, &entry.name)?;
        self.free_block(entry.block)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Stamp an explicit modification time onto an entry.
    pub fn set_mtime(&mut self, path: &str, mtime: i64) -> Result<()> {
        if self.is_read_only() {
            return Err(AdfError::ReadOnly);
        }
        let entry = self.lookup_entry(path)?;
        self.set_header_date(entry.block, AmigaDate::from_unix(mtime))?;
        self.invalidate_cache();
        Ok(())
    }
}
