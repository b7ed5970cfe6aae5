// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! FUSE adapter: a thin translation layer between kernel requests arriving
//! via the `fuser` crate and the path-indexed volume façade. Errors are
//! mapped through [`AdfError::to_errno`].
//!
//! Inode numbers are header block numbers, with the root block pinned to
//! inode 1; the same block number doubles as the file handle.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow, FUSE_ROOT_ID,
};
use tracing::warn;

use crate::consts::{BLOCK_SIZE, MAX_NAME_LEN};
use crate::dir::Entry;
use crate::error::AdfError;
use crate::volume::Volume;

/// Attribute TTL; short because the volume is writable.
const ATTR_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MountOptions {
    pub read_only: bool,
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            allow_other: false,
            auto_unmount: true,
        }
    }
}

pub struct AdfFuse {
    volume: Volume,
    paths: HashMap<u64, String>,
}

impl AdfFuse {
    pub fn new(volume: Volume) -> Self {
        let mut paths = HashMap::new();
        paths.insert(FUSE_ROOT_ID, "/".to_string());
        Self { volume, paths }
    }

    fn ino_of(&self, block: u32) -> u64 {
        if block == self.volume.root_block() {
            FUSE_ROOT_ID
        } else {
            u64::from(block)
        }
    }

    fn block_of(&self, ino: u64) -> u32 {
        if ino == FUSE_ROOT_ID {
            self.volume.root_block()
        } else {
            ino as u32
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).cloned()
    }

    fn child_path(parent: &str, name: &str) -> String {
        if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        }
    }

    fn parent_path(path: &str) -> String {
        match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(index) => path[..index].to_string(),
        }
    }

    fn attr(&self, entry: &Entry, uid: u32, gid: u32) -> FileAttr {
        let read_only = self.volume.is_read_only();
        let (kind, perm, nlink) = if entry.is_dir {
            (FileType::Directory, if read_only { 0o555 } else { 0o755 }, 2)
        } else {
            (
                FileType::RegularFile,
                if read_only { 0o444 } else { 0o644 },
                1,
            )
        };
        let mtime = UNIX_EPOCH + Duration::from_secs(entry.mtime.max(0) as u64);
        FileAttr {
            ino: self.ino_of(entry.block),
            size: u64::from(entry.size),
            blocks: u64::from(entry.size.div_ceil(BLOCK_SIZE as u32)),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm,
            nlink,
            uid,
            gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        }
    }
}

fn name_str(name: &OsStr) -> Option<&str> {
    name.to_str()
}

impl Filesystem for AdfFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(e) = self.volume.flush() {
            warn!(error = %e, "flush on unmount failed");
        }
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name_str(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match self.volume.getattr(&path) {
            Ok(entry) => {
                let attr = self.attr(&entry, req.uid(), req.gid());
                self.paths.insert(attr.ino, path);
                reply.entry(&ATTR_TTL, &attr, 0);
            }
            Err(e) => {
                if e.to_errno() != libc::ENOENT {
                    warn!(parent, name, error = %e, "lookup failed");
                }
                reply.error(e.to_errno());
            }
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.volume.getattr(&path) {
            Ok(entry) => reply.attr(&ATTR_TTL, &self.attr(&entry, req.uid(), req.gid())),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Some(size) = size {
            if let Err(e) = self.volume.truncate(&path, size) {
                warn!(ino, size, error = %e, "truncate failed");
                reply.error(e.to_errno());
                return;
            }
        }
        if let Some(mtime) = mtime {
            let secs = match mtime {
                TimeOrNow::SpecificTime(t) => t
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0),
                TimeOrNow::Now => SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0),
            };
            if let Err(e) = self.volume.set_mtime(&path, secs) {
                reply.error(e.to_errno());
                return;
            }
        }
        match self.volume.getattr(&path) {
            Ok(entry) => reply.attr(&ATTR_TTL, &self.attr(&entry, req.uid(), req.gid())),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.volume.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(ino, error = %e, "readdir failed");
                reply.error(e.to_errno());
                return;
            }
        };
        let parent_ino = match self.volume.getattr(&Self::parent_path(&path)) {
            Ok(parent) => self.ino_of(parent.block),
            Err(_) => FUSE_ROOT_ID,
        };

        let mut listing: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for entry in entries {
            let kind = if entry.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            listing.push((self.ino_of(entry.block), kind, entry.name));
        }
        for (i, (entry_ino, kind, name)) in
            listing.into_iter().enumerate().skip(offset.max(0) as usize)
        {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let write = flags & (libc::O_WRONLY | libc::O_RDWR) != 0;
        match self.volume.open(&path, write) {
            Ok(block) => reply.opened(u64::from(block), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let block = if fh != 0 { fh as u32 } else { self.block_of(ino) };
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.volume.read(block, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                warn!(ino, offset, size, error = %e, "read failed");
                reply.error(e.to_errno());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let block = if fh != 0 { fh as u32 } else { self.block_of(ino) };
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.volume.write(block, data, offset) {
            Ok(written) => reply.written(written as u32),
            Err(e) => {
                warn!(ino, offset, error = %e, "write failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match self
            .volume
            .create(&path)
            .and_then(|block| self.volume.getattr(&path).map(|e| (block, e)))
        {
            Ok((block, entry)) => {
                let attr = self.attr(&entry, req.uid(), req.gid());
                self.paths.insert(attr.ino, path);
                reply.created(&ATTR_TTL, &attr, 0, u64::from(block), 0);
            }
            Err(e) => {
                warn!(parent, name, error = %e, "create failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        match self
            .volume
            .mkdir(&path)
            .and_then(|_| self.volume.getattr(&path))
        {
            Ok(entry) => {
                let attr = self.attr(&entry, req.uid(), req.gid());
                self.paths.insert(attr.ino, path);
                reply.entry(&ATTR_TTL, &attr, 0);
            }
            Err(e) => {
                warn!(parent, name, error = %e, "mkdir failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name_str(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        let ino = self.volume.getattr(&path).map(|e| self.ino_of(e.block)).ok();
        match self.volume.unlink(&path) {
            Ok(()) => {
                if let Some(ino) = ino {
                    self.paths.remove(&ino);
                }
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name_str(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        let ino = self.volume.getattr(&path).map(|e| self.ino_of(e.block)).ok();
        match self.volume.rmdir(&path) {
            Ok(()) => {
                if let Some(ino) = ino {
                    self.paths.remove(&ino);
                }
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let total = u64::from(self.volume.total_blocks());
        let free = u64::from(self.volume.free_count());
        reply.statfs(
            total,
            free,
            free,
            0,
            0,
            BLOCK_SIZE as u32,
            MAX_NAME_LEN as u32,
            BLOCK_SIZE as u32,
        );
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.volume.flush() {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.volume.flush() {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }
}

fn build_mount_options(volume: &Volume, options: &MountOptions) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::FSName("adffs".to_owned()),
        MountOption::Subtype("adf".to_owned()),
        MountOption::DefaultPermissions,
        MountOption::NoAtime,
    ];
    if options.read_only || volume.is_read_only() {
        opts.push(MountOption::RO);
    }
    if options.allow_other {
        opts.push(MountOption::AllowOther);
    }
    if options.auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }
    opts
}

/// Mount a volume at the given mountpoint; blocks until unmounted.
pub fn mount(
    volume: Volume,
    mountpoint: impl AsRef<Path>,
    options: &MountOptions,
) -> Result<(), AdfError> {
    let mountpoint = mountpoint.as_ref();
    if mountpoint.as_os_str().is_empty() {
        return Err(AdfError::Invalid("mountpoint cannot be empty".to_string()));
    }
    let opts = build_mount_options(&volume, options);
    let fs = AdfFuse::new(volume);
    fuser::mount2(fs, mountpoint, &opts)?;
    Ok(())
}
