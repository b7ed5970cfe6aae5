// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::warn;
use zip::ZipArchive;

use crate::consts::{ADF_DD_SIZE, BLOCK_SIZE, BOOT_BLOCK_SIZE};
use crate::error::{AdfError, Result};

/// A fixed-size byte image addressed as 512-byte blocks.
///
/// The whole image is held in memory; `flush` writes it back to the backing
/// file, if any. Zip-packed images have no backing file and are read-only.
pub struct DiskImage {
    data: Vec<u8>,
    file: Option<File>,
    read_only: bool,
    dirty: bool,
}

impl DiskImage {
    /// Open an image file, preferring read/write access and falling back to
    /// read-only when the file permissions refuse writing. A `.zip` archive
    /// is searched for its first `.adf` member and opened read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
        {
            let mut raw = Vec::new();
            File::open(path)?.read_to_end(&mut raw)?;
            return Self::from_zip(&raw);
        }

        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(mut file) => {
                let mut data = Vec::new();
                file.read_to_end(&mut data)?;
                Self::validate(&data)?;
                Ok(Self {
                    data,
                    file: Some(file),
                    read_only: false,
                    dirty: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(path = %path.display(), "no write permission, mounting read-only");
                let mut data = Vec::new();
                File::open(path)?.read_to_end(&mut data)?;
                Self::validate(&data)?;
                Ok(Self {
                    data,
                    file: None,
                    read_only: true,
                    dirty: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create a blank double-density image file.
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let data = vec![0u8; ADF_DD_SIZE];
        file.write_all(&data)?;
        Ok(Self {
            data,
            file: Some(file),
            read_only: false,
            dirty: false,
        })
    }

    /// Wrap an in-memory image.
    pub fn from_bytes(data: Vec<u8>, read_only: bool) -> Result<Self> {
        Self::validate(&data)?;
        Ok(Self {
            data,
            file: None,
            read_only,
            dirty: false,
        })
    }

    /// Open an image strictly read-only, regardless of file permissions.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
        {
            let mut raw = Vec::new();
            File::open(path)?.read_to_end(&mut raw)?;
            return Self::from_zip(&raw);
        }
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        Self::validate(&data)?;
        Ok(Self {
            data,
            file: None,
            read_only: true,
            dirty: false,
        })
    }

    /// Extract the first `.adf` member of a zip archive as a read-only image.
    pub fn from_zip(zip_data: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(zip_data))
            .map_err(|e| AdfError::InvalidImage(format!("bad zip archive: {e}")))?;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| AdfError::InvalidImage(format!("bad zip entry: {e}")))?;
            if entry.name().to_ascii_lowercase().ends_with(".adf") {
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                return Self::from_bytes(data, true);
            }
        }
        Err(AdfError::InvalidImage(
            "no .adf member in zip archive".to_string(),
        ))
    }

    fn validate(data: &[u8]) -> Result<()> {
        if data.len() < BOOT_BLOCK_SIZE || data.len() % BLOCK_SIZE != 0 {
            return Err(AdfError::InvalidImage(format!(
                "image size {} must be a multiple of {} bytes and at least two blocks",
                data.len(),
                BLOCK_SIZE
            )));
        }
        Ok(())
    }

    pub fn total_blocks(&self) -> u32 {
        (self.data.len() / BLOCK_SIZE) as u32
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn read_block(&self, block: u32) -> Result<&[u8]> {
        if block >= self.total_blocks() {
            return Err(AdfError::Corrupt {
                block,
                detail: "block number out of range".to_string(),
            });
        }
        let offset = block as usize * BLOCK_SIZE;
        Ok(&self.data[offset..offset + BLOCK_SIZE])
    }

    pub fn block_mut(&mut self, block: u32) -> Result<&mut [u8]> {
        if self.read_only {
            return Err(AdfError::ReadOnly);
        }
        if block >= self.total_blocks() {
            return Err(AdfError::Corrupt {
                block,
                detail: "block number out of range".to_string(),
            });
        }
        self.dirty = true;
        let offset = block as usize * BLOCK_SIZE;
        Ok(&mut self.data[offset..offset + BLOCK_SIZE])
    }

    /// Write all dirty bytes back to the backing file.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty || self.read_only {
            return Ok(());
        }
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&self.data)?;
            file.sync_all()?;
        }
        self.dirty = false;
        Ok(())
    }
}

impl Drop for DiskImage {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush image on close");
        }
    }
}
