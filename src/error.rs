// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use thiserror::Error;

/// Error type for all volume operations, with errno mappings for the
/// host-filesystem binding.
#[derive(Debug, Error)]
pub enum AdfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("corrupt block {block}: {detail}")]
    Corrupt { block: u32, detail: String },

    #[error("not found")]
    NotFound,

    #[error("file exists")]
    Exists,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,

    #[error("directory not empty")]
    NotEmpty,

    #[error("name too long")]
    NameTooLong,

    #[error("no space left on volume")]
    NoSpace,

    #[error("volume is read-only")]
    ReadOnly,

    #[error("invalid argument: {0}")]
    Invalid(String),
}

impl AdfError {
    /// Convert this error into a POSIX errno suitable for FUSE replies.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::InvalidImage(_) | Self::Corrupt { .. } => libc::EIO,
            Self::NotFound => libc::ENOENT,
            Self::Exists => libc::EEXIST,
            Self::NotDirectory => libc::ENOTDIR,
            Self::IsDirectory => libc::EISDIR,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::NoSpace => libc::ENOSPC,
            Self::ReadOnly => libc::EROFS,
            Self::Invalid(_) => libc::EINVAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdfError>;
