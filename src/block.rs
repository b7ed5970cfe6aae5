// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Typed views over 512-byte blocks and the Amiga block checksum.
//!
//! Root, directory and file headers share one layout: the 72-word table at
//! offset 24 is the hash table for directories and the data-block table for
//! files. All field access is big-endian via `codec`.

use crate::codec;
use crate::consts::*;
use crate::date::AmigaDate;

/// Checksum slot for header and data blocks (word 5).
pub const HEADER_CHECKSUM_WORD: usize = 5;
/// Checksum slot for bitmap blocks (word 0).
pub const BITMAP_CHECKSUM_WORD: usize = 0;

/// Byte offsets of on-disk fields.
pub mod off {
    pub const TYPE: usize = 0;
    pub const HEADER_KEY: usize = 4;
    pub const HIGH_SEQ: usize = 8;
    pub const HT_SIZE: usize = 12;
    pub const FIRST_DATA: usize = 16;
    pub const CHECKSUM: usize = 20;
    pub const TABLE: usize = 24;

    // Root block only.
    pub const BM_FLAG: usize = 312;
    pub const BM_PAGES: usize = 316;
    pub const BM_EXT: usize = 416;
    pub const V_DAYS: usize = 472;
    pub const C_DAYS: usize = 484;

    // File headers only.
    pub const PROTECT: usize = 320;
    pub const BYTE_SIZE: usize = 324;
    pub const COMMENT: usize = 328;

    pub const DAYS: usize = 420;
    pub const MINS: usize = 424;
    pub const TICKS: usize = 428;
    pub const NAME: usize = 432;

    pub const HASH_CHAIN: usize = 496;
    pub const PARENT: usize = 500;
    pub const EXTENSION: usize = 504;
    pub const SEC_TYPE: usize = 508;

    // OFS data blocks.
    pub const SEQ_NUM: usize = 8;
    pub const DATA_SIZE: usize = 12;
    pub const NEXT_DATA: usize = 16;
    pub const DATA_PAYLOAD: usize = 24;
}

/// Negated sum of the block's 128 big-endian words, with the checksum word
/// treated as zero.
pub fn checksum(block: &[u8], chk_word: usize) -> u32 {
    let mut sum = 0u32;
    for word in 0..WORDS_PER_BLOCK {
        if word != chk_word {
            sum = sum.wrapping_add(codec::read_u32(block, word * 4));
        }
    }
    0u32.wrapping_sub(sum)
}

/// Recompute and store the checksum in its slot.
pub fn update_checksum(block: &mut [u8], chk_word: usize) {
    let sum = checksum(block, chk_word);
    codec::write_u32(block, chk_word * 4, sum);
}

/// True when the stored checksum matches, i.e. all 128 words sum to zero.
pub fn verify_checksum(block: &[u8], chk_word: usize) -> bool {
    checksum(block, chk_word) == codec::read_u32(block, chk_word * 4)
}

/// Discriminant of an entry header, from the `sec_type` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecType {
    Root,
    Dir,
    File,
}

impl SecType {
    /// Decode a `sec_type` word; `0` is tolerated on root blocks of some
    /// formatters and decodes as `Root`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            ST_ROOT | 0 => Some(Self::Root),
            ST_DIR => Some(Self::Dir),
            ST_FILE => Some(Self::File),
            _ => None,
        }
    }
}

pub struct BootBlock<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> BootBlock<B> {
    pub fn new(buf: B) -> Self {
        Self { buf }
    }

    pub fn dos_prefix_ok(&self) -> bool {
        &self.buf.as_ref()[0..3] == DOS_PREFIX
    }

    pub fn fs_byte(&self) -> u8 {
        self.buf.as_ref()[3]
    }

    pub fn is_ffs(&self) -> bool {
        matches!(self.fs_byte(), DOSFS_FFS | DOSFS_FFS_INTL | DOSFS_FFS_DC)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BootBlock<B> {
    pub fn set_dos_type(&mut self, fs_byte: u8) {
        let b = self.buf.as_mut();
        b[0..3].copy_from_slice(DOS_PREFIX);
        b[3] = fs_byte;
    }
}

/// Entry header view: root, directory and file headers.
pub struct Header<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> Header<B> {
    pub fn new(buf: B) -> Self {
        Self { buf }
    }

    fn b(&self) -> &[u8] {
        self.buf.as_ref()
    }

    pub fn block_type(&self) -> u32 {
        codec::read_u32(self.b(), off::TYPE)
    }

    pub fn header_key(&self) -> u32 {
        codec::read_u32(self.b(), off::HEADER_KEY)
    }

    pub fn high_seq(&self) -> u32 {
        codec::read_u32(self.b(), off::HIGH_SEQ)
    }

    pub fn first_data(&self) -> u32 {
        codec::read_u32(self.b(), off::FIRST_DATA)
    }

    pub fn table_entry(&self, slot: usize) -> u32 {
        codec::read_u32(self.b(), off::TABLE + slot * 4)
    }

    pub fn byte_size(&self) -> u32 {
        codec::read_u32(self.b(), off::BYTE_SIZE)
    }

    pub fn name(&self) -> String {
        codec::bcpl_read(&self.b()[off::NAME..], MAX_NAME_LEN)
    }

    pub fn date(&self) -> AmigaDate {
        AmigaDate::new(
            codec::read_u32(self.b(), off::DAYS),
            codec::read_u32(self.b(), off::MINS),
            codec::read_u32(self.b(), off::TICKS),
        )
    }

    pub fn hash_chain(&self) -> u32 {
        codec::read_u32(self.b(), off::HASH_CHAIN)
    }

    pub fn parent(&self) -> u32 {
        codec::read_u32(self.b(), off::PARENT)
    }

    pub fn sec_type_raw(&self) -> i32 {
        codec::read_i32(self.b(), off::SEC_TYPE)
    }

    pub fn sec_type(&self) -> Option<SecType> {
        SecType::from_raw(self.sec_type_raw())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Header<B> {
    fn m(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    pub fn set_block_type(&mut self, v: u32) {
        codec::write_u32(self.m(), off::TYPE, v);
    }

    pub fn set_header_key(&mut self, v: u32) {
        codec::write_u32(self.m(), off::HEADER_KEY, v);
    }

    pub fn set_high_seq(&mut self, v: u32) {
        codec::write_u32(self.m(), off::HIGH_SEQ, v);
    }

    pub fn set_first_data(&mut self, v: u32) {
        codec::write_u32(self.m(), off::FIRST_DATA, v);
    }

    pub fn set_table_entry(&mut self, slot: usize, v: u32) {
        codec::write_u32(self.m(), off::TABLE + slot * 4, v);
    }

    pub fn set_byte_size(&mut self, v: u32) {
        codec::write_u32(self.m(), off::BYTE_SIZE, v);
    }

    pub fn set_name(&mut self, name: &str) {
        codec::bcpl_write(&mut self.m()[off::NAME..], name, MAX_NAME_LEN);
    }

    pub fn set_date(&mut self, date: AmigaDate) {
        codec::write_u32(self.m(), off::DAYS, date.days);
        codec::write_u32(self.m(), off::MINS, date.mins);
        codec::write_u32(self.m(), off::TICKS, date.ticks);
    }

    pub fn set_hash_chain(&mut self, v: u32) {
        codec::write_u32(self.m(), off::HASH_CHAIN, v);
    }

    pub fn set_parent(&mut self, v: u32) {
        codec::write_u32(self.m(), off::PARENT, v);
    }

    pub fn set_sec_type(&mut self, v: i32) {
        codec::write_i32(self.m(), off::SEC_TYPE, v);
    }
}

/// Root-block specifics on top of the shared header layout.
pub struct RootBlock<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> RootBlock<B> {
    pub fn new(buf: B) -> Self {
        Self { buf }
    }

    fn b(&self) -> &[u8] {
        self.buf.as_ref()
    }

    pub fn hash_table_size(&self) -> u32 {
        codec::read_u32(self.b(), off::HT_SIZE)
    }

    pub fn bm_flag(&self) -> u32 {
        codec::read_u32(self.b(), off::BM_FLAG)
    }

    pub fn bm_page(&self, index: usize) -> u32 {
        codec::read_u32(self.b(), off::BM_PAGES + index * 4)
    }

    pub fn volume_name(&self) -> String {
        codec::bcpl_read(&self.b()[off::NAME..], MAX_NAME_LEN)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RootBlock<B> {
    fn m(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    pub fn set_hash_table_size(&mut self, v: u32) {
        codec::write_u32(self.m(), off::HT_SIZE, v);
    }

    pub fn set_bm_flag(&mut self, v: u32) {
        codec::write_u32(self.m(), off::BM_FLAG, v);
    }

    pub fn set_bm_page(&mut self, index: usize, v: u32) {
        codec::write_u32(self.m(), off::BM_PAGES + index * 4, v);
    }

    pub fn set_volume_name(&mut self, name: &str) {
        codec::bcpl_write(&mut self.m()[off::NAME..], name, MAX_NAME_LEN);
    }

    pub fn set_volume_date(&mut self, date: AmigaDate) {
        codec::write_u32(self.m(), off::V_DAYS, date.days);
        codec::write_u32(self.m(), off::V_DAYS + 4, date.mins);
        codec::write_u32(self.m(), off::V_DAYS + 8, date.ticks);
    }

    pub fn set_creation_date(&mut self, date: AmigaDate) {
        codec::write_u32(self.m(), off::C_DAYS, date.days);
        codec::write_u32(self.m(), off::C_DAYS + 4, date.mins);
        codec::write_u32(self.m(), off::C_DAYS + 8, date.ticks);
    }
}

/// OFS data block: 24-byte header plus 488 payload bytes.
pub struct DataBlock<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> DataBlock<B> {
    pub fn new(buf: B) -> Self {
        Self { buf }
    }

    fn b(&self) -> &[u8] {
        self.buf.as_ref()
    }

    pub fn block_type(&self) -> u32 {
        codec::read_u32(self.b(), off::TYPE)
    }

    pub fn seq_num(&self) -> u32 {
        codec::read_u32(self.b(), off::SEQ_NUM)
    }

    pub fn data_size(&self) -> u32 {
        codec::read_u32(self.b(), off::DATA_SIZE).min(OFS_DATA_SIZE as u32)
    }

    pub fn next_data(&self) -> u32 {
        codec::read_u32(self.b(), off::NEXT_DATA)
    }

    pub fn payload(&self) -> &[u8] {
        &self.b()[off::DATA_PAYLOAD..BLOCK_SIZE]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> DataBlock<B> {
    fn m(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    /// Stamp the fixed header fields of a freshly allocated data block.
    pub fn init(&mut self, header_key: u32, seq_num: u32) {
        codec::write_u32(self.m(), off::TYPE, T_DATA);
        codec::write_u32(self.m(), off::HEADER_KEY, header_key);
        codec::write_u32(self.m(), off::SEQ_NUM, seq_num);
        codec::write_u32(self.m(), off::DATA_SIZE, 0);
        codec::write_u32(self.m(), off::NEXT_DATA, 0);
    }

    pub fn set_data_size(&mut self, v: u32) {
        codec::write_u32(self.m(), off::DATA_SIZE, v);
    }

    pub fn set_next_data(&mut self, v: u32) {
        codec::write_u32(self.m(), off::NEXT_DATA, v);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.m()[off::DATA_PAYLOAD..BLOCK_SIZE]
    }
}

/// Bitmap block: word 0 is the checksum, words 1..128 are map words.
/// A set bit means the block is free.
pub struct BitmapBlock<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> BitmapBlock<B> {
    pub fn new(buf: B) -> Self {
        Self { buf }
    }

    pub fn map_word(&self, index: usize) -> u32 {
        codec::read_u32(self.buf.as_ref(), 4 + index * 4)
    }

    pub fn is_free(&self, word: usize, bit: usize) -> bool {
        self.map_word(word) & (1 << bit) != 0
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitmapBlock<B> {
    pub fn set_map_word(&mut self, index: usize, v: u32) {
        codec::write_u32(self.buf.as_mut(), 4 + index * 4, v);
    }

    pub fn set_bit(&mut self, word: usize, bit: usize, free: bool) {
        let mut w = self.map_word(word);
        if free {
            w |= 1 << bit;
        } else {
            w &= !(1 << bit);
        }
        self.set_map_word(word, w);
    }
}
