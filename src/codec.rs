// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use byteorder::{BigEndian, ByteOrder};

pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    BigEndian::read_u16(&buf[offset..offset + 2])
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    BigEndian::write_u16(&mut buf[offset..offset + 2], value);
}

pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    BigEndian::read_u32(&buf[offset..offset + 4])
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    BigEndian::write_u32(&mut buf[offset..offset + 4], value);
}

pub fn read_i32(buf: &[u8], offset: usize) -> i32 {
    BigEndian::read_i32(&buf[offset..offset + 4])
}

pub fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    BigEndian::write_i32(&mut buf[offset..offset + 4], value);
}

pub fn read_u64(buf: &[u8], offset: usize) -> u64 {
    BigEndian::read_u64(&buf[offset..offset + 8])
}

pub fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    BigEndian::write_u64(&mut buf[offset..offset + 8], value);
}

/// Decode a BCPL string: a length byte followed by at most `max` bytes.
pub fn bcpl_read(buf: &[u8], max: usize) -> String {
    let len = (buf[0] as usize).min(max);
    String::from_utf8_lossy(&buf[1..1 + len]).to_string()
}

/// Encode `s` as a BCPL string into `buf[0..=max]`, truncating to `max`
/// bytes and zero-filling the rest of the field.
pub fn bcpl_write(buf: &mut [u8], s: &str, max: usize) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(max);
    buf[0] = len as u8;
    buf[1..1 + len].copy_from_slice(&bytes[..len]);
    for b in &mut buf[1 + len..1 + max] {
        *b = 0;
    }
}
