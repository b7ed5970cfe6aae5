// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Write;

    use crate::block::{
        self, BitmapBlock, DataBlock, Header, RootBlock, SecType, BITMAP_CHECKSUM_WORD,
        HEADER_CHECKSUM_WORD,
    };
    use crate::codec;
    use crate::consts::*;
    use crate::date::AmigaDate;
    use crate::dir::hash_name;
    use crate::error::AdfError;
    use crate::image::DiskImage;
    use crate::volume::{DiskType, Volume};

    use zip::write::{ExtendedFileOptions, FileOptions};

    fn fresh_volume(name: &str) -> Volume {
        let image = DiskImage::from_bytes(vec![0u8; ADF_DD_SIZE], false).unwrap();
        Volume::format(image, DiskType::FFS, name).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Walk everything reachable from the root and assert every header,
    /// data and bitmap block carries a valid checksum.
    fn verify_reachable_checksums(vol: &Volume) {
        let root = vol.root_block();
        let root_buf = vol.image.read_block(root).unwrap();
        assert!(
            block::verify_checksum(root_buf, HEADER_CHECKSUM_WORD),
            "root checksum"
        );
        for page in 0..BM_PAGES_ROOT {
            let bm = RootBlock::new(root_buf).bm_page(page);
            if bm != 0 {
                assert!(
                    block::verify_checksum(
                        vol.image.read_block(bm).unwrap(),
                        BITMAP_CHECKSUM_WORD
                    ),
                    "bitmap checksum"
                );
            }
        }

        let mut stack: Vec<u32> = (0..HASH_TABLE_SIZE)
            .map(|slot| Header::new(root_buf).table_entry(slot))
            .filter(|&b| b != 0)
            .collect();
        let mut seen = HashSet::new();
        while let Some(b) = stack.pop() {
            if !seen.insert(b) {
                continue;
            }
            let buf = vol.image.read_block(b).unwrap();
            assert!(
                block::verify_checksum(buf, HEADER_CHECKSUM_WORD),
                "header {b} checksum"
            );
            let hdr = Header::new(buf);
            match hdr.sec_type() {
                Some(SecType::Dir) => {
                    for slot in 0..HASH_TABLE_SIZE {
                        let child = hdr.table_entry(slot);
                        if child != 0 {
                            stack.push(child);
                        }
                    }
                }
                Some(SecType::File) => {
                    let mut data = hdr.first_data();
                    while data != 0 {
                        let dbuf = vol.image.read_block(data).unwrap();
                        assert!(
                            block::verify_checksum(dbuf, HEADER_CHECKSUM_WORD),
                            "data block {data} checksum"
                        );
                        data = DataBlock::new(dbuf).next_data();
                    }
                }
                _ => panic!("unexpected sec_type in directory tree"),
            }
            if hdr.hash_chain() != 0 {
                stack.push(hdr.hash_chain());
            }
        }
    }

    fn verify_block_sets(vol: &Volume) {
        let free = vol.free_set();
        let used = vol.used_set();
        assert!(free.is_disjoint(used));
        assert_eq!(free.len() + used.len(), vol.total_blocks() as usize);
        for b in [0, 1, ROOT_BLOCK_DD] {
            assert!(used.contains(&b), "block {b} must be used");
        }
    }

    #[test]
    fn codec_roundtrip() {
        let mut buf = [0u8; 18];
        codec::write_u16(&mut buf, 0, 0xBEEF);
        codec::write_u32(&mut buf, 2, 0xDEAD_BEEF);
        codec::write_i32(&mut buf, 6, -3);
        codec::write_u64(&mut buf, 10, 0x0123_4567_89AB_CDEF);
        assert_eq!(codec::read_u16(&buf, 0), 0xBEEF);
        assert_eq!(codec::read_u32(&buf, 2), 0xDEAD_BEEF);
        assert_eq!(codec::read_i32(&buf, 6), -3);
        assert_eq!(codec::read_u64(&buf, 10), 0x0123_4567_89AB_CDEF);
        // Big-endian on the wire.
        assert_eq!(buf[0], 0xBE);
        assert_eq!(buf[6], 0xFF);
    }

    #[test]
    fn bcpl_roundtrip_and_truncation() {
        let mut field = [0xFFu8; 31];
        codec::bcpl_write(&mut field, "Workbench", MAX_NAME_LEN);
        assert_eq!(field[0], 9);
        assert_eq!(codec::bcpl_read(&field, MAX_NAME_LEN), "Workbench");
        // The tail of the field is zeroed.
        assert!(field[10..31].iter().all(|&b| b == 0));

        let long = "a".repeat(40);
        codec::bcpl_write(&mut field, &long, MAX_NAME_LEN);
        assert_eq!(field[0], MAX_NAME_LEN as u8);
        assert_eq!(codec::bcpl_read(&field, MAX_NAME_LEN).len(), MAX_NAME_LEN);
    }

    #[test]
    fn checksum_sums_to_zero() {
        let mut buf: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i * 7 % 256) as u8).collect();
        block::update_checksum(&mut buf, HEADER_CHECKSUM_WORD);
        assert!(block::verify_checksum(&buf, HEADER_CHECKSUM_WORD));
        let mut total = 0u32;
        for word in 0..WORDS_PER_BLOCK {
            total = total.wrapping_add(codec::read_u32(&buf, word * 4));
        }
        assert_eq!(total, 0);

        block::update_checksum(&mut buf, BITMAP_CHECKSUM_WORD);
        assert!(block::verify_checksum(&buf, BITMAP_CHECKSUM_WORD));
    }

    #[test]
    fn hash_folds_case_and_buckets() {
        assert_eq!(hash_name("Work"), 51);
        assert_eq!(hash_name("work"), hash_name("WORK"));
        // Three names in the same bucket, used by the collision tests.
        assert_eq!(hash_name("A"), 6);
        assert_eq!(hash_name("DP"), 6);
        assert_eq!(hash_name("EC"), 6);
    }

    #[test]
    fn date_roundtrip() {
        for t in [
            AMIGA_EPOCH_OFFSET,
            AMIGA_EPOCH_OFFSET + 1,
            1_600_000_000,
            1_700_000_042,
        ] {
            assert_eq!(AmigaDate::from_unix(t).to_unix(), t);
        }
        // Times before the Amiga epoch collapse to it.
        assert_eq!(AmigaDate::from_unix(0).to_unix(), AMIGA_EPOCH_OFFSET);

        let d = AmigaDate::from_unix(AMIGA_EPOCH_OFFSET + SECONDS_PER_DAY + 123);
        assert_eq!(d.days, 1);
        assert_eq!(d.mins, 2);
        assert_eq!(d.ticks, 3 * TICKS_PER_SECOND);
    }

    #[test]
    fn image_rejects_bad_sizes() {
        assert!(DiskImage::from_bytes(vec![0u8; 1000], false).is_err());
        assert!(DiskImage::from_bytes(vec![0u8; BLOCK_SIZE], false).is_err());
        assert!(DiskImage::from_bytes(vec![0u8; 4 * BLOCK_SIZE], false).is_ok());
    }

    #[test]
    fn mount_rejects_invalid_root() {
        // All zeros: root block type is 0, not a header.
        let image = DiskImage::from_bytes(vec![0u8; ADF_DD_SIZE], false).unwrap();
        assert!(matches!(
            Volume::mount(image),
            Err(AdfError::InvalidImage(_))
        ));
        // Too small to even hold block 880.
        let image = DiskImage::from_bytes(vec![0u8; 16 * BLOCK_SIZE], false).unwrap();
        assert!(matches!(
            Volume::mount(image),
            Err(AdfError::InvalidImage(_))
        ));
    }

    #[test]
    fn format_writes_valid_structures() {
        let vol = fresh_volume("TestDisk");
        assert_eq!(vol.name(), "TestDisk");
        assert!(vol.is_ffs());
        assert_eq!(vol.total_blocks(), FLOPPY_DD_BLOCKS);
        // 0, 1, root and one bitmap block are taken.
        assert_eq!(vol.free_count(), FLOPPY_DD_BLOCKS - 4);

        let boot = vol.image.read_block(0).unwrap();
        assert_eq!(&boot[0..3], b"DOS");
        assert_eq!(boot[3], DOSFS_FFS);

        let root = vol.image.read_block(ROOT_BLOCK_DD).unwrap();
        let hdr = Header::new(root);
        assert_eq!(hdr.block_type(), T_HEADER);
        assert_eq!(hdr.sec_type_raw(), ST_ROOT);
        assert!(block::verify_checksum(root, HEADER_CHECKSUM_WORD));
        assert_eq!(RootBlock::new(root).hash_table_size(), 72);
        assert_eq!(RootBlock::new(root).bm_page(0), ROOT_BLOCK_DD + 1);

        let bitmap = vol.image.read_block(ROOT_BLOCK_DD + 1).unwrap();
        assert!(block::verify_checksum(bitmap, BITMAP_CHECKSUM_WORD));
        let bm = BitmapBlock::new(bitmap);
        assert!(!bm.is_free(0, 0));
        assert!(!bm.is_free(0, 1));
        assert!(bm.is_free(0, 2));
        let rem = ROOT_BLOCK_DD % BLOCKS_PER_BM_PAGE;
        assert!(!bm.is_free((rem / 32) as usize, (rem % 32) as usize));

        verify_block_sets(&vol);
    }

    #[test]
    fn empty_volume_listing() {
        let mut vol = fresh_volume("Empty");
        assert_eq!(vol.name(), "Empty");
        let root = vol.getattr("/").unwrap();
        assert!(root.is_dir);
        assert_eq!(root.size, 0);
        assert!(vol.readdir("/").unwrap().is_empty());
    }

    #[test]
    fn create_write_read_roundtrip() {
        let mut vol = fresh_volume("Work");
        let handle = vol.create("/hello.txt").unwrap();
        let written = vol.write(handle, b"Hello, Amiga!", 0).unwrap();
        assert_eq!(written, 13);

        let entry = vol.getattr("/hello.txt").unwrap();
        assert_eq!(entry.size, 13);
        assert!(!entry.is_dir);
        assert_eq!(entry.block, handle);

        assert_eq!(vol.read(handle, 0, 13).unwrap(), b"Hello, Amiga!");
        assert_eq!(vol.read(handle, 7, 100).unwrap(), b"Amiga!");
        assert!(vol.read(handle, 13, 10).unwrap().is_empty());

        verify_reachable_checksums(&vol);
        verify_block_sets(&vol);
    }

    #[test]
    fn remount_preserves_contents() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), vec![0u8; ADF_DD_SIZE]).unwrap();

        {
            let image = DiskImage::open(tmp.path()).unwrap();
            let mut vol = Volume::format(image, DiskType::FFS, "Persist").unwrap();
            let handle = vol.create("/hello.txt").unwrap();
            vol.write(handle, b"Hello, Amiga!", 0).unwrap();
            vol.flush().unwrap();
        }

        let mut vol = Volume::open(tmp.path()).unwrap();
        assert_eq!(vol.name(), "Persist");
        let entry = vol.getattr("/hello.txt").unwrap();
        assert_eq!(entry.size, 13);
        assert_eq!(vol.read(entry.block, 0, 13).unwrap(), b"Hello, Amiga!");
        verify_reachable_checksums(&vol);
        verify_block_sets(&vol);
    }

    #[test]
    fn subdirectories() {
        let mut vol = fresh_volume("Dirs");
        vol.mkdir("/sub").unwrap();
        vol.create("/sub/a").unwrap();
        vol.create("/sub/b").unwrap();

        let mut names: Vec<String> = vol
            .readdir("/sub")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, ["a", "b"]);

        assert!(matches!(vol.rmdir("/sub"), Err(AdfError::NotEmpty)));
        vol.unlink("/sub/a").unwrap();
        vol.unlink("/sub/b").unwrap();
        vol.rmdir("/sub").unwrap();
        assert!(matches!(vol.getattr("/sub"), Err(AdfError::NotFound)));
        assert!(vol.readdir("/").unwrap().is_empty());
        verify_block_sets(&vol);
    }

    #[test]
    fn hash_collisions_list_and_unlink_in_any_order() {
        let mut vol = fresh_volume("Collide");
        for name in ["/A", "/DP", "/EC"] {
            vol.create(name).unwrap();
        }
        let names: HashSet<String> = vol
            .readdir("/")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names.len(), 3);

        // Every listed name resolves back to the same block.
        for entry in vol.readdir("/").unwrap() {
            let again = vol.getattr(&format!("/{}", entry.name)).unwrap();
            assert_eq!(again.block, entry.block);
        }

        // Splice out the middle of the chain, then the head, then the tail.
        vol.unlink("/DP").unwrap();
        assert!(vol.getattr("/A").is_ok());
        assert!(vol.getattr("/EC").is_ok());
        verify_reachable_checksums(&vol);

        vol.unlink("/EC").unwrap();
        assert!(vol.getattr("/A").is_ok());
        vol.unlink("/A").unwrap();
        assert!(vol.readdir("/").unwrap().is_empty());
        verify_block_sets(&vol);
    }

    #[test]
    fn listing_skips_empty_names_but_follows_chain() {
        let mut vol = fresh_volume("Tolerant");
        for name in ["/A", "/DP", "/EC"] {
            vol.create(name).unwrap();
        }
        // Blank out the name of the middle chain entry, simulating a
        // legally ambiguous image.
        let dp = vol.getattr("/DP").unwrap().block;
        {
            let buf = vol.image.block_mut(dp).unwrap();
            Header::new(&mut *buf).set_name("");
            block::update_checksum(buf, HEADER_CHECKSUM_WORD);
        }
        let entries = vol.dir_list(vol.root_block()).unwrap();
        let names: HashSet<String> = entries.into_iter().map(|e| e.name).collect();
        // The blank entry is skipped, but the walk continues past it.
        assert_eq!(names, HashSet::from(["A".to_string(), "EC".to_string()]));
    }

    #[test]
    fn create_unlink_restores_allocation_state() {
        let mut vol = fresh_volume("Restore");
        let free_before = vol.free_set().clone();
        let used_before = vol.used_set().clone();

        let handle = vol.create("/tmp.bin").unwrap();
        vol.write(handle, &pattern(1000), 0).unwrap();
        vol.unlink("/tmp.bin").unwrap();

        assert_eq!(vol.free_set(), &free_before);
        assert_eq!(vol.used_set(), &used_before);

        let root = vol.image.read_block(vol.root_block()).unwrap();
        let bucket = hash_name("tmp.bin") as usize;
        assert_eq!(Header::new(root).table_entry(bucket), 0);
        assert!(block::verify_checksum(root, HEADER_CHECKSUM_WORD));
    }

    #[test]
    fn sparse_truncate_up_reads_zeros() {
        let mut vol = fresh_volume("Sparse");
        let handle = vol.create("/hole").unwrap();
        vol.truncate("/hole", 5000).unwrap();

        let entry = vol.getattr("/hole").unwrap();
        assert_eq!(entry.size, 5000);
        // No data blocks were allocated for the hole.
        let hdr = Header::new(vol.image.read_block(handle).unwrap());
        assert_eq!(hdr.first_data(), 0);

        let data = vol.read(handle, 0, 5000).unwrap();
        assert_eq!(data.len(), 5000);
        assert!(data.iter().all(|&b| b == 0));
        verify_block_sets(&vol);
    }

    #[test]
    fn write_past_end_bridges_the_gap() {
        let mut vol = fresh_volume("Gap");
        let handle = vol.create("/gap").unwrap();
        vol.write(handle, &vec![0xAA; 100], 0).unwrap();
        assert_eq!(vol.write(handle, &vec![0xBB; 10], 1000).unwrap(), 10);

        assert_eq!(vol.getattr("/gap").unwrap().size, 1010);
        let hole = vol.read(handle, 100, 900).unwrap();
        assert_eq!(hole.len(), 900);
        assert!(hole.iter().all(|&b| b == 0));
        assert_eq!(vol.read(handle, 1000, 10).unwrap(), vec![0xBB; 10]);

        // The bridge blocks are real, linked and checksummed.
        verify_reachable_checksums(&vol);
    }

    #[test]
    fn truncate_shrink_frees_blocks_and_is_idempotent() {
        let mut vol = fresh_volume("Trunc");
        let handle = vol.create("/f").unwrap();
        let data = pattern(2000);
        vol.write(handle, &data, 0).unwrap();
        let free_after_write = vol.free_count();

        vol.truncate("/f", 500).unwrap();
        assert_eq!(vol.getattr("/f").unwrap().size, 500);
        assert_eq!(vol.read(handle, 0, 2000).unwrap(), data[..500]);
        // 2000 bytes needed 5 data blocks, 500 bytes need 2.
        assert_eq!(vol.free_count(), free_after_write + 3);

        let before = vol.image.as_bytes().to_vec();
        vol.truncate("/f", 500).unwrap();
        assert_eq!(vol.image.as_bytes(), &before[..]);

        verify_reachable_checksums(&vol);
        verify_block_sets(&vol);
    }

    #[test]
    fn truncate_to_zero_drops_the_chain() {
        let mut vol = fresh_volume("Zero");
        let handle = vol.create("/f").unwrap();
        let free_after_create = vol.free_count();
        vol.write(handle, &pattern(1000), 0).unwrap();

        vol.truncate("/f", 0).unwrap();
        assert_eq!(vol.getattr("/f").unwrap().size, 0);
        let hdr = Header::new(vol.image.read_block(handle).unwrap());
        assert_eq!(hdr.first_data(), 0);
        assert_eq!(hdr.high_seq(), 0);
        assert_eq!(vol.free_count(), free_after_create);
        assert!(vol.read(handle, 0, 100).unwrap().is_empty());
        verify_block_sets(&vol);
    }

    #[test]
    fn exact_block_sized_file() {
        let mut vol = fresh_volume("Exact");
        let handle = vol.create("/one").unwrap();
        let data = pattern(OFS_DATA_SIZE);
        assert_eq!(vol.write(handle, &data, 0).unwrap(), OFS_DATA_SIZE);
        assert_eq!(vol.read(handle, 0, 1000).unwrap(), data);

        let hdr = Header::new(vol.image.read_block(handle).unwrap());
        let first = hdr.first_data();
        let db = DataBlock::new(vol.image.read_block(first).unwrap());
        assert_eq!(db.data_size(), OFS_DATA_SIZE as u32);
        assert_eq!(db.next_data(), 0);
        assert_eq!(db.seq_num(), 1);
        verify_reachable_checksums(&vol);
    }

    #[test]
    fn max_file_size_is_enforced() {
        let mut vol = fresh_volume("Ceiling");
        let handle = vol.create("/big").unwrap();
        let data = pattern(MAX_FILE_SIZE as usize);
        let mut offset = 0usize;
        while offset < data.len() {
            let n = 1024.min(data.len() - offset);
            assert_eq!(
                vol.write(handle, &data[offset..offset + n], offset as u64)
                    .unwrap(),
                n
            );
            offset += n;
        }
        assert_eq!(vol.getattr("/big").unwrap().size, MAX_FILE_SIZE);
        assert_eq!(vol.read(handle, 0, MAX_FILE_SIZE).unwrap(), data);

        // The data-block table is full: one more byte has nowhere to go.
        assert!(matches!(
            vol.write(handle, b"x", MAX_FILE_SIZE as u64),
            Err(AdfError::NoSpace)
        ));
        // A write straddling the ceiling is committed partially.
        vol.truncate("/big", 35_100).unwrap();
        assert_eq!(vol.write(handle, &vec![7u8; 100], 35_100).unwrap(), 36);

        let hdr = Header::new(vol.image.read_block(handle).unwrap());
        assert_eq!(hdr.high_seq(), MAX_DATABLOCKS as u32);
        // Newest-first table: slot 71 is the first data block.
        assert_eq!(hdr.table_entry(MAX_DATABLOCKS - 1), hdr.first_data());
        verify_reachable_checksums(&vol);
    }

    #[test]
    fn filling_the_disk_and_reclaiming() {
        let mut vol = fresh_volume("Full");
        let chunk = pattern(OFS_DATA_SIZE);
        let mut created = Vec::new();
        loop {
            let path = format!("/f{}", created.len());
            let handle = match vol.create(&path) {
                Ok(h) => h,
                Err(AdfError::NoSpace) => break,
                Err(e) => panic!("unexpected create error: {e}"),
            };
            match vol.write(handle, &chunk, 0) {
                Ok(n) => assert_eq!(n, OFS_DATA_SIZE),
                Err(AdfError::NoSpace) => {
                    vol.unlink(&path).unwrap();
                    break;
                }
                Err(e) => panic!("unexpected write error: {e}"),
            }
            created.push(path);
        }
        // Each file takes a header plus one data block.
        assert_eq!(created.len(), (FLOPPY_DD_BLOCKS as usize - 4) / 2);
        assert!(vol.free_count() <= 1);

        let reclaim = created.len() / 2;
        for path in created.drain(..reclaim) {
            vol.unlink(&path).unwrap();
        }
        assert_eq!(vol.free_count() as usize, reclaim * 2);

        let handle = vol.create("/again").unwrap();
        assert_eq!(vol.write(handle, &chunk, 0).unwrap(), OFS_DATA_SIZE);
        verify_block_sets(&vol);
    }

    #[test]
    fn failed_write_on_full_volume_leaves_size_untouched() {
        let mut vol = fresh_volume("NoRoom");
        let handle = vol.create("/f").unwrap();
        // Drain every free block so the first data-block allocation fails.
        while vol.allocate().is_ok() {}

        assert!(matches!(
            vol.write(handle, b"data", 0),
            Err(AdfError::NoSpace)
        ));
        let hdr = Header::new(vol.image.read_block(handle).unwrap());
        assert_eq!(hdr.byte_size(), 0);
        assert_eq!(hdr.first_data(), 0);
        assert_eq!(hdr.high_seq(), 0);
        assert!(block::verify_checksum(
            vol.image.read_block(handle).unwrap(),
            HEADER_CHECKSUM_WORD
        ));
    }

    #[test]
    fn mount_rejects_cyclic_hash_chain() {
        let mut vol = fresh_volume("Cyclic");
        let a = vol.create("/A").unwrap();
        {
            let buf = vol.image.block_mut(a).unwrap();
            Header::new(&mut *buf).set_hash_chain(a);
            block::update_checksum(buf, HEADER_CHECKSUM_WORD);
        }
        let image = DiskImage::from_bytes(vol.image.as_bytes().to_vec(), false).unwrap();
        assert!(matches!(
            Volume::mount(image),
            Err(AdfError::InvalidImage(_))
        ));
    }

    #[test]
    fn mount_rejects_cyclic_data_chain() {
        let mut vol = fresh_volume("Loopy");
        let handle = vol.create("/f").unwrap();
        vol.write(handle, &pattern(10), 0).unwrap();
        let first = Header::new(vol.image.read_block(handle).unwrap()).first_data();
        {
            let buf = vol.image.block_mut(first).unwrap();
            DataBlock::new(&mut *buf).set_next_data(first);
            block::update_checksum(buf, HEADER_CHECKSUM_WORD);
        }
        let image = DiskImage::from_bytes(vol.image.as_bytes().to_vec(), false).unwrap();
        assert!(matches!(
            Volume::mount(image),
            Err(AdfError::InvalidImage(_))
        ));
    }

    #[test]
    fn allocator_is_lowest_first() {
        let mut vol = fresh_volume("Alloc");
        assert_eq!(vol.allocate().unwrap(), 2);
        assert_eq!(vol.allocate().unwrap(), 3);

        let bitmap = vol.image.read_block(ROOT_BLOCK_DD + 1).unwrap();
        assert!(!BitmapBlock::new(bitmap).is_free(0, 2));
        assert!(block::verify_checksum(bitmap, BITMAP_CHECKSUM_WORD));

        vol.free_block(2).unwrap();
        assert_eq!(vol.allocate().unwrap(), 2);

        assert!(vol.free_block(0).is_err());
        assert!(vol.free_block(1).is_err());
        assert!(vol.free_block(ROOT_BLOCK_DD).is_err());
    }

    #[test]
    fn read_only_volume_rejects_mutation() {
        let data = {
            let mut vol = fresh_volume("Locked");
            vol.create("/f").unwrap();
            vol.image.as_bytes().to_vec()
        };
        let image = DiskImage::from_bytes(data, true).unwrap();
        let mut vol = Volume::mount(image).unwrap();
        assert!(vol.is_read_only());

        assert!(vol.getattr("/f").is_ok());
        assert!(matches!(vol.create("/g"), Err(AdfError::ReadOnly)));
        assert!(matches!(vol.mkdir("/d"), Err(AdfError::ReadOnly)));
        assert!(matches!(vol.unlink("/f"), Err(AdfError::ReadOnly)));
        assert!(matches!(vol.truncate("/f", 0), Err(AdfError::ReadOnly)));
        assert!(matches!(vol.open("/f", true), Err(AdfError::ReadOnly)));
        assert!(vol.open("/f", false).is_ok());
    }

    #[test]
    fn facade_error_mapping() {
        let mut vol = fresh_volume("Errors");
        vol.create("/file").unwrap();
        vol.mkdir("/dir").unwrap();

        assert!(matches!(vol.getattr("/nope"), Err(AdfError::NotFound)));
        assert!(matches!(vol.readdir("/file"), Err(AdfError::NotDirectory)));
        assert!(matches!(vol.unlink("/dir"), Err(AdfError::IsDirectory)));
        assert!(matches!(vol.rmdir("/file"), Err(AdfError::NotDirectory)));
        assert!(matches!(vol.rmdir("/"), Err(AdfError::Invalid(_))));
        assert!(matches!(vol.create("/file"), Err(AdfError::Exists)));
        assert!(matches!(
            vol.create("/missing/child"),
            Err(AdfError::NotFound)
        ));
        assert!(matches!(
            vol.create(&format!("/{}", "n".repeat(31))),
            Err(AdfError::NameTooLong)
        ));
        assert!(matches!(vol.open("/dir", false), Err(AdfError::IsDirectory)));

        assert_eq!(AdfError::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(AdfError::NotEmpty.to_errno(), libc::ENOTEMPTY);
        assert_eq!(AdfError::ReadOnly.to_errno(), libc::EROFS);
        assert_eq!(AdfError::NoSpace.to_errno(), libc::ENOSPC);
    }

    #[test]
    fn volume_info_reports_geometry() {
        let mut vol = fresh_volume("InfoDisk");
        vol.create("/f").unwrap();
        let info = vol.info().unwrap();
        assert_eq!(info.filesystem, "FFS");
        assert_eq!(info.volume_name, "InfoDisk");
        assert_eq!(info.total_blocks, FLOPPY_DD_BLOCKS);
        assert_eq!(info.disk_size, ADF_DD_SIZE as u64);
        assert_eq!(info.heads, 2);
        assert_eq!(info.sectors_per_track, 11);
        assert_eq!(info.cylinders, 80);
        assert_eq!(info.hash_table_size, 72);
        assert_eq!(info.free_blocks + info.used_blocks, info.total_blocks);
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"volume_name\":\"InfoDisk\""));
    }

    #[test]
    fn ofs_format_variant() {
        let image = DiskImage::from_bytes(vec![0u8; ADF_DD_SIZE], false).unwrap();
        let vol = Volume::format(image, DiskType::OFS, "OldSchool").unwrap();
        assert!(!vol.is_ffs());
        let boot = vol.image.read_block(0).unwrap();
        assert_eq!(boot[3], DOSFS_OFS);
    }

    #[test]
    fn zip_packed_image_mounts_read_only() {
        let adf_bytes = {
            let vol = fresh_volume("Zipped");
            vol.image.as_bytes().to_vec()
        };

        let mut zip_buffer = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_buffer));
            let options: FileOptions<ExtendedFileOptions> =
                FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            zip.start_file("disk.adf", options).unwrap();
            zip.write_all(&adf_bytes).unwrap();
            zip.finish().unwrap();
        }

        let image = DiskImage::from_zip(&zip_buffer).unwrap();
        assert!(image.is_read_only());
        let vol = Volume::mount(image).unwrap();
        assert_eq!(vol.name(), "Zipped");
    }

    #[test]
    fn timestamps_are_touched_on_mutation() {
        let mut vol = fresh_volume("Times");
        let handle = vol.create("/f").unwrap();
        let created = vol.getattr("/f").unwrap().mtime;
        assert!(created >= AMIGA_EPOCH_OFFSET);

        vol.set_mtime("/f", AMIGA_EPOCH_OFFSET + 1234).unwrap();
        assert_eq!(vol.getattr("/f").unwrap().mtime, AMIGA_EPOCH_OFFSET + 1234);

        vol.write(handle, b"data", 0).unwrap();
        assert!(vol.getattr("/f").unwrap().mtime >= created);
        verify_reachable_checksums(&vol);
    }
}
