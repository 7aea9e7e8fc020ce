// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{append_file, create_file, read_all, TestBed, TestFs};
use cloudfs::SegmentHash;
use std::path::Path;
use test_log::test;

fn dedup_invariant_holds(fs: &TestFs, files: &[&Path]) {
    let mut occurrences = std::collections::HashMap::new();

    for file in files {
        for hash in fs.segment_hashes(file).expect("should list segments") {
            *occurrences.entry(hash).or_insert(0u32) += 1;
        }
    }

    for (hash, info) in fs.segment_table().iter() {
        assert_eq!(
            Some(&info.ref_count),
            occurrences.get(hash),
            "refcount of {hash} does not match its occurrences"
        );
        assert!(info.ref_count >= 1);
    }

    assert_eq!(occurrences.len(), fs.segment_table().len());
}

#[test]
fn identical_content_is_stored_once() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(bed.config().threshold(1_024).avg_seg_size(8_192))?;

    let payload = vec![0x41u8; 4_096];
    let a = Path::new("/a.bin");
    let b = Path::new("/b.bin");

    create_file(&mut fs, a, &payload)?;
    assert_eq!(1, bed.cloud.object_count());

    // The duplicate goes up without a second upload
    create_file(&mut fs, b, &payload)?;
    assert_eq!(1, bed.cloud.object_count());
    assert_eq!(1, fs.segment_table().len());

    let hash = SegmentHash::from_content(&payload);
    let info = fs.segment_table().get(&hash).expect("segment should be tracked");
    assert_eq!(2, info.ref_count);

    assert_eq!(fs.segment_hashes(a)?, fs.segment_hashes(b)?);
    dedup_invariant_holds(&fs, &[a, b]);

    Ok(())
}

#[test]
fn unlink_of_one_owner_keeps_the_shared_segment() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(bed.config().threshold(1_024).avg_seg_size(8_192))?;

    let payload = vec![0x41u8; 4_096];
    let a = Path::new("/a.bin");
    let b = Path::new("/b.bin");

    create_file(&mut fs, a, &payload)?;
    create_file(&mut fs, b, &payload)?;

    fs.unlink(a)?;

    let hash = SegmentHash::from_content(&payload);
    let info = fs.segment_table().get(&hash).expect("segment should survive");
    assert_eq!(1, info.ref_count);
    assert!(bed.cloud.object(hash.bucket(), hash.object_key()).is_some());

    assert_eq!(payload, read_all(&mut fs, b)?);
    dedup_invariant_holds(&fs, &[b]);

    Ok(())
}

#[test]
fn append_pulls_the_tail_segment_back() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(bed.config().threshold(1_024).avg_seg_size(8_192))?;

    let first_half = vec![0x41u8; 4_096];
    let b = Path::new("/b.bin");

    create_file(&mut fs, b, &first_half)?;

    let old_hash = SegmentHash::from_content(&first_half);
    assert!(fs.segment_table().get(&old_hash).is_some());

    // The first append pulls the tail segment out of the cloud; it was
    // this file's only reference, so table entry and object go away
    let end = fs.getattr(b)?.size;
    let fd = fs.open(b, cloudfs::AccessMode::WriteOnly)?;
    fs.write(b, fd, &vec![0x42u8; 4_096], end)?;

    assert!(fs.segment_table().get(&old_hash).is_none());
    assert!(bed.cloud.object(old_hash.bucket(), old_hash.object_key()).is_none());
    assert_eq!(8_192, fs.getattr(b)?.size);

    fs.release(b, fd)?;

    // After release the data-spill is gone and the whole body is segmented
    assert!(!fs.segment_hashes(b)?.is_empty());
    let total: u64 = fs
        .segment_table()
        .iter()
        .map(|(_, info)| u64::from(info.length) * u64::from(info.ref_count))
        .sum();
    assert_eq!(8_192, total);

    let mut expected = first_half;
    expected.extend_from_slice(&vec![0x42u8; 4_096]);
    assert_eq!(expected, read_all(&mut fs, b)?);

    dedup_invariant_holds(&fs, &[b]);

    Ok(())
}

#[test]
fn shared_tail_survives_an_append_to_one_owner() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(bed.config().threshold(1_024).avg_seg_size(8_192))?;

    let payload = vec![0x41u8; 4_096];
    let a = Path::new("/a.bin");
    let b = Path::new("/b.bin");

    create_file(&mut fs, a, &payload)?;
    create_file(&mut fs, b, &payload)?;

    // Pulling B's tail back only drops one of two references; the object
    // stays for A
    append_file(&mut fs, b, &[0x42u8; 100])?;

    let hash = SegmentHash::from_content(&payload);
    let info = fs.segment_table().get(&hash).expect("segment should survive");
    assert_eq!(1, info.ref_count);
    assert!(bed.cloud.object(hash.bucket(), hash.object_key()).is_some());

    assert_eq!(payload, read_all(&mut fs, a)?);

    let mut expected = payload;
    expected.extend_from_slice(&[0x42u8; 100]);
    assert_eq!(expected, read_all(&mut fs, b)?);

    dedup_invariant_holds(&fs, &[a, b]);

    Ok(())
}
