// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{create_file, read_all, read_chunked, TestBed};
use cloudfs::{DeflateCompressor, SegmentHash};
use std::path::Path;
use test_log::test;

#[test]
fn compressed_segments_roundtrip() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(
        bed.config()
            .threshold(1_024)
            .avg_seg_size(8_192)
            .compression(Some(DeflateCompressor::default())),
    )?;

    let file = Path::new("/compressible.bin");
    let payload = b"yadayadayada".repeat(500);

    create_file(&mut fs, file, &payload)?;

    // The table tracks decompressed lengths
    let total: u64 = fs
        .segment_table()
        .iter()
        .map(|(_, info)| u64::from(info.length))
        .sum();
    assert_eq!(payload.len() as u64, total);

    // The stored object is the deflated form, smaller than the raw bytes
    let hash = SegmentHash::from_content(&payload);
    let body = bed
        .cloud
        .object(hash.bucket(), hash.object_key())
        .expect("object should exist");
    assert!(body.len() < payload.len());
    assert_ne!(body, payload);

    assert_eq!(payload, read_all(&mut fs, file)?);
    assert_eq!(payload, read_chunked(&mut fs, file, 777)?);

    Ok(())
}

#[test]
fn compression_applies_to_pulled_tails_too() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(
        bed.config()
            .threshold(1_024)
            .avg_seg_size(8_192)
            .compression(Some(DeflateCompressor::default())),
    )?;

    let file = Path::new("/grow.bin");
    let payload = b"abcabcabc".repeat(455);

    create_file(&mut fs, file, &payload)?;

    // Appending inflates the tail segment back into the spill first
    let tail = b"XYZXYZXYZ".repeat(100);
    common::append_file(&mut fs, file, &tail)?;

    let mut expected = payload;
    expected.extend_from_slice(&tail);

    assert_eq!(expected.len() as u64, fs.getattr(file)?.size);
    assert_eq!(expected, read_all(&mut fs, file)?);

    Ok(())
}

#[test]
fn raw_segments_move_unchanged() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(bed.config().threshold(1_024).avg_seg_size(8_192))?;

    let file = Path::new("/raw.bin");
    let payload = vec![0x7fu8; 4_096];

    create_file(&mut fs, file, &payload)?;

    let hash = SegmentHash::from_content(&payload);
    let body = bed
        .cloud
        .object(hash.bucket(), hash.object_key())
        .expect("object should exist");
    assert_eq!(payload, body);

    Ok(())
}
