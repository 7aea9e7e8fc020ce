// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{create_file, TestBed};
use std::path::Path;
use test_log::test;

fn is_not_found(result: &cloudfs::Result<impl std::fmt::Debug>) -> bool {
    matches!(
        result,
        Err(cloudfs::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound
    )
}

#[test]
fn unlink_removes_everything_once() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(bed.config().threshold(1_024).avg_seg_size(8_192))?;

    let file = Path::new("/victim.bin");
    create_file(&mut fs, file, &vec![0x41u8; 4_096])?;

    assert_eq!(1, fs.segment_table().len());
    assert_eq!(1, bed.cloud.object_count());

    fs.unlink(file)?;

    // Segment references dropped with the file; object and proxy gone
    assert!(fs.segment_table().is_empty());
    assert_eq!(0, bed.cloud.object_count());
    assert!(is_not_found(&fs.getattr(file)));

    // Unlinking again reports not-found instead of corrupting state
    assert!(is_not_found(&fs.unlink(file)));

    Ok(())
}

#[test]
fn unlink_of_local_file_touches_no_cloud_state() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(bed.config().threshold(1_024).avg_seg_size(8_192))?;

    let file = Path::new("/local.bin");
    create_file(&mut fs, file, b"tiny")?;

    fs.unlink(file)?;

    assert!(is_not_found(&fs.getattr(file)));
    assert_eq!(0, bed.cloud.object_count());

    Ok(())
}

#[test]
fn unlink_while_a_spill_exists_cleans_it_up() -> cloudfs::Result<()> {
    let bed = TestBed::new()?;
    let mut fs = bed.mount(bed.config().threshold(1_024).avg_seg_size(8_192))?;

    let file = Path::new("/spilled.bin");
    create_file(&mut fs, file, &vec![0x41u8; 4_096])?;

    // Leave an open write handle with a populated spill, then unlink
    let end = fs.getattr(file)?.size;
    let ino = fs.getattr(file)?.ino;
    let fd = fs.open(file, cloudfs::AccessMode::WriteOnly)?;
    fs.write(file, fd, b"tail bytes", end)?;

    let spill = bed.ssd.path().join(format!(".{ino:x}_data"));
    assert!(spill.exists());

    fs.unlink(file)?;

    assert!(!spill.exists());
    assert!(fs.segment_table().is_empty());
    assert_eq!(0, bed.cloud.object_count());

    Ok(())
}
