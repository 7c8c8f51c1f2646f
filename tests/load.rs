mod common;

use common::{
    ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_VOLUME_ID, CountingDisk, FailingDisk, PARTITION_LBA,
    TestImage, entry,
};
use fat32_boot::{
    LoadError, LoaderOptions, ShortName, dir::find_boot_file, disk::Lba, load_kernel,
    load_kernel_at, load_kernel_with, locate_first_partition, parse_boot_sector,
};

#[test]
fn loads_the_default_boot_file() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[5, 6]);

    let mut dest = vec![0u8; 64 * 1024];
    let loaded = load_kernel(&mut image.disk(), &mut dest).unwrap();

    assert_eq!(loaded.start_cluster, 5);
    assert_eq!(loaded.clusters, 2);
    assert_eq!(loaded.bytes_written, 1024);
    assert_eq!(loaded.file_size, 1024);
}

#[test]
fn copies_exactly_the_chain() {
    let mut image = TestImage::new(2, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[5, 6]);
    let cluster_size = image.cluster_size();

    let mut dest = vec![0xEEu8; 8 * cluster_size];
    let loaded = load_kernel(&mut image.disk(), &mut dest).unwrap();

    assert_eq!(loaded.bytes_written, 2 * cluster_size);
    assert!(dest[..cluster_size].iter().all(|&b| b == 5));
    assert!(dest[cluster_size..2 * cluster_size].iter().all(|&b| b == 6));
    assert!(dest[2 * cluster_size..].iter().all(|&b| b == 0xEE));
}

#[test]
fn fragmented_file_is_concatenated_in_chain_order() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[10, 11, 15]);
    // unrelated data in the gap must not end up in the output
    image.cluster_mut(12).fill(0xAA);

    let mut expected = Vec::new();
    for cluster in [10u8, 11, 15] {
        expected.extend(std::iter::repeat_n(cluster, image.cluster_size()));
    }

    let mut dest = vec![0u8; expected.len()];
    let loaded = load_kernel(&mut image.disk(), &mut dest).unwrap();

    assert_eq!(loaded.clusters, 3);
    assert_eq!(dest, expected);
}

#[test]
fn later_entries_are_not_read_once_found() {
    let mut image = TestImage::new(4, 32);
    image.file(0, b"OTHERFIL", b"TXT", &[3]);
    image.file(1, b"KERNEL  ", b"IMG", &[7]);
    let root = image.cluster_lba(2);

    let mut disk = CountingDisk::new(&image.image);
    let mut dest = vec![0u8; 16 * 1024];
    let loaded = load_kernel(&mut disk, &mut dest).unwrap();

    assert_eq!(loaded.start_cluster, 7);
    assert!(dest[..image.cluster_size()].iter().all(|&b| b == 7));
    assert!(disk.touched(root));
    for lba in root + 1..root + 4 {
        assert!(!disk.touched(lba), "root sector {lba} was read");
    }
    // the first file is never loaded
    assert!(!disk.touched(image.cluster_lba(3)));
}

#[test]
fn end_marker_stops_the_scan() {
    let mut image = TestImage::new(1, 32);
    image.file(1, b"KERNEL  ", b"IMG", &[5]);

    let mut dest = vec![0u8; 4096];
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(err, LoadError::FileNotFound));
}

#[test]
fn skips_labels_directories_and_deleted_entries() {
    let mut image = TestImage::new(1, 32);
    image.dir_entry(2, 0, entry(b"KERNEL  ", b"IMG", ATTR_VOLUME_ID, 3, 0));
    image.dir_entry(2, 1, entry(b"KERNEL  ", b"IMG", ATTR_DIRECTORY, 4, 0));
    image.dir_entry(2, 2, entry(b"\xE5ERNEL  ", b"IMG", ATTR_ARCHIVE, 5, 512));
    image.file(3, b"KERNEL  ", b"IMG", &[9]);

    let mut dest = vec![0u8; 4096];
    let loaded = load_kernel(&mut image.disk(), &mut dest).unwrap();
    assert_eq!(loaded.start_cluster, 9);
    assert!(dest[..512].iter().all(|&b| b == 9));
}

#[test]
fn configured_name_is_loaded() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[5]);
    image.file(1, b"VMLINUZ ", b"   ", &[6]);

    let options = LoaderOptions::new(ShortName::new("VMLINUZ", ""));
    let mut dest = vec![0u8; 4096];
    let loaded = load_kernel_with(&mut image.disk(), &options, &mut dest).unwrap();
    assert_eq!(loaded.start_cluster, 6);
}

#[test]
fn second_root_cluster_needs_follow_root_chain() {
    let mut image = TestImage::new(1, 32);
    for index in 0..16 {
        let name = format!("FILE{index:04}");
        let name: [u8; 8] = name.as_bytes().try_into().unwrap();
        image.dir_entry(2, index, entry(&name, b"TXT", ATTR_ARCHIVE, 20, 0));
    }
    image.chain(&[2, 3]);
    image.dir_entry(3, 0, entry(b"KERNEL  ", b"IMG", ATTR_ARCHIVE, 8, 512));
    image.chain(&[8]);

    let mut dest = vec![0u8; 4096];
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(err, LoadError::FileNotFound));

    let options = LoaderOptions {
        follow_root_chain: true,
        ..LoaderOptions::default()
    };
    let loaded = load_kernel_with(&mut image.disk(), &options, &mut dest).unwrap();
    assert_eq!(loaded.start_cluster, 8);
}

#[test]
fn destination_too_small() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[5, 6, 7]);

    let mut dest = vec![0u8; 1000];
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(
        err,
        LoadError::DestinationTooSmall {
            needed: 1024,
            available: 1000
        }
    ));
    // clusters that fit are already copied
    assert!(dest[..512].iter().all(|&b| b == 5));
}

#[test]
fn cyclic_chain_is_rejected() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[5, 6]);
    image.link(6, 5);

    let mut dest = vec![0u8; 64 * 1024];
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(err, LoadError::ChainTooLong(32)));
}

#[test]
fn link_outside_the_volume_is_rejected() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[5]);
    image.link(5, 500);

    let mut dest = vec![0u8; 64 * 1024];
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(err, LoadError::InvalidCluster(500)));
}

#[test]
fn read_failures_carry_the_lba() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[5, 6]);

    // MBR, boot record, root directory, first data cluster, FAT, second data cluster
    let bad_lbas = [
        0,
        PARTITION_LBA as Lba,
        image.cluster_lba(2),
        image.cluster_lba(5),
        image.fat_lba(),
        image.cluster_lba(6),
    ];
    for bad_lba in bad_lbas {
        let mut disk = FailingDisk::new(&image.image, bad_lba);
        let mut dest = vec![0u8; 4096];
        match load_kernel(&mut disk, &mut dest) {
            Err(LoadError::Io { lba, source }) => {
                assert_eq!(lba, bad_lba);
                assert_eq!(source.kind(), std::io::ErrorKind::Other);
            }
            other => panic!("expected an I/O error at LBA {bad_lba}, got {other:?}"),
        }
    }
}

#[test]
fn default_scan_ignores_the_total_sector_count() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[5, 6]);
    // the volume claims to end where its data region starts
    image.set_total_sectors(image.metadata_sectors());

    let mut disk = image.disk();
    let partition_lba = locate_first_partition(&mut disk).unwrap();
    let geometry = parse_boot_sector(&mut disk, partition_lba).unwrap();
    assert_eq!(geometry.cluster_count(), 0);

    let entry = find_boot_file(&mut disk, &geometry, &LoaderOptions::default()).unwrap();
    assert_eq!(entry.first_cluster(), 5);
    assert_eq!(entry.file_size(), 1024);

    // the file's own chain is still checked against the volume size
    let mut dest = vec![0u8; 4096];
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(err, LoadError::InvalidCluster(5)));
}

#[test]
fn rejects_invalid_partitions_and_volumes() {
    let mut dest = vec![0u8; 4096];

    let mut image = TestImage::new(1, 32);
    image.set_mbr_signature([0x00, 0x00]);
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(err, LoadError::NoSignature(0)));

    let mut image = TestImage::new(1, 32);
    image.set_partition_status(0x01);
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedPartition(0x01)));

    let image = TestImage::with_fs_type(1, 32, b"FAT16   ");
    let err = load_kernel(&mut image.disk(), &mut dest).unwrap_err();
    assert!(matches!(err, LoadError::NotFat32));
}

#[test]
fn loads_to_a_raw_address() {
    let mut image = TestImage::new(1, 32);
    image.file(0, b"KERNEL  ", b"IMG", &[4, 5]);

    let mut memory = vec![0u8; 2048];
    // SAFETY: `memory` outlives the call and nothing else touches it meanwhile.
    let loaded = unsafe {
        load_kernel_at(
            &mut image.disk(),
            &LoaderOptions::default(),
            memory.as_mut_ptr(),
            memory.len(),
        )
    }
    .unwrap();

    assert_eq!(loaded.bytes_written, 1024);
    assert!(memory[..512].iter().all(|&b| b == 4));
    assert!(memory[512..1024].iter().all(|&b| b == 5));
}
