#![allow(dead_code)]

use std::io;

use fat32_boot::disk::{BlockDevice, Lba, MemoryDisk, SECTOR_SIZE};

pub const PARTITION_LBA: u32 = 8;
pub const RESERVED_SECTORS: u16 = 4;
pub const FAT_COUNT: u8 = 2;
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;

pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_VOLUME_ID: u8 = 0x08;

/// A small MBR partitioned FAT32 image, built in memory.
///
/// The partition starts at LBA 8 and holds 4 reserved sectors followed by two copies of
/// the FAT. The root directory is cluster 2 and ends right there unless relinked.
pub struct TestImage {
    pub image: Vec<u8>,
    sectors_per_cluster: u8,
    fat_size_sectors: u32,
    clusters: u32,
}

impl TestImage {
    pub fn new(sectors_per_cluster: u8, clusters: u32) -> TestImage {
        TestImage::with_fs_type(sectors_per_cluster, clusters, b"FAT32   ")
    }

    pub fn with_fs_type(sectors_per_cluster: u8, clusters: u32, fs_type: &[u8; 8]) -> TestImage {
        let fat_size_sectors = ((clusters + 2) * 4).div_ceil(SECTOR_SIZE as u32);
        let total_sectors = RESERVED_SECTORS as u32
            + FAT_COUNT as u32 * fat_size_sectors
            + clusters * sectors_per_cluster as u32;
        let image_sectors = (PARTITION_LBA + total_sectors) as usize;

        let mut image = TestImage {
            image: vec![0u8; image_sectors * SECTOR_SIZE],
            sectors_per_cluster,
            fat_size_sectors,
            clusters,
        };
        image.write_mbr(0x80, total_sectors);
        image.write_boot_record(total_sectors, fs_type);
        image.link(0, 0x0FFF_FFF8);
        image.link(1, END_OF_CHAIN);
        image.link(2, END_OF_CHAIN);
        image
    }

    fn write_mbr(&mut self, status: u8, sector_count: u32) {
        let entry = &mut self.image[446..462];
        entry[0] = status;
        entry[4] = 0x0C;
        entry[8..12].copy_from_slice(&PARTITION_LBA.to_le_bytes());
        entry[12..16].copy_from_slice(&sector_count.to_le_bytes());
        self.image[510..512].copy_from_slice(&[0x55, 0xAA]);
    }

    fn write_boot_record(&mut self, total_sectors: u32, fs_type: &[u8; 8]) {
        let sectors_per_cluster = self.sectors_per_cluster;
        let fat_size_sectors = self.fat_size_sectors;

        let sector = self.sector_mut(PARTITION_LBA as Lba);
        sector[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        sector[3..11].copy_from_slice(b"mkfs.fat");
        sector[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        sector[13] = sectors_per_cluster;
        sector[14..16].copy_from_slice(&RESERVED_SECTORS.to_le_bytes());
        sector[16] = FAT_COUNT;
        sector[21] = 0xF8;
        sector[32..36].copy_from_slice(&total_sectors.to_le_bytes());
        sector[36..40].copy_from_slice(&fat_size_sectors.to_le_bytes());
        sector[44..48].copy_from_slice(&2u32.to_le_bytes());
        sector[66] = 0x29;
        sector[71..82].copy_from_slice(b"BOOT       ");
        sector[82..90].copy_from_slice(fs_type);
        sector[510..512].copy_from_slice(&[0x55, 0xAA]);
    }

    /// Sectors of the volume before the data region.
    pub fn metadata_sectors(&self) -> u32 {
        RESERVED_SECTORS as u32 + FAT_COUNT as u32 * self.fat_size_sectors
    }

    /// Overwrites the 32-bit total sector count of the boot record.
    pub fn set_total_sectors(&mut self, total_sectors: u32) {
        let sector = self.sector_mut(PARTITION_LBA as Lba);
        sector[32..36].copy_from_slice(&total_sectors.to_le_bytes());
    }

    pub fn set_partition_status(&mut self, status: u8) {
        self.image[446] = status;
    }

    pub fn set_mbr_signature(&mut self, signature: [u8; 2]) {
        self.image[510..512].copy_from_slice(&signature);
    }

    pub fn sector_mut(&mut self, lba: Lba) -> &mut [u8] {
        let start = lba as usize * SECTOR_SIZE;
        &mut self.image[start..start + SECTOR_SIZE]
    }

    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }

    pub fn fat_lba(&self) -> Lba {
        (PARTITION_LBA + RESERVED_SECTORS as u32) as Lba
    }

    pub fn cluster_lba(&self, cluster: u32) -> Lba {
        assert!((2..self.clusters + 2).contains(&cluster));
        self.fat_lba()
            + (FAT_COUNT as u32 * self.fat_size_sectors) as Lba
            + ((cluster - 2) * self.sectors_per_cluster as u32) as Lba
    }

    /// Sets the FAT entry of `cluster` in every FAT copy.
    pub fn link(&mut self, cluster: u32, next: u32) {
        for copy in 0..FAT_COUNT as u32 {
            let offset = (self.fat_lba() as usize + (copy * self.fat_size_sectors) as usize)
                * SECTOR_SIZE
                + cluster as usize * 4;
            self.image[offset..offset + 4].copy_from_slice(&next.to_le_bytes());
        }
    }

    /// Links `clusters` in order and terminates the chain after the last one.
    pub fn chain(&mut self, clusters: &[u32]) {
        for pair in clusters.windows(2) {
            self.link(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.link(last, END_OF_CHAIN);
        }
    }

    pub fn cluster_mut(&mut self, cluster: u32) -> &mut [u8] {
        let start = self.cluster_lba(cluster) as usize * SECTOR_SIZE;
        let size = self.cluster_size();
        &mut self.image[start..start + size]
    }

    /// Stores a raw 32-byte entry as the `index`-th entry of directory cluster `cluster`.
    pub fn dir_entry(&mut self, cluster: u32, index: usize, entry: [u8; 32]) {
        self.cluster_mut(cluster)[index * 32..(index + 1) * 32].copy_from_slice(&entry);
    }

    /// Adds a file entry and fills each of its clusters with the cluster number.
    pub fn file(&mut self, index: usize, name: &[u8; 8], ext: &[u8; 3], clusters: &[u32]) {
        let size = (clusters.len() * self.cluster_size()) as u32;
        self.dir_entry(2, index, entry(name, ext, ATTR_ARCHIVE, clusters[0], size));
        self.chain(clusters);
        for &cluster in clusters {
            self.cluster_mut(cluster).fill(cluster as u8);
        }
    }

    pub fn disk(&self) -> MemoryDisk<'_> {
        MemoryDisk::new(&self.image)
    }
}

pub fn entry(name: &[u8; 8], ext: &[u8; 3], attributes: u8, cluster: u32, size: u32) -> [u8; 32] {
    let mut entry = [0u8; 32];
    entry[0..8].copy_from_slice(name);
    entry[8..11].copy_from_slice(ext);
    entry[11] = attributes;
    entry[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    entry[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    entry[28..32].copy_from_slice(&size.to_le_bytes());
    entry
}

/// Records every read as `(start_lba, count)`.
pub struct CountingDisk<'a> {
    inner: MemoryDisk<'a>,
    pub reads: Vec<(Lba, usize)>,
}

impl<'a> CountingDisk<'a> {
    pub fn new(image: &'a [u8]) -> Self {
        Self {
            inner: MemoryDisk::new(image),
            reads: Vec::new(),
        }
    }

    /// Whether any recorded read covered `lba`.
    pub fn touched(&self, lba: Lba) -> bool {
        self.reads
            .iter()
            .any(|&(start, count)| (start..start + count as Lba).contains(&lba))
    }
}

impl BlockDevice for CountingDisk<'_> {
    type Err = fat32_boot::error::MemoryDiskError;

    fn read_sectors(
        &mut self,
        buffer: &mut [u8],
        start_lba: Lba,
        count: usize,
    ) -> Result<(), Self::Err> {
        self.reads.push((start_lba, count));
        self.inner.read_sectors(buffer, start_lba, count)
    }
}

/// Fails every read that covers `bad_lba`.
pub struct FailingDisk<'a> {
    inner: MemoryDisk<'a>,
    bad_lba: Lba,
}

impl<'a> FailingDisk<'a> {
    pub fn new(image: &'a [u8], bad_lba: Lba) -> Self {
        Self {
            inner: MemoryDisk::new(image),
            bad_lba,
        }
    }
}

impl BlockDevice for FailingDisk<'_> {
    type Err = io::Error;

    fn read_sectors(
        &mut self,
        buffer: &mut [u8],
        start_lba: Lba,
        count: usize,
    ) -> Result<(), Self::Err> {
        if (start_lba..start_lba + count as Lba).contains(&self.bad_lba) {
            return Err(io::Error::other("medium error"));
        }
        self.inner
            .read_sectors(buffer, start_lba, count)
            .map_err(io::Error::other)
    }
}
