use bytemuck::{Pod, Zeroable};

use crate::{
    disk::{self, BlockDevice, Lba, SECTOR_SIZE},
    error::LoadError,
};

/// Boot signature stored in the last two bytes of the MBR.
pub const MBR_SIGNATURE: u16 = 0xAA55;
/// Status byte of a partition that is not marked bootable.
pub const STATUS_INACTIVE: u8 = 0x00;
/// Status byte of the bootable (active) partition.
pub const STATUS_BOOTABLE: u8 = 0x80;

/// One of the four primary partition descriptors of the MBR.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PartitionEntry {
    /// Boot indicator. `0x80` marks the active partition, `0x00` an inactive one.
    pub status: u8,
    /// CHS address of the first sector. Ignored, LBA addressing only.
    pub chs_first: [u8; 3],
    /// Partition type, e.g. `0x0C` for FAT32 with LBA.
    pub partition_type: u8,
    /// CHS address of the last sector.
    pub chs_last: [u8; 3],
    /// LBA of the first sector of the partition.
    lba_first: [u8; 4],
    /// Number of sectors in the partition.
    sector_count: [u8; 4],
}

impl PartitionEntry {
    pub fn lba_first(&self) -> u32 {
        u32::from_le_bytes(self.lba_first)
    }

    pub fn sector_count(&self) -> u32 {
        u32::from_le_bytes(self.sector_count)
    }

    /// Whether this loader can boot from the entry.
    pub fn is_primary(&self) -> bool {
        matches!(self.status, STATUS_INACTIVE | STATUS_BOOTABLE)
    }
}

/// Sector 0 of the boot device.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct MasterBootRecord {
    bootstrap: [u8; 446],
    pub partitions: [PartitionEntry; 4],
    signature: [u8; 2],
}

const _: () = assert!(size_of::<PartitionEntry>() == 16);
const _: () = assert!(size_of::<MasterBootRecord>() == SECTOR_SIZE);

impl MasterBootRecord {
    pub fn from_sector(sector: &[u8; SECTOR_SIZE]) -> &MasterBootRecord {
        bytemuck::cast_ref(sector)
    }

    pub fn signature(&self) -> u16 {
        u16::from_le_bytes(self.signature)
    }

    pub fn first_partition(&self) -> &PartitionEntry {
        &self.partitions[0]
    }
}

/// Reads the MBR and returns the LBA of its first partition, which must be a primary
/// (inactive or bootable) partition.
pub fn locate_first_partition<D: BlockDevice + ?Sized>(
    device: &mut D,
) -> Result<Lba, LoadError<D::Err>> {
    let sector = disk::read_sector_logged(device, 0, "the master boot record")?;
    let mbr = MasterBootRecord::from_sector(&sector);

    if mbr.signature() != MBR_SIGNATURE {
        log::error!("No MBR detected.");
        return Err(LoadError::NoSignature(mbr.signature()));
    }

    let partition = mbr.first_partition();
    if !partition.is_primary() {
        log::error!("Unable to detect first physical partition.");
        return Err(LoadError::UnsupportedPartition(partition.status));
    }

    Ok(partition.lba_first() as Lba)
}

#[cfg(test)]
const PARTITION_TABLE_OFFSET: usize = 446;

#[cfg(test)]
fn mbr_sector(status: u8, lba: u32, signature: [u8; 2]) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    let entry = &mut sector[PARTITION_TABLE_OFFSET..PARTITION_TABLE_OFFSET + 16];
    entry[0] = status;
    entry[4] = 0x0C;
    entry[8..12].copy_from_slice(&lba.to_le_bytes());
    entry[12..16].copy_from_slice(&0x1000u32.to_le_bytes());
    sector[510..].copy_from_slice(&signature);
    sector
}

#[test]
fn primary_partition_lba_is_returned() {
    for status in [STATUS_INACTIVE, STATUS_BOOTABLE] {
        let sector = mbr_sector(status, 2048, [0x55, 0xAA]);
        let mut device = disk::MemoryDisk::new(&sector);
        assert_eq!(locate_first_partition(&mut device).unwrap(), 2048);
    }
}

#[test]
fn entry_fields_are_little_endian() {
    let sector = mbr_sector(STATUS_BOOTABLE, 0x0102_0304, [0x55, 0xAA]);
    let mbr = MasterBootRecord::from_sector(&sector);
    let entry = mbr.first_partition();

    assert_eq!(entry.lba_first(), 0x0102_0304);
    assert_eq!(entry.sector_count(), 0x1000);
    assert_eq!(entry.partition_type, 0x0C);
    assert_eq!(mbr.signature(), MBR_SIGNATURE);
}

#[test]
fn other_status_bytes_are_unsupported() {
    for status in [0x01, 0x7F, 0x81, 0xFF] {
        let sector = mbr_sector(status, 2048, [0x55, 0xAA]);
        let mut device = disk::MemoryDisk::new(&sector);
        assert!(matches!(
            locate_first_partition(&mut device),
            Err(LoadError::UnsupportedPartition(s)) if s == status
        ));
    }
}

#[test]
fn wrong_signature_wins_over_entry_contents() {
    for status in [STATUS_BOOTABLE, 0x13] {
        let mut sector = mbr_sector(status, 2048, [0xAA, 0x55]);
        // scribble over the whole partition table
        sector[PARTITION_TABLE_OFFSET..510].fill(0x5A);
        let mut device = disk::MemoryDisk::new(&sector);
        assert!(matches!(
            locate_first_partition(&mut device),
            Err(LoadError::NoSignature(0x55AA))
        ));
    }
}

#[test]
fn unreadable_sector_is_an_io_error() {
    let mut device = disk::MemoryDisk::new(&[]);
    assert!(matches!(
        locate_first_partition(&mut device),
        Err(LoadError::Io { lba: 0, .. })
    ));
}
