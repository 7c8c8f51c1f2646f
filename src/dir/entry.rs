// https://en.wikipedia.org/wiki/Design_of_the_FAT_file_system#Directory_entry

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::disk::{SECTOR_SIZE, Sector};

use super::name::ShortName;

/// Bytes of one directory entry.
pub const DIR_ENTRY_SIZE: usize = 32;
/// Directory entries per sector.
pub const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DIR_ENTRY_SIZE;
/// First name byte of a deleted entry.
pub const DELETED_MARKER: u8 = 0xE5;
/// First name byte of the entry that ends the directory.
pub const END_MARKER: u8 = 0x00;

bitflags! {
    /// Attribute byte of a directory entry.
    #[repr(transparent)]
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        /// The entry holds the volume label.
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        /// All four low bits set marks a long file name slot.
        const LONG_NAME = Self::READ_ONLY.bits()
            | Self::HIDDEN.bits()
            | Self::SYSTEM.bits()
            | Self::VOLUME_ID.bits();
    }
}

/// A 32-byte short-name directory entry.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DirEntry {
    /// Space-padded base name.
    pub name: [u8; 8],
    /// Space-padded extension.
    pub ext: [u8; 3],
    pub attributes: Attributes,
    _nt_reserved: u8,
    create_time_tenth: u8,
    create_time: [u8; 2],
    create_date: [u8; 2],
    last_access_date: [u8; 2],
    /// High 16 bits of the first cluster. Only used by FAT32.
    first_cluster_high: [u8; 2],
    write_time: [u8; 2],
    write_date: [u8; 2],
    first_cluster_low: [u8; 2],
    file_size: [u8; 4],
}

const _: () = assert!(size_of::<DirEntry>() == DIR_ENTRY_SIZE);

impl DirEntry {
    /// Creates an entry for a regular file, as a formatter would.
    pub fn new(name: &[u8; 8], ext: &[u8; 3], first_cluster: u32, file_size: u32) -> DirEntry {
        let mut entry = DirEntry::zeroed();
        entry.name = *name;
        entry.ext = *ext;
        entry.attributes = Attributes::ARCHIVE;
        entry.first_cluster_high = ((first_cluster >> 16) as u16).to_le_bytes();
        entry.first_cluster_low = (first_cluster as u16).to_le_bytes();
        entry.file_size = file_size.to_le_bytes();
        entry
    }

    /// Whether this entry terminates the populated part of the directory.
    pub fn is_end(&self) -> bool {
        self.name[0] == END_MARKER
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_MARKER
    }

    /// Volume labels, long-name slots and subdirectories never hold the boot file.
    pub fn is_volume_or_directory(&self) -> bool {
        self.attributes
            .intersects(Attributes::VOLUME_ID | Attributes::DIRECTORY)
    }

    pub fn first_cluster(&self) -> u32 {
        (u16::from_le_bytes(self.first_cluster_high) as u32) << 16
            | u16::from_le_bytes(self.first_cluster_low) as u32
    }

    pub fn file_size(&self) -> u32 {
        u32::from_le_bytes(self.file_size)
    }

    pub fn matches(&self, target: &ShortName) -> bool {
        target.matches(&self.name, &self.ext)
    }
}

/// One directory sector viewed as its entries.
pub fn entries(sector: &Sector) -> &[DirEntry; ENTRIES_PER_SECTOR] {
    bytemuck::cast_ref(sector)
}

#[test]
fn cluster_halves_are_combined() {
    let entry = DirEntry::new(b"KERNEL  ", b"IMG", 0x0012_3456, 4096);
    assert_eq!(entry.first_cluster(), 0x0012_3456);
    assert_eq!(entry.file_size(), 4096);

    let bytes = bytemuck::bytes_of(&entry);
    assert_eq!(&bytes[20..22], &[0x12, 0x00]);
    assert_eq!(&bytes[26..28], &[0x56, 0x34]);
    assert_eq!(&bytes[28..32], &4096u32.to_le_bytes());
    assert_eq!(bytes[11], Attributes::ARCHIVE.bits());
}

#[test]
fn entry_classification() {
    let mut entry = DirEntry::new(b"KERNEL  ", b"IMG", 2, 0);
    assert!(!entry.is_end() && !entry.is_deleted() && !entry.is_volume_or_directory());

    entry.attributes = Attributes::LONG_NAME;
    assert!(entry.is_volume_or_directory());
    entry.attributes = Attributes::DIRECTORY | Attributes::HIDDEN;
    assert!(entry.is_volume_or_directory());

    entry.name[0] = DELETED_MARKER;
    assert!(entry.is_deleted());
    entry.name[0] = END_MARKER;
    assert!(entry.is_end());
}
