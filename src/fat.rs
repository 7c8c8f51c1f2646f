use bytemuck::{Pod, Zeroable};

use crate::disk::{SECTOR_SIZE, Sector};

/// Bytes of one FAT32 table entry.
pub const ENTRY_SIZE: usize = 4;
/// FAT entries per sector.
pub const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / ENTRY_SIZE;
/// Only the low 28 bits of an entry carry the cluster number.
pub const ENTRY_MASK: u32 = 0x0FFF_FFFF;
/// Entries at or above this value terminate a cluster chain.
pub const END_OF_CHAIN: u32 = 0x0FFF_FFF0;
/// First cluster index of the data region. Clusters `0` and `1` are reserved.
pub const FIRST_DATA_CLUSTER: u32 = 2;

/// One little-endian slot of the File Allocation Table.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct FatEntry([u8; ENTRY_SIZE]);

impl FatEntry {
    pub fn new(value: u32) -> FatEntry {
        Self(value.to_le_bytes())
    }

    /// The entry value with the reserved top 4 bits masked off.
    pub fn value(self) -> u32 {
        u32::from_le_bytes(self.0) & ENTRY_MASK
    }

    /// The cluster following the one this entry belongs to, or `None` if the chain
    /// ends here. Free (`0`) and reserved (`1`) values also end the chain.
    pub fn next_cluster(self) -> Option<u32> {
        match self.value() {
            0 | 1 => None,
            value if value >= END_OF_CHAIN => None,
            value => Some(value),
        }
    }

    /// Marks the end of a cluster chain.
    pub fn eof() -> FatEntry {
        Self::new(ENTRY_MASK)
    }
}

/// One sector of the FAT viewed as its entries.
pub type FatSector = [FatEntry; ENTRIES_PER_SECTOR];

pub fn entries(sector: &Sector) -> &FatSector {
    bytemuck::cast_ref(sector)
}

#[test]
fn reserved_bits_are_ignored() {
    assert_eq!(FatEntry::new(0xF000_0007).value(), 7);
    assert_eq!(FatEntry::new(0xF000_0007).next_cluster(), Some(7));
    assert_eq!(FatEntry::new(0xFFFF_FFFF).next_cluster(), None);
    assert_eq!(FatEntry::new(0x1000_0000).next_cluster(), None);
    assert_eq!(FatEntry::new(0xF000_0001).next_cluster(), None);
}

#[test]
fn chain_terminators() {
    assert_eq!(FatEntry::eof().next_cluster(), None);
    assert_eq!(FatEntry::new(END_OF_CHAIN).next_cluster(), None);
    assert_eq!(FatEntry::new(0x0FFF_FFF8).next_cluster(), None);
    assert_eq!(FatEntry::new(END_OF_CHAIN - 1).next_cluster(), Some(END_OF_CHAIN - 1));
    assert_eq!(FatEntry::new(2).next_cluster(), Some(2));
}

#[test]
fn sector_view_is_little_endian() {
    let mut sector = [0u8; SECTOR_SIZE];
    sector[8..12].copy_from_slice(&[0x0B, 0x00, 0x00, 0x00]);
    sector[SECTOR_SIZE - 4..].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());

    let entries = entries(&sector);
    assert_eq!(entries[2].next_cluster(), Some(11));
    assert_eq!(entries[ENTRIES_PER_SECTOR - 1], FatEntry::eof());
}
