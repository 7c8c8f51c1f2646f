use crate::{
    boot_sector::Geometry,
    disk::{self, BlockDevice, Lba, SECTOR_SIZE, Sector},
    error::LoadError,
    fat::{self, FatEntry},
};

/// Holds the most recently read FAT sector.
///
/// Consecutive clusters share a FAT sector, so a sequential chain costs one FAT read per
/// [`fat::ENTRIES_PER_SECTOR`] clusters instead of one per cluster.
#[derive(Debug, Clone)]
pub struct FatSectorCache {
    lba: Option<Lba>,
    sector: Sector,
}

impl Default for FatSectorCache {
    fn default() -> Self {
        Self {
            lba: None,
            sector: [0u8; SECTOR_SIZE],
        }
    }
}

impl FatSectorCache {
    /// Returns the FAT entry of `cluster`, reading its FAT sector unless it is the cached one.
    pub fn entry<D: BlockDevice + ?Sized>(
        &mut self,
        device: &mut D,
        geometry: &Geometry,
        cluster: u32,
    ) -> Result<FatEntry, LoadError<D::Err>> {
        let lba = geometry.fat_table_lba(cluster);

        if self.lba != Some(lba) {
            // never keep a half-read sector around
            self.lba = None;
            log::trace!("Reading FAT sector at LBA {lba}");
            disk::read_logged(device, &mut self.sector, lba, 1, "the FAT table")?;
            self.lba = Some(lba);
        }

        Ok(fat::entries(&self.sector)[geometry.fat_entry_index(cluster)])
    }

    /// LBA of the cached sector, if any.
    pub fn cached_lba(&self) -> Option<Lba> {
        self.lba
    }
}
