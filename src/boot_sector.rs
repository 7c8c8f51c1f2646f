use bytemuck::{Pod, Zeroable};

use crate::{
    disk::{self, BlockDevice, Lba, SECTOR_SIZE},
    error::LoadError,
    fat::{ENTRIES_PER_SECTOR, FIRST_DATA_CLUSTER},
};

/// Tag at the start of [`VolumeInfo::fs_type`] on every FAT32 volume.
pub const FAT32_TAG: &[u8; 5] = b"FAT32";

/// The FAT32 BIOS Parameter Block at the start of the volume.
/// All multi-byte fields are stored little-endian.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BootSector {
    /// Jump instruction to the boot code.
    pub jump_boot: [u8; 3],

    /// Name of the formatting system, e.g. `"MSWIN4.1"`.
    pub oem_name: [u8; 8],

    /// Bytes per sector.
    /// - Valid values: `512`, `1024`, `2048`, `4096`. This loader accepts `512` only.
    bytes_per_sector: [u8; 2],

    /// Sectors per allocation unit. A power of `2` from `1` to `128`.
    pub sectors_per_cluster: u8,

    /// Sectors in the reserved region, which precedes the first FAT.
    reserved_sectors: [u8; 2],

    /// Number of FAT copies. Usually `2`.
    pub number_of_fats: u8,

    /// Number of root entries for FAT12/16. Must be `0` on FAT32.
    root_entry_count: [u8; 2],

    /// 16-bit total sector count. `0` on FAT32 unless the volume is tiny.
    total_sectors_16: [u8; 2],

    /// Media descriptor. `0xF8` for fixed media.
    pub media: u8,

    /// 16-bit FAT size. Must be `0` on FAT32.
    fat_size_16: [u8; 2],

    sectors_per_track: [u8; 2],
    number_of_heads: [u8; 2],

    /// Sectors preceding the partition. Usually equal to the partition LBA.
    hidden_sectors: [u8; 4],

    /// 32-bit total sector count of the volume.
    total_sectors_32: [u8; 4],

    /// Sectors occupied by one FAT.
    fat_size_32: [u8; 4],

    /// Mirroring flags. Bits `0-3` select the active FAT when mirroring is disabled.
    ext_flags: [u8; 2],

    /// Filesystem version. Must be `0:0`.
    fs_version: [u8; 2],

    /// Cluster number of the first root directory cluster. Usually `2`.
    root_cluster: [u8; 4],

    /// Sector of the FSInfo structure within the reserved region.
    fs_info: [u8; 2],

    /// Sector of the backup boot record within the reserved region.
    backup_boot_sector: [u8; 2],

    _reserved: [u8; 12],
}

/// Extended boot signature block following the BPB.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct VolumeInfo {
    pub drive_number: u8,
    _reserved: u8,
    /// `0x29` if the following three fields are present.
    pub boot_signature: u8,
    volume_id: [u8; 4],
    pub volume_label: [u8; 11],
    /// Space-padded filesystem type, `"FAT32   "`. Formatters are not required to fill
    /// it in, but it is the only cheap way to tell a FAT32 volume apart.
    pub fs_type: [u8; 8],
}

/// The first sector of a FAT32 volume.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BootRecord {
    pub bpb: BootSector,
    pub info: VolumeInfo,
    boot_code: [u8; 420],
    signature: [u8; 2],
}

const _: () = assert!(size_of::<BootSector>() == 64);
const _: () = assert!(size_of::<VolumeInfo>() == 26);
const _: () = assert!(size_of::<BootRecord>() == SECTOR_SIZE);

impl BootSector {
    pub fn bytes_per_sector(&self) -> u16 {
        u16::from_le_bytes(self.bytes_per_sector)
    }

    pub fn reserved_sectors(&self) -> u16 {
        u16::from_le_bytes(self.reserved_sectors)
    }

    pub fn fat_size_sectors(&self) -> u32 {
        u32::from_le_bytes(self.fat_size_32)
    }

    pub fn root_cluster(&self) -> u32 {
        u32::from_le_bytes(self.root_cluster)
    }

    pub fn hidden_sectors(&self) -> u32 {
        u32::from_le_bytes(self.hidden_sectors)
    }

    /// Total sectors of the volume, preferring the 32-bit field.
    pub fn total_sectors(&self) -> u32 {
        match u32::from_le_bytes(self.total_sectors_32) {
            0 => u16::from_le_bytes(self.total_sectors_16) as u32,
            total => total,
        }
    }
}

impl VolumeInfo {
    pub fn volume_id(&self) -> u32 {
        u32::from_le_bytes(self.volume_id)
    }

    pub fn is_fat32(&self) -> bool {
        self.fs_type.starts_with(FAT32_TAG)
    }
}

impl BootRecord {
    pub fn from_sector(sector: &[u8; SECTOR_SIZE]) -> &BootRecord {
        bytemuck::cast_ref(sector)
    }

    pub fn signature(&self) -> u16 {
        u16::from_le_bytes(self.signature)
    }
}

/// Volume layout needed for every address computation of a load.
///
/// Computed once per load by [`parse_boot_sector`] and only ever borrowed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    partition_lba: Lba,
    reserved_sectors: u16,
    fat_size_sectors: u32,
    fat_count: u8,
    sectors_per_cluster: u8,
    total_sectors: u32,
    root_cluster: u32,
}

impl Geometry {
    /// Validates the boot record of the partition at `partition_lba` and derives the
    /// geometry from it.
    pub fn from_boot_record<E: core::error::Error + 'static>(
        partition_lba: Lba,
        record: &BootRecord,
    ) -> Result<Geometry, LoadError<E>> {
        if !record.info.is_fat32() {
            return Err(LoadError::NotFat32);
        }

        let bpb = &record.bpb;
        if bpb.bytes_per_sector() as usize != SECTOR_SIZE {
            return Err(LoadError::UnsupportedSectorSize(bpb.bytes_per_sector()));
        }
        if !bpb.sectors_per_cluster.is_power_of_two() {
            return Err(LoadError::InvalidClusterSize(bpb.sectors_per_cluster));
        }
        if bpb.number_of_fats == 0 {
            return Err(LoadError::InvalidNumberOfFats(bpb.number_of_fats));
        }

        Ok(Self {
            partition_lba,
            reserved_sectors: bpb.reserved_sectors(),
            fat_size_sectors: bpb.fat_size_sectors(),
            fat_count: bpb.number_of_fats,
            sectors_per_cluster: bpb.sectors_per_cluster,
            total_sectors: bpb.total_sectors(),
            root_cluster: bpb.root_cluster(),
        })
    }

    pub fn partition_lba(&self) -> Lba {
        self.partition_lba
    }

    pub fn sectors_per_cluster(&self) -> usize {
        self.sectors_per_cluster as usize
    }

    pub fn cluster_size_bytes(&self) -> usize {
        self.sectors_per_cluster() * SECTOR_SIZE
    }

    /// Root directory cluster recorded in the BPB.
    pub fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    /// First sector of the FAT region.
    pub fn fat_begin_lba(&self) -> Lba {
        self.partition_lba + self.reserved_sectors as Lba
    }

    /// First sector of the data region, i.e. of cluster `2`.
    pub fn cluster_begin_lba(&self) -> Lba {
        self.fat_begin_lba() + self.fat_size_sectors as Lba * self.fat_count as Lba
    }

    /// Sector of the first FAT holding the entry of `cluster`.
    pub fn fat_table_lba(&self, cluster: u32) -> Lba {
        self.fat_begin_lba() + (cluster as usize / ENTRIES_PER_SECTOR) as Lba
    }

    /// Index of the entry of `cluster` within its FAT sector.
    pub fn fat_entry_index(&self, cluster: u32) -> usize {
        cluster as usize % ENTRIES_PER_SECTOR
    }

    /// First sector of `cluster`. Clusters `0` and `1` have no data.
    pub fn data_lba(&self, cluster: u32) -> Option<Lba> {
        let index = cluster.checked_sub(FIRST_DATA_CLUSTER)?;
        Some(self.cluster_begin_lba() + index as Lba * self.sectors_per_cluster as Lba)
    }

    /// Number of data clusters on the volume.
    pub fn cluster_count(&self) -> u32 {
        let data_start = self.cluster_begin_lba() - self.partition_lba;
        let data_sectors = (self.total_sectors as Lba).saturating_sub(data_start);
        (data_sectors / self.sectors_per_cluster as Lba).min(u32::MAX as Lba - 1) as u32
    }

    /// Highest cluster number that addresses data on the volume.
    pub fn max_cluster(&self) -> u32 {
        self.cluster_count() + 1
    }

    /// Whether `cluster` addresses a data cluster of this volume.
    pub fn contains_cluster(&self, cluster: u32) -> bool {
        (FIRST_DATA_CLUSTER..=self.max_cluster()).contains(&cluster)
    }
}

/// Reads the first sector of the partition and derives the volume geometry from it.
pub fn parse_boot_sector<D: BlockDevice + ?Sized>(
    device: &mut D,
    partition_lba: Lba,
) -> Result<Geometry, LoadError<D::Err>> {
    let sector = disk::read_sector_logged(device, partition_lba, "the first partition")?;
    let record = BootRecord::from_sector(&sector);

    let geometry =
        Geometry::from_boot_record::<D::Err>(partition_lba, record).inspect_err(|err| match err {
            LoadError::NotFat32 => log::error!("No FAT32 filesystem detected!"),
            err => log::error!("Unusable FAT32 volume: {err}"),
        })?;

    log::info!(
        "FAT32 filesystem detected. Volume ID {:#010x}.",
        record.info.volume_id()
    );
    log::debug!(
        "{} reserved sectors, {} FATs of {} sectors, {} sectors per cluster, {} clusters",
        geometry.reserved_sectors,
        geometry.fat_count,
        geometry.fat_size_sectors,
        geometry.sectors_per_cluster,
        geometry.cluster_count()
    );
    log::debug!(
        "Root directory cluster {}, {} hidden sectors",
        geometry.root_cluster(),
        record.bpb.hidden_sectors()
    );
    Ok(geometry)
}

#[cfg(test)]
pub(crate) struct BootRecordFields {
    pub(crate) reserved_sectors: u16,
    pub(crate) fat_size_sectors: u32,
    pub(crate) fat_count: u8,
    pub(crate) sectors_per_cluster: u8,
    pub(crate) total_sectors: u32,
}

#[cfg(test)]
impl Default for BootRecordFields {
    fn default() -> Self {
        Self {
            reserved_sectors: 32,
            fat_size_sectors: 1000,
            fat_count: 2,
            sectors_per_cluster: 8,
            total_sectors: 1 << 20,
        }
    }
}

/// A FAT32 boot record as a formatter would write it, with `fields` filled in.
#[cfg(test)]
pub(crate) fn boot_record_sector(
    fields: &BootRecordFields,
    fs_type: &[u8; 8],
) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    sector[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    sector[3..11].copy_from_slice(b"MSWIN4.1");
    sector[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
    sector[13] = fields.sectors_per_cluster;
    sector[14..16].copy_from_slice(&fields.reserved_sectors.to_le_bytes());
    sector[16] = fields.fat_count;
    sector[21] = 0xF8;
    sector[28..32].copy_from_slice(&63u32.to_le_bytes());
    sector[32..36].copy_from_slice(&fields.total_sectors.to_le_bytes());
    sector[36..40].copy_from_slice(&fields.fat_size_sectors.to_le_bytes());
    sector[44..48].copy_from_slice(&2u32.to_le_bytes());
    sector[66] = 0x29;
    sector[67..71].copy_from_slice(&0x1234_ABCDu32.to_le_bytes());
    sector[71..82].copy_from_slice(b"NO NAME    ");
    sector[82..90].copy_from_slice(fs_type);
    sector[510..].copy_from_slice(&[0x55, 0xAA]);
    sector
}

#[cfg(test)]
fn test_geometry(fields: &BootRecordFields, partition_lba: Lba) -> Geometry {
    use crate::error::MemoryDiskError;

    let sector = boot_record_sector(fields, b"FAT32   ");
    let record = BootRecord::from_sector(&sector);
    Geometry::from_boot_record::<MemoryDiskError>(partition_lba, record).unwrap()
}

#[test]
fn fields_are_read_from_their_offsets() {
    let sector = boot_record_sector(&BootRecordFields::default(), b"FAT32   ");
    let record = BootRecord::from_sector(&sector);

    assert_eq!(record.bpb.bytes_per_sector(), 512);
    assert_eq!(record.bpb.sectors_per_cluster, 8);
    assert_eq!(record.bpb.reserved_sectors(), 32);
    assert_eq!(record.bpb.number_of_fats, 2);
    assert_eq!(record.bpb.hidden_sectors(), 63);
    assert_eq!(record.bpb.fat_size_sectors(), 1000);
    assert_eq!(record.bpb.total_sectors(), 1 << 20);
    assert_eq!(record.bpb.root_cluster(), 2);
    assert_eq!(record.info.boot_signature, 0x29);
    assert_eq!(record.info.volume_id(), 0x1234_ABCD);
    assert_eq!(&record.info.volume_label, b"NO NAME    ");
    assert_eq!(record.signature(), 0xAA55);
}

#[test]
fn derived_addresses() {
    let geometry = test_geometry(&BootRecordFields::default(), 2048);

    assert_eq!(geometry.partition_lba(), 2048);
    assert_eq!(geometry.root_cluster(), 2);
    assert_eq!(geometry.fat_begin_lba(), 2048 + 32);
    assert_eq!(geometry.cluster_begin_lba(), 2048 + 32 + 2 * 1000);
    assert_eq!(geometry.data_lba(2), Some(geometry.cluster_begin_lba()));
    assert_eq!(geometry.data_lba(5), Some(geometry.cluster_begin_lba() + 3 * 8));
    assert_eq!(geometry.data_lba(0), None);
    assert_eq!(geometry.data_lba(1), None);
    assert_eq!(geometry.fat_table_lba(127), 2048 + 32);
    assert_eq!(geometry.fat_table_lba(128), 2048 + 33);
    assert_eq!(geometry.fat_entry_index(130), 2);
    assert_eq!(geometry.cluster_size_bytes(), 8 * 512);
    assert_eq!(geometry.cluster_count(), ((1 << 20) - 2032) / 8);
}

#[test]
fn data_lba_is_strictly_increasing() {
    let geometry = test_geometry(&BootRecordFields::default(), 63);
    let mut previous = geometry.data_lba(2).unwrap();
    for cluster in 3..2000 {
        let lba = geometry.data_lba(cluster).unwrap();
        assert!(lba > previous);
        previous = lba;
    }
}

#[test]
fn fat_table_lba_groups_clusters_per_sector() {
    let geometry = test_geometry(&BootRecordFields::default(), 63);
    let mut previous = geometry.fat_table_lba(0);
    for cluster in 1..2000u32 {
        let lba = geometry.fat_table_lba(cluster);
        if cluster as usize % ENTRIES_PER_SECTOR == 0 {
            assert_eq!(lba, previous + 1);
        } else {
            assert_eq!(lba, previous);
        }
        previous = lba;
    }
}

#[test]
fn wrong_tag_is_not_fat32_whatever_the_geometry() {
    use crate::disk::MemoryDisk;

    let broken = BootRecordFields {
        sectors_per_cluster: 3,
        fat_count: 0,
        ..Default::default()
    };
    for tag in [b"FAT16   ", b"FAT     ", b"fat32   ", b"\0\0\0\0\0\0\0\0"] {
        for fields in [&BootRecordFields::default(), &broken] {
            let sector = boot_record_sector(fields, tag);
            let mut disk = MemoryDisk::new(&sector);
            assert!(matches!(
                parse_boot_sector(&mut disk, 0),
                Err(LoadError::NotFat32)
            ));
        }
    }
}

#[test]
fn only_the_first_five_tag_bytes_matter() {
    use crate::disk::MemoryDisk;

    let sector = boot_record_sector(&BootRecordFields::default(), b"FAT32xyz");
    let mut disk = MemoryDisk::new(&sector);
    assert!(parse_boot_sector(&mut disk, 0).is_ok());
}

#[test]
fn invalid_geometry_is_rejected() {
    use crate::disk::MemoryDisk;

    let parse = |fields: BootRecordFields| {
        let sector = boot_record_sector(&fields, b"FAT32   ");
        parse_boot_sector(&mut MemoryDisk::new(&sector), 0)
    };

    assert!(matches!(
        parse(BootRecordFields {
            sectors_per_cluster: 0,
            ..Default::default()
        }),
        Err(LoadError::InvalidClusterSize(0))
    ));
    assert!(matches!(
        parse(BootRecordFields {
            sectors_per_cluster: 6,
            ..Default::default()
        }),
        Err(LoadError::InvalidClusterSize(6))
    ));
    assert!(matches!(
        parse(BootRecordFields {
            fat_count: 0,
            ..Default::default()
        }),
        Err(LoadError::InvalidNumberOfFats(0))
    ));

    let mut sector = boot_record_sector(&BootRecordFields::default(), b"FAT32   ");
    sector[11..13].copy_from_slice(&4096u16.to_le_bytes());
    let mut disk = MemoryDisk::new(&sector);
    assert!(matches!(
        parse_boot_sector(&mut disk, 0),
        Err(LoadError::UnsupportedSectorSize(4096))
    ));
}
