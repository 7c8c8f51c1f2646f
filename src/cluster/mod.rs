use cache::FatSectorCache;

use crate::{boot_sector::Geometry, disk::BlockDevice, error::LoadError};

pub mod cache;

/// Walks a FAT32 cluster chain one cluster at a time.
///
/// The walk is bounded by the number of data clusters of the volume, so a cyclic chain
/// on corrupt media fails with [`LoadError::ChainTooLong`] instead of looping forever.
#[derive(Debug)]
pub struct ClusterChain<'g> {
    geometry: &'g Geometry,
    cache: FatSectorCache,
    current: Option<u32>,
    visited: u32,
}

impl<'g> ClusterChain<'g> {
    /// Starts a chain at `first_cluster`, which must be a data cluster of the volume.
    pub fn try_new<E: core::error::Error + 'static>(
        geometry: &'g Geometry,
        first_cluster: u32,
    ) -> Result<Self, LoadError<E>> {
        if !geometry.contains_cluster(first_cluster) {
            log::error!("Invalid first cluster {first_cluster}.");
            return Err(LoadError::InvalidCluster(first_cluster));
        }

        Ok(Self {
            geometry,
            cache: FatSectorCache::default(),
            current: Some(first_cluster),
            visited: 1,
        })
    }

    /// Number of clusters visited so far, including the current one.
    pub fn visited(&self) -> u32 {
        self.visited
    }

    /// Looks up the successor of the current cluster in the FAT and moves to it.
    /// Returns `None` once the end of the chain is reached.
    pub fn advance<D: BlockDevice + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Result<Option<u32>, LoadError<D::Err>> {
        let Some(cluster) = self.current else {
            return Ok(None);
        };

        let next = self
            .cache
            .entry(device, self.geometry, cluster)?
            .next_cluster();

        self.current = match next {
            None => None,
            Some(next) if !self.geometry.contains_cluster(next) => {
                log::error!("Cluster {cluster} links to invalid cluster {next}.");
                return Err(LoadError::InvalidCluster(next));
            }
            Some(_) if self.visited >= self.geometry.cluster_count() => {
                log::error!("Cluster chain does not terminate, the FAT is corrupt.");
                return Err(LoadError::ChainTooLong(self.geometry.cluster_count()));
            }
            Some(next) => {
                self.visited += 1;
                Some(next)
            }
        };

        Ok(self.current)
    }
}

#[cfg(test)]
const RESERVED: u16 = 4;

/// A tiny volume at LBA 0: 4 reserved sectors, one 2-sector FAT, one sector per cluster.
#[cfg(test)]
fn volume(fat: &[(u32, u32)], total_sectors: u32) -> (Geometry, Vec<u8>) {
    use crate::{
        boot_sector::{BootRecord, BootRecordFields, boot_record_sector},
        disk::SECTOR_SIZE,
        error::MemoryDiskError,
    };

    let fields = BootRecordFields {
        reserved_sectors: RESERVED,
        fat_size_sectors: 2,
        fat_count: 1,
        sectors_per_cluster: 1,
        total_sectors,
    };
    let sector = boot_record_sector(&fields, b"FAT32   ");
    let record = BootRecord::from_sector(&sector);
    let geometry = Geometry::from_boot_record::<MemoryDiskError>(0, record).unwrap();

    let mut image = vec![0u8; total_sectors as usize * SECTOR_SIZE];
    for &(cluster, value) in fat {
        let offset = RESERVED as usize * SECTOR_SIZE + cluster as usize * 4;
        image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
    (geometry, image)
}

/// Records the first LBA of every read.
#[cfg(test)]
struct CountingDisk<'a> {
    inner: crate::disk::MemoryDisk<'a>,
    reads: Vec<crate::disk::Lba>,
}

#[cfg(test)]
impl BlockDevice for CountingDisk<'_> {
    type Err = crate::error::MemoryDiskError;

    fn read_sectors(
        &mut self,
        buffer: &mut [u8],
        start_lba: crate::disk::Lba,
        count: usize,
    ) -> Result<(), Self::Err> {
        self.reads.push(start_lba);
        self.inner.read_sectors(buffer, start_lba, count)
    }
}

#[cfg(test)]
fn walk<D: BlockDevice<Err = crate::error::MemoryDiskError>>(
    geometry: &Geometry,
    disk: &mut D,
    first: u32,
) -> Result<Vec<u32>, LoadError<D::Err>> {
    let mut chain = ClusterChain::try_new::<D::Err>(geometry, first)?;
    let mut clusters = vec![first];
    while let Some(next) = chain.advance(disk)? {
        clusters.push(next);
    }
    assert_eq!(chain.visited() as usize, clusters.len());
    Ok(clusters)
}

#[test]
fn follows_chain_until_end_marker() {
    let (geometry, image) = volume(&[(5, 6), (6, 0x0FFF_FFFF)], 64);
    let mut disk = crate::disk::MemoryDisk::new(&image);
    assert_eq!(walk(&geometry, &mut disk, 5).unwrap(), vec![5, 6]);
}

#[test]
fn free_or_reserved_successor_ends_chain() {
    let (geometry, image) = volume(&[(3, 4), (4, 1)], 64);
    let mut disk = crate::disk::MemoryDisk::new(&image);
    assert_eq!(walk(&geometry, &mut disk, 3).unwrap(), vec![3, 4]);
    // cluster 9 is free (0)
    assert_eq!(walk(&geometry, &mut disk, 9).unwrap(), vec![9]);
}

#[test]
fn fat_sector_is_read_once_per_group() {
    use crate::disk::Lba;

    // 126 -> 127 -> 128 -> 129 -> end crosses from FAT sector 0 into FAT sector 1
    let (geometry, image) = volume(
        &[(126, 127), (127, 128), (128, 129), (129, 0x0FFF_FFF8)],
        600,
    );
    let mut disk = CountingDisk {
        inner: crate::disk::MemoryDisk::new(&image),
        reads: Vec::new(),
    };
    assert_eq!(walk(&geometry, &mut disk, 126).unwrap(), vec![126, 127, 128, 129]);
    assert_eq!(disk.reads, vec![RESERVED as Lba, RESERVED as Lba + 1]);
}

#[test]
fn cache_keeps_the_last_fat_sector() {
    use crate::disk::{Lba, MemoryDisk};

    let (geometry, image) = volume(&[(5, 6), (200, 201)], 600);
    let mut disk = MemoryDisk::new(&image);
    let mut cache = FatSectorCache::default();
    assert_eq!(cache.cached_lba(), None);

    assert_eq!(cache.entry(&mut disk, &geometry, 5).unwrap().next_cluster(), Some(6));
    assert_eq!(cache.cached_lba(), Some(RESERVED as Lba));
    assert_eq!(cache.entry(&mut disk, &geometry, 200).unwrap().next_cluster(), Some(201));
    assert_eq!(cache.cached_lba(), Some(RESERVED as Lba + 1));
}

#[test]
fn failed_fat_read_leaves_the_cache_empty() {
    use crate::disk::{Lba, MemoryDisk, SECTOR_SIZE};

    let (geometry, image) = volume(&[(5, 6), (200, 201)], 600);
    let mut cache = FatSectorCache::default();
    cache
        .entry(&mut MemoryDisk::new(&image), &geometry, 5)
        .unwrap();

    // the second FAT sector lies past the end of the truncated image
    let truncated = &image[..(RESERVED as usize + 1) * SECTOR_SIZE];
    assert!(matches!(
        cache.entry(&mut MemoryDisk::new(truncated), &geometry, 200),
        Err(LoadError::Io { lba, .. }) if lba == RESERVED as Lba + 1
    ));
    assert_eq!(cache.cached_lba(), None);
}

#[test]
fn cyclic_chain_is_rejected() {
    let (geometry, image) = volume(&[(2, 3), (3, 4), (4, 2)], 64);
    let mut disk = crate::disk::MemoryDisk::new(&image);
    assert!(matches!(
        walk(&geometry, &mut disk, 2),
        Err(LoadError::ChainTooLong(count)) if count == geometry.cluster_count()
    ));
}

#[test]
fn links_outside_the_volume_are_rejected() {
    use crate::error::MemoryDiskError;

    let (geometry, image) = volume(&[(2, 0x0FFF_0000)], 64);
    let mut disk = crate::disk::MemoryDisk::new(&image);
    assert!(matches!(
        walk(&geometry, &mut disk, 2),
        Err(LoadError::InvalidCluster(0x0FFF_0000))
    ));
    assert!(matches!(
        ClusterChain::try_new::<MemoryDiskError>(&geometry, 1),
        Err(LoadError::InvalidCluster(1))
    ));
    assert!(matches!(
        ClusterChain::try_new::<MemoryDiskError>(&geometry, geometry.max_cluster() + 1),
        Err(LoadError::InvalidCluster(_))
    ));
}
