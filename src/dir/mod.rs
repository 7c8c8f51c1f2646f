use entry::DirEntry;

use crate::{
    LoaderOptions,
    boot_sector::Geometry,
    cluster::ClusterChain,
    disk::{self, BlockDevice},
    error::LoadError,
    fat::FIRST_DATA_CLUSTER,
};

pub mod entry;
pub mod name;

/// Cluster at which the root directory is scanned, the first cluster of the data region.
pub const ROOT_DIR_CLUSTER: u32 = FIRST_DATA_CLUSTER;

/// Outcome of scanning a directory sector or cluster.
enum SectorScan {
    Found(DirEntry),
    End,
    Continue,
}

/// Scans the root directory for the configured boot file and returns its entry.
///
/// Only the first root directory cluster is scanned unless
/// [`LoaderOptions::follow_root_chain`] is set. The first cluster is read straight from
/// the start of the data region, the FAT is only consulted to follow the chain. The scan
/// stops at the first entry whose name starts with `0x00`.
pub fn find_boot_file<D: BlockDevice + ?Sized>(
    device: &mut D,
    geometry: &Geometry,
    options: &LoaderOptions,
) -> Result<DirEntry, LoadError<D::Err>> {
    match scan_cluster(device, geometry, ROOT_DIR_CLUSTER, options)? {
        SectorScan::Found(entry) => return Ok(found(entry, options)),
        SectorScan::End => return not_found(options),
        SectorScan::Continue => {}
    }
    if !options.follow_root_chain {
        return not_found(options);
    }

    let mut chain = ClusterChain::try_new::<D::Err>(geometry, ROOT_DIR_CLUSTER)?;
    while let Some(cluster) = chain.advance(device)? {
        log::debug!("Root directory continues at cluster {cluster}");
        match scan_cluster(device, geometry, cluster, options)? {
            SectorScan::Found(entry) => return Ok(found(entry, options)),
            SectorScan::End => return not_found(options),
            SectorScan::Continue => {}
        }
    }

    not_found(options)
}

fn scan_cluster<D: BlockDevice + ?Sized>(
    device: &mut D,
    geometry: &Geometry,
    cluster: u32,
    options: &LoaderOptions,
) -> Result<SectorScan, LoadError<D::Err>> {
    let first = geometry
        .data_lba(cluster)
        .ok_or(LoadError::<D::Err>::InvalidCluster(cluster))?;

    for lba in first..first + geometry.sectors_per_cluster() as u64 {
        let sector = disk::read_sector_logged(device, lba, "a root directory sector")?;
        match scan_sector(&sector, options) {
            SectorScan::Continue => {}
            done => return Ok(done),
        }
    }
    Ok(SectorScan::Continue)
}

fn scan_sector(sector: &disk::Sector, options: &LoaderOptions) -> SectorScan {
    for entry in entry::entries(sector) {
        if entry.is_volume_or_directory() || entry.is_deleted() {
            continue;
        }
        if entry.is_end() {
            return SectorScan::End;
        }
        if entry.matches(&options.boot_file) {
            return SectorScan::Found(*entry);
        }
    }
    SectorScan::Continue
}

fn found(entry: DirEntry, options: &LoaderOptions) -> DirEntry {
    log::info!(
        "Found {} at cluster {}, {} bytes.",
        options.boot_file,
        entry.first_cluster(),
        entry.file_size()
    );
    entry
}

fn not_found<T, E: core::error::Error + 'static>(
    options: &LoaderOptions,
) -> Result<T, LoadError<E>> {
    log::error!("Kernel file {} not found.", options.boot_file);
    Err(LoadError::FileNotFound)
}
