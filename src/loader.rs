use crate::{
    LoaderOptions,
    boot_sector::{self, Geometry},
    cluster::ClusterChain,
    dir,
    disk::{self, BlockDevice},
    error::LoadError,
    mbr,
};

/// Summary of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    /// First cluster of the boot file.
    pub start_cluster: u32,
    /// Number of clusters copied.
    pub clusters: u32,
    /// Bytes written to the destination, always whole clusters.
    pub bytes_written: usize,
    /// Size recorded in the directory entry. Informational, the copy follows the chain.
    pub file_size: u32,
}

/// Locates the boot file in the root directory and copies its cluster chain into `dest`.
pub fn load_boot_file<D: BlockDevice + ?Sized>(
    device: &mut D,
    geometry: &Geometry,
    options: &LoaderOptions,
    dest: &mut [u8],
) -> Result<LoadedImage, LoadError<D::Err>> {
    let entry = dir::find_boot_file(device, geometry, options)?;
    let start_cluster = entry.first_cluster();

    log::info!("Loading kernel file...");
    let bytes_written = load_from_cluster(device, geometry, start_cluster, dest)?;
    let cluster_size = geometry.cluster_size_bytes();

    Ok(LoadedImage {
        start_cluster,
        clusters: (bytes_written / cluster_size) as u32,
        bytes_written,
        file_size: entry.file_size(),
    })
}

/// Copies the chain starting at `cluster` into `dest`, one whole cluster at a time.
/// Returns the number of bytes written.
pub fn load_from_cluster<D: BlockDevice + ?Sized>(
    device: &mut D,
    geometry: &Geometry,
    cluster: u32,
    dest: &mut [u8],
) -> Result<usize, LoadError<D::Err>> {
    let cluster_size = geometry.cluster_size_bytes();
    let mut chain = ClusterChain::try_new::<D::Err>(geometry, cluster)?;
    let mut offset = 0;
    let mut current = Some(cluster);

    while let Some(cluster) = current {
        let available = dest.len();
        let target = dest
            .get_mut(offset..offset + cluster_size)
            .ok_or_else(|| {
                log::error!("Kernel does not fit into the destination buffer.");
                LoadError::<D::Err>::DestinationTooSmall {
                    needed: offset + cluster_size,
                    available,
                }
            })?;

        let lba = geometry
            .data_lba(cluster)
            .ok_or(LoadError::<D::Err>::InvalidCluster(cluster))?;
        log::trace!("Copying cluster {cluster} from LBA {lba}");
        disk::read_logged(
            device,
            target,
            lba,
            geometry.sectors_per_cluster(),
            "from the first partition",
        )?;
        offset += cluster_size;

        current = chain.advance(device)?;
    }

    Ok(offset)
}

/// Loads the boot file with the default options. See [`load_kernel_with`].
pub fn load_kernel<D: BlockDevice + ?Sized>(
    device: &mut D,
    dest: &mut [u8],
) -> Result<LoadedImage, LoadError<D::Err>> {
    load_kernel_with(device, &LoaderOptions::default(), dest)
}

/// Finds the first partition, parses its FAT32 volume and loads the boot file into
/// `dest`. Stops at the first failure.
pub fn load_kernel_with<D: BlockDevice + ?Sized>(
    device: &mut D,
    options: &LoaderOptions,
    dest: &mut [u8],
) -> Result<LoadedImage, LoadError<D::Err>> {
    let partition_lba = mbr::locate_first_partition(device)?;
    log::info!("First partition starts at LBA {partition_lba}");

    let geometry = boot_sector::parse_boot_sector(device, partition_lba)?;
    load_boot_file(device, &geometry, options, dest)
}

/// Loads the boot file to a raw memory address.
///
/// # Safety
///
/// `address` must be valid for writes of `len` bytes and the region must not be accessed
/// through any other pointer while the load runs.
pub unsafe fn load_kernel_at<D: BlockDevice + ?Sized>(
    device: &mut D,
    options: &LoaderOptions,
    address: *mut u8,
    len: usize,
) -> Result<LoadedImage, LoadError<D::Err>> {
    // SAFETY: guaranteed by the caller.
    let dest = unsafe { core::slice::from_raw_parts_mut(address, len) };
    load_kernel_with(device, options, dest)
}
