use crate::error::{LoadError, MemoryDiskError};

/// Size of a device sector in bytes. Fixed for the whole loader.
pub const SECTOR_SIZE: usize = 512;

/// One sector worth of raw bytes.
pub type Sector = [u8; SECTOR_SIZE];

/// Linear sector index on a block device.
pub type Lba = u64;

/// Synchronous sector-granular read access to the boot medium.
pub trait BlockDevice {
    type Err: core::error::Error + 'static;

    /// Reads `count` contiguous sectors starting at `start_lba` into `buffer`.
    ///
    /// Callers always pass a buffer of exactly `count * SECTOR_SIZE` bytes.
    fn read_sectors(
        &mut self,
        buffer: &mut [u8],
        start_lba: Lba,
        count: usize,
    ) -> Result<(), Self::Err>;

    fn read_sector(&mut self, lba: Lba) -> Result<Sector, Self::Err> {
        let mut sector = [0u8; SECTOR_SIZE];
        self.read_sectors(&mut sector, lba, 1)?;
        Ok(sector)
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    type Err = T::Err;

    fn read_sectors(
        &mut self,
        buffer: &mut [u8],
        start_lba: Lba,
        count: usize,
    ) -> Result<(), Self::Err> {
        (**self).read_sectors(buffer, start_lba, count)
    }
}

/// Reads `count` sectors and reports a failure on the diagnostic channel before handing
/// it to the caller.
pub(crate) fn read_logged<D: BlockDevice + ?Sized>(
    device: &mut D,
    buffer: &mut [u8],
    start_lba: Lba,
    count: usize,
    what: &str,
) -> Result<(), LoadError<D::Err>> {
    device
        .read_sectors(buffer, start_lba, count)
        .map_err(|source| {
            log::error!("Unable to read {what} at LBA {start_lba}: {source}");
            LoadError::Io {
                lba: start_lba,
                source,
            }
        })
}

pub(crate) fn read_sector_logged<D: BlockDevice + ?Sized>(
    device: &mut D,
    lba: Lba,
    what: &str,
) -> Result<Sector, LoadError<D::Err>> {
    let mut sector = [0u8; SECTOR_SIZE];
    read_logged(device, &mut sector, lba, 1, what)?;
    Ok(sector)
}

/// A disk image held in memory, e.g. a ramdisk handed over by an earlier boot stage.
#[derive(Debug, Clone, Copy)]
pub struct MemoryDisk<'a> {
    image: &'a [u8],
}

impl<'a> MemoryDisk<'a> {
    pub fn new(image: &'a [u8]) -> Self {
        Self { image }
    }

    /// Number of whole sectors in the image.
    pub fn sector_count(&self) -> u64 {
        (self.image.len() / SECTOR_SIZE) as u64
    }
}

impl BlockDevice for MemoryDisk<'_> {
    type Err = MemoryDiskError;

    fn read_sectors(
        &mut self,
        buffer: &mut [u8],
        start_lba: Lba,
        count: usize,
    ) -> Result<(), Self::Err> {
        let length = count
            .checked_mul(SECTOR_SIZE)
            .ok_or(MemoryDiskError::OutOfRange { start_lba, count })?;
        if buffer.len() != length {
            return Err(MemoryDiskError::BufferLength(buffer.len()));
        }

        let source = usize::try_from(start_lba)
            .ok()
            .and_then(|lba| lba.checked_mul(SECTOR_SIZE))
            .and_then(|start| Some(start..start.checked_add(length)?))
            .and_then(|range| self.image.get(range))
            .ok_or(MemoryDiskError::OutOfRange { start_lba, count })?;

        buffer.copy_from_slice(source);
        Ok(())
    }
}

#[cfg(feature = "std")]
impl BlockDevice for std::fs::File {
    type Err = std::io::Error;

    #[cfg(unix)]
    fn read_sectors(
        &mut self,
        buffer: &mut [u8],
        start_lba: Lba,
        count: usize,
    ) -> Result<(), Self::Err> {
        debug_assert_eq!(buffer.len(), count * SECTOR_SIZE);
        std::os::unix::fs::FileExt::read_exact_at(self, buffer, start_lba * SECTOR_SIZE as u64)
    }

    #[cfg(windows)]
    fn read_sectors(
        &mut self,
        mut buffer: &mut [u8],
        start_lba: Lba,
        count: usize,
    ) -> Result<(), Self::Err> {
        debug_assert_eq!(buffer.len(), count * SECTOR_SIZE);
        let mut offset = start_lba * SECTOR_SIZE as u64;
        while !buffer.is_empty() {
            match std::os::windows::fs::FileExt::seek_read(self, buffer, offset)? {
                0 => return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)),
                n => {
                    buffer = &mut buffer[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}

#[test]
fn memory_disk_reads_whole_sectors() {
    let mut image = [0u8; 3 * SECTOR_SIZE];
    image[SECTOR_SIZE..2 * SECTOR_SIZE].fill(0xAB);
    image[2 * SECTOR_SIZE..].fill(0xCD);

    let mut disk = MemoryDisk::new(&image);
    assert_eq!(disk.sector_count(), 3);

    let mut buffer = [0u8; 2 * SECTOR_SIZE];
    disk.read_sectors(&mut buffer, 1, 2).unwrap();
    assert!(buffer[..SECTOR_SIZE].iter().all(|&b| b == 0xAB));
    assert!(buffer[SECTOR_SIZE..].iter().all(|&b| b == 0xCD));

    let sector = disk.read_sector(2).unwrap();
    assert!(sector.iter().all(|&b| b == 0xCD));
}

#[test]
fn memory_disk_rejects_reads_past_the_end() {
    let image = [0u8; 2 * SECTOR_SIZE];
    let mut disk = MemoryDisk::new(&image);

    let mut buffer = [0u8; 2 * SECTOR_SIZE];
    assert!(matches!(
        disk.read_sectors(&mut buffer, 1, 2),
        Err(MemoryDiskError::OutOfRange {
            start_lba: 1,
            count: 2
        })
    ));
    assert!(matches!(
        disk.read_sectors(&mut buffer, 0, 1),
        Err(MemoryDiskError::BufferLength(1024))
    ));
}
