use crate::disk::Lba;

/// Everything that can abort a boot file load. Every variant is terminal.
#[derive(Debug, thiserror::Error)]
pub enum LoadError<E: core::error::Error + 'static> {
    #[error("I/O error at LBA {lba}: {source}.")]
    Io {
        lba: Lba,
        #[source]
        source: E,
    },
    #[error("No MBR detected. Found signature {0:#06x} instead of `0xAA55`.")]
    NoSignature(u16),
    #[error("First partition is neither inactive nor bootable. Status byte: {0:#04x}.")]
    UnsupportedPartition(u8),
    #[error("The partition does not contain a FAT32 filesystem.")]
    NotFat32,
    #[error("Unsupported bytes per sector: {0}. Only `512` is supported.")]
    UnsupportedSectorSize(u16),
    #[error("Invalid sectors per cluster detected: {0}. Must be a non-zero power of `2`.")]
    InvalidClusterSize(u8),
    #[error("Invalid number of FATs detected: {0}.")]
    InvalidNumberOfFats(u8),
    #[error("Boot file not found in the root directory.")]
    FileNotFound,
    #[error("Invalid cluster in chain: {0}.")]
    InvalidCluster(u32),
    #[error("Cluster chain is longer than the {0} clusters of the volume.")]
    ChainTooLong(u32),
    #[error("Destination buffer too small: {needed} bytes needed, {available} available.")]
    DestinationTooSmall { needed: usize, available: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootFileNameError {
    #[error("Boot file name is empty.")]
    Empty,
    #[error("Boot file name is longer than 8 characters: {0}.")]
    NameTooLong(usize),
    #[error("Boot file extension is longer than 3 characters: {0}.")]
    ExtensionTooLong(usize),
    #[error("Boot file name contains more than one `.`.")]
    MultipleDots,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryDiskError {
    #[error("Reading {count} sectors at LBA {start_lba} exceeds the image.")]
    OutOfRange { start_lba: Lba, count: usize },
    #[error("Buffer of {0} bytes does not match the requested sector count.")]
    BufferLength(usize),
}
