//! # fat32-boot
//!
//! Allocation-free loading of a kernel image from a FAT32 volume, for stage-2 bootloaders.
//!
//! The loader reads the MBR, takes its first partition, checks that it holds a FAT32
//! volume and copies the cluster chain of a fixed 8.3 file from the root directory into
//! a caller supplied buffer. Diagnostics go through the [`log`] facade.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fat32_boot::{LoaderOptions, ShortName, disk::MemoryDisk, load_kernel_with};
//!
//! # let image = vec![0u8; 4 * 1024 * 1024];
//! let mut disk = MemoryDisk::new(&image);
//! let mut kernel = vec![0u8; 1024 * 1024];
//!
//! let options = LoaderOptions::new(ShortName::new("KERNEL", "IMG"));
//! let loaded = load_kernel_with(&mut disk, &options, &mut kernel).unwrap();
//!
//! println!("loaded {} bytes from cluster {}", loaded.bytes_written, loaded.start_cluster);
//! ```
//!
//! ## Limitations
//! Read-only, FAT32 only, 512-byte sectors, MBR partition tables only. The boot file must
//! live in the root directory.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

/// Volume boot record parsing and address arithmetic
pub mod boot_sector;
/// Cluster chain walking
pub mod cluster;
/// Root directory scanning
pub mod dir;
/// Block device abstraction
pub mod disk;
pub mod error;
/// File allocation table entries
pub mod fat;
pub mod loader;
/// Partition table parsing
pub mod mbr;
mod options;

pub use boot_sector::{Geometry, parse_boot_sector};
pub use dir::name::ShortName;
pub use error::LoadError;
pub use loader::{LoadedImage, load_boot_file, load_kernel, load_kernel_at, load_kernel_with};
pub use mbr::locate_first_partition;
#[cfg(feature = "std")]
pub use options::LoaderOptionsBuilder;
pub use options::LoaderOptions;

/// Boot file looked up when no other name is configured.
pub const DEFAULT_BOOT_FILE: ShortName = ShortName::new("KERNEL", "IMG");

/// One mebibyte, for sizing load buffers.
pub const MB: u32 = 1024 * 1024;
