use crate::{DEFAULT_BOOT_FILE, dir::name::ShortName};

/// What to load and how far to search for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(derive_builder::Builder))]
pub struct LoaderOptions {
    /// 8.3 name of the file to load from the root directory.
    #[cfg_attr(feature = "std", builder(default = "DEFAULT_BOOT_FILE"))]
    pub boot_file: ShortName,

    /// Follow the root directory's cluster chain past its first cluster. Off by default,
    /// boot images keep the boot file within the first root directory cluster.
    #[cfg_attr(feature = "std", builder(default = "false"))]
    pub follow_root_chain: bool,
}

impl LoaderOptions {
    pub const fn new(boot_file: ShortName) -> LoaderOptions {
        Self {
            boot_file,
            follow_root_chain: false,
        }
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BOOT_FILE)
    }
}

#[cfg(feature = "std")]
#[test]
fn builder_defaults() {
    let options = LoaderOptionsBuilder::default().build().unwrap();
    assert_eq!(options, LoaderOptions::default());

    let options = LoaderOptionsBuilder::default()
        .boot_file(ShortName::new("VMLINUZ", ""))
        .follow_root_chain(true)
        .build()
        .unwrap();
    assert_eq!(options.boot_file, ShortName::new("VMLINUZ", ""));
    assert!(options.follow_root_chain);
}
