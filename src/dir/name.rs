use core::fmt;

use crate::error::BootFileNameError;

const NAME_LEN: usize = 8;
const EXT_LEN: usize = 3;

/// The 8.3 name the loader looks for.
///
/// Only the given characters are compared, case-exact. The on-disk name must end right
/// after them, i.e. the following byte of the 8-byte name field has to be a space (or
/// NUL); the extension is compared as a prefix.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShortName {
    name: [u8; NAME_LEN],
    name_len: u8,
    ext: [u8; EXT_LEN],
    ext_len: u8,
}

impl ShortName {
    /// Builds a name at compile time. Panics if a part is too long or the name is empty.
    pub const fn new(name: &str, ext: &str) -> ShortName {
        match Self::try_new(name.as_bytes(), ext.as_bytes()) {
            Ok(name) => name,
            Err(_) => panic!("boot file name does not fit into 8.3"),
        }
    }

    pub const fn try_new(name: &[u8], ext: &[u8]) -> Result<ShortName, BootFileNameError> {
        if name.is_empty() {
            return Err(BootFileNameError::Empty);
        }
        if name.len() > NAME_LEN {
            return Err(BootFileNameError::NameTooLong(name.len()));
        }
        if ext.len() > EXT_LEN {
            return Err(BootFileNameError::ExtensionTooLong(ext.len()));
        }

        let mut short = ShortName {
            name: [b' '; NAME_LEN],
            name_len: name.len() as u8,
            ext: [b' '; EXT_LEN],
            ext_len: ext.len() as u8,
        };

        let mut i = 0;
        while i < name.len() {
            short.name[i] = name[i];
            i += 1;
        }
        let mut i = 0;
        while i < ext.len() {
            short.ext[i] = ext[i];
            i += 1;
        }

        Ok(short)
    }

    /// Parses `NAME.EXT` (or `NAME` without extension).
    pub fn parse(value: &str) -> Result<ShortName, BootFileNameError> {
        let mut parts = value.splitn(3, '.');
        let name = parts.next().unwrap_or_default();
        let ext = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(BootFileNameError::MultipleDots);
        }
        Self::try_new(name.as_bytes(), ext.as_bytes())
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    pub fn ext(&self) -> &[u8] {
        &self.ext[..self.ext_len as usize]
    }

    /// Compares against the raw name and extension fields of a directory entry.
    pub fn matches(&self, name: &[u8; NAME_LEN], ext: &[u8; EXT_LEN]) -> bool {
        let name_len = self.name_len as usize;

        if !name.starts_with(self.name()) || !ext.starts_with(self.ext()) {
            return false;
        }

        // names are space padded, not NUL terminated
        match name.get(name_len) {
            None | Some(b' ') | Some(0) => true,
            Some(_) => false,
        }
    }
}

impl Default for ShortName {
    fn default() -> Self {
        crate::DEFAULT_BOOT_FILE
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &c in self.name() {
            write!(f, "{}", c as char)?;
        }
        if self.ext_len > 0 {
            f.write_str(".")?;
            for &c in self.ext() {
                write!(f, "{}", c as char)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortName({self})")
    }
}

#[test]
fn padded_names_match() {
    let target = ShortName::new("KERNEL", "IMG");
    assert!(target.matches(b"KERNEL  ", b"IMG"));
    assert!(target.matches(b"KERNEL\0\0", b"IMG"));
    assert!(!target.matches(b"KERNELS ", b"IMG"));
    assert!(!target.matches(b"KERNEL  ", b"BIN"));
    assert!(!target.matches(b"kernel  ", b"img"));
    assert!(!target.matches(b"KERN    ", b"IMG"));
}

#[test]
fn full_length_name_has_no_trailing_byte() {
    let target = ShortName::new("BOOTLOAD", "BIN");
    assert!(target.matches(b"BOOTLOAD", b"BIN"));
    assert!(!target.matches(b"BOOTLOAX", b"BIN"));
}

#[test]
fn parse_rejects_invalid_names() {
    assert_eq!(ShortName::parse("KERNEL.IMG"), Ok(ShortName::new("KERNEL", "IMG")));
    assert_eq!(ShortName::parse("ZIMAGE"), Ok(ShortName::new("ZIMAGE", "")));
    assert_eq!(ShortName::parse(""), Err(BootFileNameError::Empty));
    assert_eq!(ShortName::parse(".IMG"), Err(BootFileNameError::Empty));
    assert_eq!(
        ShortName::parse("VMLINUZ-6.IMG"),
        Err(BootFileNameError::NameTooLong(9))
    );
    assert_eq!(
        ShortName::parse("KERNEL.ELF64"),
        Err(BootFileNameError::ExtensionTooLong(5))
    );
    assert_eq!(
        ShortName::parse("A.B.C"),
        Err(BootFileNameError::MultipleDots)
    );
}

#[test]
fn display_uses_dotted_form() {
    assert_eq!(ShortName::new("KERNEL", "IMG").to_string(), "KERNEL.IMG");
    assert_eq!(ShortName::new("ZIMAGE", "").to_string(), "ZIMAGE");
}
