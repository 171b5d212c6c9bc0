//! Random-access sources of package bytes.
//!
//! Sessions for different endpoints read the same package concurrently and
//! out of order, so every source uses positioned reads with no shared cursor.

use std::fmt;
#[cfg(any(unix, windows))]
use std::fs::File;
use std::io;
#[cfg(any(unix, windows))]
use std::path::Path;
use std::sync::Arc;

/// Read-only, random-access view of a firmware package
pub trait PackageByteSource: Send + Sync + fmt::Debug {
    /// Fill `buf` with the bytes starting at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range cannot be read in full.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Total package length in bytes
    fn len(&self) -> u64;

    /// Whether the package is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether reads finish without touching storage.
    ///
    /// Sessions read such sources inline; every other source is read on the
    /// blocking thread pool.
    fn is_in_memory(&self) -> bool {
        false
    }
}

/// Package held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryPackage {
    bytes: Arc<[u8]>,
}

impl MemoryPackage {
    /// Wrap package bytes
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl PackageByteSource for MemoryPackage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|_overflow| {
            io::Error::new(io::ErrorKind::InvalidInput, "offset out of range")
        })?;
        let source = start
            .checked_add(buf.len())
            .and_then(|end| self.bytes.get(start..end))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "read of {} bytes at {offset} past end of {}-byte package",
                        buf.len(),
                        self.bytes.len()
                    ),
                )
            })?;
        buf.copy_from_slice(source);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn is_in_memory(&self) -> bool {
        true
    }
}

/// Package backed by a file on disk
///
/// Only available on targets with positioned file reads.
#[cfg(any(unix, windows))]
#[cfg_attr(docsrs, doc(cfg(any(unix, windows))))]
#[derive(Debug)]
pub struct FilePackage {
    file: File,
    len: u64,
}

#[cfg(any(unix, windows))]
impl FilePackage {
    /// Open a package file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or inspected.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

#[cfg(any(unix, windows))]
impl PackageByteSource for FilePackage {
    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut filled = 0usize;
        while filled < buf.len() {
            let Some(rest) = buf.get_mut(filled..) else {
                break;
            };
            let read = self.file.seek_read(rest, offset + filled as u64)?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "package file ended early",
                ));
            }
            filled += read;
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }
}
