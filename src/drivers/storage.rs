// File access seen by the image loader.
// Storage is the seam: SdStorage on target, RamStorage on the host.
// Paths are '/'-separated and relative to the volume root; a leading
// '/' is accepted and ignored.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

// bytes per read_chunk call in read_file
pub const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Read,
    Empty,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "file not found"),
            StorageError::Read => write!(f, "read failed"),
            StorageError::Empty => write!(f, "file is empty"),
        }
    }
}

impl core::error::Error for StorageError {}

pub trait Storage {
    /// Size of the file at `path` in bytes.
    fn file_size(&self, path: &str) -> Result<u32, StorageError>;

    /// Read from `offset` into `buf`; returns bytes read, 0 at EOF.
    fn read_chunk(&self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, StorageError>;
}

impl<S: Storage + ?Sized> Storage for &S {
    fn file_size(&self, path: &str) -> Result<u32, StorageError> {
        (**self).file_size(path)
    }

    fn read_chunk(&self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, StorageError> {
        (**self).read_chunk(path, offset, buf)
    }
}

/// Fill `buf` from the start of `path` in READ_CHUNK pieces; stops at
/// EOF or when `buf` is full. Returns bytes read.
pub fn read_file<S: Storage + ?Sized>(
    storage: &S,
    path: &str,
    buf: &mut [u8],
) -> Result<usize, StorageError> {
    let mut total = 0;
    while total < buf.len() {
        let end = (total + READ_CHUNK).min(buf.len());
        let n = storage.read_chunk(path, total as u32, &mut buf[total..end])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Path components, skipping one leading '/'. `None` for an empty path
/// or one with an empty component.
pub fn split_path(path: &str) -> Option<impl Iterator<Item = &str>> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() || path.split('/').any(str::is_empty) {
        return None;
    }
    Some(path.split('/'))
}

/// In-memory files keyed by path.
#[derive(Default)]
pub struct RamStorage {
    files: Vec<(String, Vec<u8>)>,
}

impl RamStorage {
    pub const fn new() -> Self {
        Self { files: Vec::new() }
    }

    fn key(path: &str) -> &str {
        path.strip_prefix('/').unwrap_or(path)
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let key = Self::key(path);
        match self.files.iter_mut().find(|(p, _)| p.as_str() == key) {
            Some((_, d)) => *d = data,
            None => self.files.push((String::from(key), data)),
        }
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let key = Self::key(path);
        let before = self.files.len();
        self.files.retain(|(p, _)| p.as_str() != key);
        self.files.len() != before
    }

    fn get(&self, path: &str) -> Result<&[u8], StorageError> {
        let key = Self::key(path);
        self.files
            .iter()
            .find(|(p, _)| p.as_str() == key)
            .map(|(_, d)| d.as_slice())
            .ok_or(StorageError::NotFound)
    }
}

impl Storage for RamStorage {
    fn file_size(&self, path: &str) -> Result<u32, StorageError> {
        Ok(self.get(path)?.len() as u32)
    }

    fn read_chunk(&self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.get(path)?;
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn ram_storage_reads_chunks() {
        let mut ram = RamStorage::new();
        ram.insert("/img/a.bmp", &b"hello world"[..]);
        assert_eq!(ram.file_size("img/a.bmp"), Ok(11));
        let mut buf = [0u8; 5];
        assert_eq!(ram.read_chunk("img/a.bmp", 6, &mut buf), Ok(5));
        assert_eq!(&buf, b"world");
        assert_eq!(ram.read_chunk("img/a.bmp", 20, &mut buf), Ok(0));
        assert_eq!(ram.file_size("missing"), Err(StorageError::NotFound));
    }

    #[test]
    fn insert_replaces_and_remove_deletes() {
        let mut ram = RamStorage::new();
        ram.insert("x", &b"1"[..]);
        ram.insert("/x", &b"22"[..]);
        assert_eq!(ram.file_size("x"), Ok(2));
        assert!(ram.remove("x"));
        assert!(!ram.remove("x"));
    }

    /// Counts read_chunk calls.
    struct Counting {
        inner: RamStorage,
        calls: Cell<usize>,
    }

    impl Storage for Counting {
        fn file_size(&self, path: &str) -> Result<u32, StorageError> {
            self.inner.file_size(path)
        }

        fn read_chunk(&self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, StorageError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.read_chunk(path, offset, buf)
        }
    }

    #[test]
    fn read_file_uses_fixed_chunks() {
        let mut inner = RamStorage::new();
        inner.insert("big", vec![7u8; READ_CHUNK * 2 + 10]);
        let storage = Counting {
            inner,
            calls: Cell::new(0),
        };
        let mut buf = vec![0u8; READ_CHUNK * 2 + 10];
        assert_eq!(read_file(&storage, "big", &mut buf), Ok(READ_CHUNK * 2 + 10));
        assert_eq!(storage.calls.get(), 3);
        assert!(buf.iter().all(|&b| b == 7));
    }

    #[test]
    fn read_file_stops_at_eof() {
        let mut ram = RamStorage::new();
        ram.insert("short", &b"abc"[..]);
        let mut buf = [0u8; 8];
        assert_eq!(read_file(&ram, "short", &mut buf), Ok(3));
    }

    #[test]
    fn split_path_rejects_empty_components() {
        let parts: Vec<&str> = split_path("/images/logo.png").unwrap().collect();
        assert_eq!(parts, ["images", "logo.png"]);
        assert!(split_path("").is_none());
        assert!(split_path("/").is_none());
        assert!(split_path("a//b").is_none());
        assert!(split_path("a/").is_none());
    }
}
