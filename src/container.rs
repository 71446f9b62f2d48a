//! Capabilities the codecs need from the file container that bundles columns.
//!
//! Writers only need somewhere to append a named stream of bytes; readers only
//! need an immutable window over bytes that were written earlier. Both are
//! traits so the codecs stay independent of any concrete container.

use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use memmap2::{Mmap, MmapOptions};

use crate::error::IoContext;
use crate::{Error, Result};

/// Append-only sinks addressed by stream name.
pub trait StreamSink {
    type Output: Write;

    fn open_output(&mut self, name: &str) -> Result<Self::Output>;
}

/// Read-only regions addressed by stream name.
pub trait RegionSource {
    fn map_region(&self, name: &str) -> Result<Region>;
}

/// Writes all of `bytes` or fails; a short write is never reported as success.
pub fn write_fully(sink: &mut dyn Write, bytes: &[u8], context: &str) -> Result<()> {
    sink.write_all(bytes).io_context(|| context.to_string())
}

/// Shared immutable byte window.
///
/// Cloning is cheap and clones share the backing bytes. The bytes are never
/// mutated once a region exists, so regions may be read from any thread.
#[derive(Clone)]
pub struct Region {
    backing: Arc<dyn AsRef<[u8]> + Send + Sync>,
    start: usize,
    end: usize,
}

impl Region {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let end = bytes.len();
        Self {
            backing: Arc::new(bytes),
            start: 0,
            end,
        }
    }

    pub fn from_mmap(map: Mmap) -> Self {
        let end = map.len();
        Self {
            backing: Arc::new(map),
            start: 0,
            end,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &(*self.backing).as_ref()[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Sub-window of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Region> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.len())
            .ok_or_else(|| Error::truncated("region", offset.saturating_add(len), self.len()))?;
        Ok(Region {
            backing: Arc::clone(&self.backing),
            start: self.start + offset,
            end: self.start + end,
        })
    }

    /// Splits off the first `len` bytes, leaving `self` positioned after them.
    pub fn split_to(&mut self, len: usize) -> Result<Region> {
        let head = self.slice(0, len)?;
        self.start += len;
        Ok(head)
    }
}

impl Deref for Region {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Region {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("start", &self.start)
            .field("len", &self.len())
            .finish()
    }
}

/// One file per stream under a directory; regions are read-only maps.
#[derive(Debug, Clone)]
pub struct DirContainer {
    dir: PathBuf,
}

impl DirContainer {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).io_context(|| format!("create {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stream_path(&self, name: &str) -> Result<PathBuf> {
        validate_stream_name(name)?;
        Ok(self.dir.join(name))
    }
}

impl StreamSink for DirContainer {
    type Output = File;

    fn open_output(&mut self, name: &str) -> Result<File> {
        let path = self.stream_path(name)?;
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .io_context(|| format!("open stream {name}"))
    }
}

impl RegionSource for DirContainer {
    fn map_region(&self, name: &str) -> Result<Region> {
        let path = self.stream_path(name)?;
        map_file(&path)
    }
}

/// Maps a whole file read-only.
pub fn map_file(path: &Path) -> Result<Region> {
    let file = File::open(path).io_context(|| format!("open {}", path.display()))?;
    let len = file
        .metadata()
        .io_context(|| format!("stat {}", path.display()))?
        .len() as usize;
    if len == 0 {
        return Ok(Region::from_vec(Vec::new()));
    }
    // SAFETY: segment files are immutable once written; nothing truncates them
    // while a map is alive.
    let map = unsafe { MmapOptions::new().len(len).map(&file) }
        .io_context(|| format!("mmap {}", path.display()))?;
    Ok(Region::from_mmap(map))
}

fn validate_stream_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::InvalidInput(format!("bad stream name[{name}]")));
    }
    Ok(())
}

/// In-memory container, mostly useful for tests and for staging small columns.
#[derive(Debug, Default, Clone)]
pub struct MemoryContainer {
    streams: HashMap<String, Arc<Mutex<Vec<u8>>>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }
}

pub struct MemoryStream {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for MemoryStream {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut buf = self
            .buf
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "stream poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StreamSink for MemoryContainer {
    type Output = MemoryStream;

    fn open_output(&mut self, name: &str) -> Result<MemoryStream> {
        validate_stream_name(name)?;
        let buf = Arc::new(Mutex::new(Vec::new()));
        self.streams.insert(name.to_string(), Arc::clone(&buf));
        Ok(MemoryStream { buf })
    }
}

impl RegionSource for MemoryContainer {
    fn map_region(&self, name: &str) -> Result<Region> {
        let buf = self.streams.get(name).ok_or_else(|| {
            Error::io(
                name,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such stream"),
            )
        })?;
        let bytes = buf
            .lock()
            .map_err(|_| Error::InvalidState("memory stream poisoned"))?
            .clone();
        Ok(Region::from_vec(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn split_to_advances_window() {
        let mut region = Region::from_vec((0u8..10).collect());
        let head = region.split_to(3).unwrap();
        assert_eq!(&head[..], &[0, 1, 2]);
        assert_eq!(&region[..], &[3, 4, 5, 6, 7, 8, 9]);
        let inner = region.slice(2, 2).unwrap();
        assert_eq!(&inner[..], &[5, 6]);
    }

    #[test]
    fn slice_past_end_is_rejected() {
        let region = Region::from_vec(vec![1, 2, 3]);
        assert!(matches!(region.slice(2, 2), Err(Error::Format(_))));
    }

    #[test]
    fn dir_container_maps_what_was_written() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mut container = DirContainer::open(temp.path())?;
        let mut out = container.open_output("a.bin")?;
        write_fully(&mut out, b"hello", "a.bin")?;
        drop(out);

        let region = container.map_region("a.bin")?;
        assert_eq!(&region[..], b"hello");
        Ok(())
    }

    #[test]
    fn dir_container_maps_empty_stream() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let mut container = DirContainer::open(temp.path())?;
        drop(container.open_output("empty")?);
        assert!(container.map_region("empty")?.is_empty());
        Ok(())
    }

    #[test]
    fn stream_names_cannot_escape_directory() {
        let temp = TempDir::new().unwrap();
        let mut container = DirContainer::open(temp.path()).unwrap();
        assert!(matches!(
            container.open_output("../x"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn memory_container_round_trip() -> Result<()> {
        let mut container = MemoryContainer::new();
        let mut out = container.open_output("m")?;
        out.write_all(b"abc").unwrap();
        assert_eq!(&container.map_region("m")?[..], b"abc");
        assert!(container.map_region("missing").is_err());
        Ok(())
    }
}
