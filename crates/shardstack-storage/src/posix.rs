//! POSIX filesystem implementation of [`StorageBackend`].
//!
//! Volumes are directories directly under the backend root; files live at
//! their forward-slash path below the volume directory. Writers create the
//! target with a fresh inode so a replaced file never disturbs readers that
//! still hold the old one open.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::backend::{FileReader, FileWriter, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::types::{FileEntry, FileInfo, ListPage, VolInfo};
use crate::validate::{check_path, check_prefix, check_volname};

/// Minimum free disk space policy enforced on file creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinFreeDisk {
    /// No free-space check.
    #[default]
    Disabled,
    /// Reject creates when free space falls below this percentage of the
    /// filesystem capacity.
    Percent(u64),
    /// Reject creates when free space falls below this many bytes.
    Bytes(u64),
}

impl MinFreeDisk {
    /// Parse a `min-free-disk` setting: `"10%"` or an absolute byte count.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for anything else.
    pub fn parse(value: &str) -> StorageResult<Self> {
        let value = value.trim();
        if value.is_empty() || value == "0" {
            return Ok(Self::Disabled);
        }
        if let Some(pct) = value.strip_suffix('%') {
            let pct: u64 = pct.trim().parse().map_err(|_| StorageError::InvalidArgument {
                message: format!("invalid min-free-disk percentage: {value:?}"),
            })?;
            if pct > 100 {
                return Err(StorageError::InvalidArgument {
                    message: format!("min-free-disk percentage out of range: {pct}"),
                });
            }
            return Ok(Self::Percent(pct));
        }
        let bytes: u64 = value.parse().map_err(|_| StorageError::InvalidArgument {
            message: format!("invalid min-free-disk value: {value:?}"),
        })?;
        Ok(Self::Bytes(bytes))
    }
}

/// A local filesystem disk backend rooted at a directory.
#[derive(Debug)]
pub struct PosixBackend {
    /// Root directory holding one subdirectory per volume.
    root: PathBuf,
    /// Free-space policy checked on every `create_file`.
    min_free: MinFreeDisk,
}

impl PosixBackend {
    /// Open a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the root cannot be created.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        Self::with_min_free(root, MinFreeDisk::Disabled).await
    }

    /// Open a backend with a minimum free-space policy.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the root cannot be created.
    pub async fn with_min_free(
        root: impl Into<PathBuf>,
        min_free: MinFreeDisk,
    ) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), ?min_free, "opened posix backend");
        Ok(Self { root, min_free })
    }

    /// The backend root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn vol_dir(&self, volume: &str) -> PathBuf {
        self.root.join(volume)
    }

    fn file_path(&self, volume: &str, path: &str) -> PathBuf {
        let mut p = self.vol_dir(volume);
        p.extend(path.split('/'));
        p
    }

    async fn require_vol(&self, volume: &str) -> StorageResult<PathBuf> {
        check_volname(volume)?;
        let dir = self.vol_dir(volume);
        match tokio::fs::metadata(&dir).await {
            Ok(md) if md.is_dir() => Ok(dir),
            Ok(_) => Err(StorageError::VolumeNotFound {
                volume: volume.to_owned(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::VolumeNotFound {
                    volume: volume.to_owned(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check_free_space(&self) -> StorageResult<()> {
        let (min_bytes, stat) = match self.min_free {
            MinFreeDisk::Disabled => return Ok(()),
            MinFreeDisk::Percent(pct) => {
                let stat = rustix::fs::statvfs(&self.root).map_err(std::io::Error::from)?;
                (stat.f_blocks * stat.f_frsize * pct / 100, stat)
            }
            MinFreeDisk::Bytes(bytes) => {
                let stat = rustix::fs::statvfs(&self.root).map_err(std::io::Error::from)?;
                (bytes, stat)
            }
        };
        let free = stat.f_bavail * stat.f_frsize;
        if free < min_bytes {
            warn!(root = %self.root.display(), free, min_bytes, "rejecting create: disk full");
            return Err(StorageError::DiskFull {
                disk: self.root.display().to_string(),
            });
        }
        Ok(())
    }

    /// Remove empty directories from `dir` up to (but excluding) `stop`.
    async fn prune_empty_dirs(mut dir: PathBuf, stop: &Path) {
        while dir != stop && dir.starts_with(stop) {
            if tokio::fs::remove_dir(&dir).await.is_err() {
                break;
            }
            if !dir.pop() {
                break;
            }
        }
    }
}

/// One sorted directory entry, the name carrying a trailing `/` for
/// directories so names compare in volume-relative order.
struct DirEnt {
    name: String,
    size: u64,
    mod_time: DateTime<Utc>,
}

impl DirEnt {
    fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Read a directory, returning entries sorted by their listing name.
async fn read_dir_sorted(dir: &Path) -> StorageResult<Vec<DirEnt>> {
    let mut rd = tokio::fs::read_dir(dir).await?;
    let mut out = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            warn!(path = %entry.path().display(), "skipping non-utf8 entry");
            continue;
        };
        let md = match entry.metadata().await {
            Ok(md) => md,
            Err(e) => {
                // Entry may have vanished between readdir and stat.
                trace!(path = %entry.path().display(), error = %e, "skipping unstatable entry");
                continue;
            }
        };
        let mod_time = md.modified().map(DateTime::<Utc>::from).unwrap_or_default();
        if md.is_dir() {
            out.push(DirEnt {
                name: format!("{name}/"),
                size: 0,
                mod_time,
            });
        } else {
            out.push(DirEnt {
                name,
                size: md.len(),
                mod_time,
            });
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

/// The directory portion of a prefix: everything up to and including the
/// last `/`, or the empty string.
fn prefix_dir(prefix: &str) -> &str {
    match prefix.rfind('/') {
        Some(idx) => &prefix[..=idx],
        None => "",
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Append-only writer over a freshly created file.
struct PosixFileWriter {
    file: File,
    abs: PathBuf,
    vol_dir: PathBuf,
}

#[async_trait]
impl FileWriter for PosixFileWriter {
    async fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        self.file.write_all(data).await?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        match tokio::fs::remove_file(&self.abs).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = self.abs.parent() {
            PosixBackend::prune_empty_dirs(parent.to_path_buf(), &self.vol_dir).await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StorageBackend impl
// ---------------------------------------------------------------------------

#[async_trait]
impl StorageBackend for PosixBackend {
    async fn make_vol(&self, volume: &str) -> StorageResult<()> {
        check_volname(volume)?;
        match tokio::fs::create_dir(self.vol_dir(volume)).await {
            Ok(()) => {
                debug!(volume, "created volume");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::VolumeExists {
                    volume: volume.to_owned(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_vol(&self, volume: &str) -> StorageResult<()> {
        check_volname(volume)?;
        match tokio::fs::remove_dir(self.vol_dir(volume)).await {
            Ok(()) => {
                debug!(volume, "deleted volume");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::VolumeNotFound {
                    volume: volume.to_owned(),
                })
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::DirectoryNotEmpty
                    || e.raw_os_error() == Some(rustix::io::Errno::NOTEMPTY.raw_os_error()) =>
            {
                Err(StorageError::VolumeNotEmpty {
                    volume: volume.to_owned(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_vols(&self) -> StorageResult<Vec<VolInfo>> {
        let mut rd = tokio::fs::read_dir(&self.root).await?;
        let mut vols = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let md = entry.metadata().await?;
            if !md.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let created = md
                .created()
                .or_else(|_| md.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            vols.push(VolInfo { name, created });
        }
        vols.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(vols)
    }

    async fn stat_vol(&self, volume: &str) -> StorageResult<VolInfo> {
        let dir = self.require_vol(volume).await?;
        let md = tokio::fs::metadata(&dir).await?;
        let created = md
            .created()
            .or_else(|_| md.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_default();
        Ok(VolInfo {
            name: volume.to_owned(),
            created,
        })
    }

    async fn create_file(
        &self,
        volume: &str,
        path: &str,
    ) -> StorageResult<Box<dyn FileWriter>> {
        let vol_dir = self.require_vol(volume).await?;
        check_path(path)?;
        self.check_free_space()?;

        let abs = self.file_path(volume, path);
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Unlink first so the new file gets a fresh inode; readers holding
        // the previous file keep streaming its old content.
        match tokio::fs::remove_file(&abs).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs)
            .await?;
        trace!(volume, path, "opened file writer");
        Ok(Box::new(PosixFileWriter {
            file,
            abs,
            vol_dir,
        }))
    }

    async fn read_file(
        &self,
        volume: &str,
        path: &str,
        offset: u64,
    ) -> StorageResult<FileReader> {
        self.require_vol(volume).await?;
        check_path(path)?;

        let abs = self.file_path(volume, path);
        let mut file = match File::open(&abs).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound {
                    volume: volume.to_owned(),
                    path: path.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !file.metadata().await?.is_file() {
            return Err(StorageError::FileNotFound {
                volume: volume.to_owned(),
                path: path.to_owned(),
            });
        }
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Box::new(file))
    }

    async fn stat_file(&self, volume: &str, path: &str) -> StorageResult<FileInfo> {
        self.require_vol(volume).await?;
        check_path(path)?;

        let abs = self.file_path(volume, path);
        let md = match tokio::fs::metadata(&abs).await {
            Ok(md) if md.is_file() => md,
            Ok(_) | Err(_) => {
                return Err(StorageError::FileNotFound {
                    volume: volume.to_owned(),
                    path: path.to_owned(),
                });
            }
        };
        Ok(FileInfo {
            size: md.len(),
            mod_time: md.modified().map(DateTime::<Utc>::from).unwrap_or_default(),
            etag: None,
        })
    }

    async fn delete_file(&self, volume: &str, path: &str) -> StorageResult<()> {
        let vol_dir = self.require_vol(volume).await?;
        check_path(path)?;

        let abs = self.file_path(volume, path);
        match tokio::fs::remove_file(&abs).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound {
                    volume: volume.to_owned(),
                    path: path.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = abs.parent() {
            Self::prune_empty_dirs(parent.to_path_buf(), &vol_dir).await;
        }
        trace!(volume, path, "deleted file");
        Ok(())
    }

    async fn list_files(
        &self,
        volume: &str,
        prefix: &str,
        marker: &str,
        recursive: bool,
        max_entries: usize,
    ) -> StorageResult<ListPage> {
        let vol_dir = self.require_vol(volume).await?;
        check_prefix(prefix)?;
        if max_entries == 0 {
            return Ok(ListPage {
                entries: Vec::new(),
                eof: false,
            });
        }

        let walk_root = prefix_dir(prefix).to_owned();
        let start = vol_dir.join(&walk_root);
        if tokio::fs::metadata(&start).await.is_err() {
            // Prefix directory absent: an empty, exhausted listing.
            return Ok(ListPage {
                entries: Vec::new(),
                eof: true,
            });
        }

        let mut entries = Vec::new();

        if !recursive {
            for ent in read_dir_sorted(&start).await? {
                let rel = format!("{walk_root}{}", ent.name);
                if rel.starts_with(prefix) && rel.as_str() > marker {
                    entries.push(FileEntry {
                        name: rel,
                        size: ent.size,
                        mod_time: ent.mod_time,
                    });
                    if entries.len() == max_entries {
                        return Ok(ListPage {
                            entries,
                            eof: false,
                        });
                    }
                }
            }
            return Ok(ListPage { entries, eof: true });
        }

        // Depth-first walk with an explicit stack so names come out in
        // volume-relative lexicographic order.
        struct Frame {
            dir_rel: String,
            iter: std::vec::IntoIter<DirEnt>,
        }
        let mut stack = vec![Frame {
            dir_rel: walk_root,
            iter: read_dir_sorted(&start).await?.into_iter(),
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(ent) = frame.iter.next() else {
                stack.pop();
                continue;
            };
            let rel = format!("{}{}", frame.dir_rel, ent.name);
            if ent.is_dir() {
                // Descend only when the subtree can still contain matches
                // past the marker.
                let overlaps_prefix = rel.starts_with(prefix) || prefix.starts_with(&rel);
                let past_marker = rel.as_str() > marker || marker.starts_with(&rel);
                if overlaps_prefix && past_marker {
                    let abs = vol_dir.join(&rel);
                    let children = read_dir_sorted(&abs).await?.into_iter();
                    stack.push(Frame {
                        dir_rel: rel,
                        iter: children,
                    });
                }
            } else if rel.starts_with(prefix) && rel.as_str() > marker {
                entries.push(FileEntry {
                    name: rel,
                    size: ent.size,
                    mod_time: ent.mod_time,
                });
                if entries.len() == max_entries {
                    return Ok(ListPage {
                        entries,
                        eof: false,
                    });
                }
            }
        }

        Ok(ListPage { entries, eof: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn backend() -> (tempfile::TempDir, PosixBackend) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let backend = PosixBackend::new(dir.path())
            .await
            .unwrap_or_else(|e| panic!("backend open failed: {e}"));
        (dir, backend)
    }

    async fn write_file(backend: &PosixBackend, volume: &str, path: &str, data: &[u8]) {
        let mut w = backend
            .create_file(volume, path)
            .await
            .unwrap_or_else(|e| panic!("create_file failed: {e}"));
        w.append(data)
            .await
            .unwrap_or_else(|e| panic!("append failed: {e}"));
        w.commit()
            .await
            .unwrap_or_else(|e| panic!("commit failed: {e}"));
    }

    async fn read_all(backend: &PosixBackend, volume: &str, path: &str, offset: u64) -> Vec<u8> {
        let mut r = backend
            .read_file(volume, path, offset)
            .await
            .unwrap_or_else(|e| panic!("read_file failed: {e}"));
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)
            .await
            .unwrap_or_else(|e| panic!("read failed: {e}"));
        buf
    }

    // -----------------------------------------------------------------------
    // Volumes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_create_and_stat_volume() {
        let (_dir, backend) = backend().await;
        backend
            .make_vol("bucket")
            .await
            .unwrap_or_else(|e| panic!("make_vol failed: {e}"));
        let info = backend
            .stat_vol("bucket")
            .await
            .unwrap_or_else(|e| panic!("stat_vol failed: {e}"));
        assert_eq!(info.name, "bucket");
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_volume() {
        let (_dir, backend) = backend().await;
        backend.make_vol("bucket").await.expect("first make_vol");
        let result = backend.make_vol("bucket").await;
        assert!(matches!(result, Err(StorageError::VolumeExists { .. })));
    }

    #[tokio::test]
    async fn test_should_reject_invalid_volume_name() {
        let (_dir, backend) = backend().await;
        let result = backend.make_vol("No").await;
        assert!(matches!(
            result,
            Err(StorageError::InvalidVolumeName { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_reject_delete_of_nonempty_volume() {
        let (_dir, backend) = backend().await;
        backend.make_vol("bucket").await.expect("make_vol");
        write_file(&backend, "bucket", "obj", b"data").await;
        let result = backend.delete_vol("bucket").await;
        assert!(matches!(result, Err(StorageError::VolumeNotEmpty { .. })));
    }

    #[tokio::test]
    async fn test_should_list_volumes_sorted() {
        let (_dir, backend) = backend().await;
        for vol in ["zebra", "apple", "mango"] {
            backend.make_vol(vol).await.expect("make_vol");
        }
        let vols = backend.list_vols().await.expect("list_vols");
        let names: Vec<_> = vols.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["apple", "mango", "zebra"]);
    }

    #[tokio::test]
    async fn test_should_report_missing_volume() {
        let (_dir, backend) = backend().await;
        assert!(matches!(
            backend.stat_vol("ghost").await,
            Err(StorageError::VolumeNotFound { .. })
        ));
        assert!(matches!(
            backend.delete_vol("ghost").await,
            Err(StorageError::VolumeNotFound { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_write_and_read_file() {
        let (_dir, backend) = backend().await;
        backend.make_vol("bucket").await.expect("make_vol");
        write_file(&backend, "bucket", "a/b/obj", b"hello world").await;

        assert_eq!(read_all(&backend, "bucket", "a/b/obj", 0).await, b"hello world");
        assert_eq!(read_all(&backend, "bucket", "a/b/obj", 6).await, b"world");

        let info = backend
            .stat_file("bucket", "a/b/obj")
            .await
            .expect("stat_file");
        assert_eq!(info.size, 11);
    }

    #[tokio::test]
    async fn test_should_report_missing_file() {
        let (_dir, backend) = backend().await;
        backend.make_vol("bucket").await.expect("make_vol");
        assert!(matches!(
            backend.read_file("bucket", "ghost", 0).await,
            Err(StorageError::FileNotFound { .. })
        ));
        assert!(matches!(
            backend.stat_file("bucket", "ghost").await,
            Err(StorageError::FileNotFound { .. })
        ));
        assert!(matches!(
            backend.delete_file("bucket", "ghost").await,
            Err(StorageError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_prune_empty_parents_on_delete() {
        let (_dir, backend) = backend().await;
        backend.make_vol("bucket").await.expect("make_vol");
        write_file(&backend, "bucket", "a/b/c/obj", b"x").await;
        backend
            .delete_file("bucket", "a/b/c/obj")
            .await
            .expect("delete_file");

        // The intermediate directories are gone, so a listing is empty.
        let page = backend
            .list_files("bucket", "", "", true, 10)
            .await
            .expect("list_files");
        assert!(page.entries.is_empty());
        assert!(page.eof);
        // The volume itself survives.
        assert!(backend.stat_vol("bucket").await.is_ok());
    }

    #[tokio::test]
    async fn test_should_keep_old_content_for_open_readers_on_replace() {
        let (_dir, backend) = backend().await;
        backend.make_vol("bucket").await.expect("make_vol");
        write_file(&backend, "bucket", "obj", b"old-old-old").await;

        let mut reader = backend
            .read_file("bucket", "obj", 0)
            .await
            .expect("read_file");

        write_file(&backend, "bucket", "obj", b"new").await;

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.expect("read");
        assert_eq!(buf, b"old-old-old");
        assert_eq!(read_all(&backend, "bucket", "obj", 0).await, b"new");
    }

    #[tokio::test]
    async fn test_should_discard_file_on_abort() {
        let (_dir, backend) = backend().await;
        backend.make_vol("bucket").await.expect("make_vol");
        let mut w = backend
            .create_file("bucket", "a/obj")
            .await
            .expect("create_file");
        w.append(b"partial").await.expect("append");
        w.abort().await.expect("abort");

        assert!(matches!(
            backend.stat_file("bucket", "a/obj").await,
            Err(StorageError::FileNotFound { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    async fn listing_fixture() -> (tempfile::TempDir, PosixBackend) {
        let (dir, backend) = backend().await;
        backend.make_vol("bucket").await.expect("make_vol");
        for path in ["a/x", "a/y", "b/sub/deep", "top"] {
            write_file(&backend, "bucket", path, b"data").await;
        }
        (dir, backend)
    }

    #[tokio::test]
    async fn test_should_list_recursively_in_order() {
        let (_dir, backend) = listing_fixture().await;
        let page = backend
            .list_files("bucket", "", "", true, 100)
            .await
            .expect("list_files");
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a/x", "a/y", "b/sub/deep", "top"]);
        assert!(page.eof);
    }

    #[tokio::test]
    async fn test_should_list_one_level_with_dirs() {
        let (_dir, backend) = listing_fixture().await;
        let page = backend
            .list_files("bucket", "", "", false, 100)
            .await
            .expect("list_files");
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a/", "b/", "top"]);
    }

    #[tokio::test]
    async fn test_should_resume_from_marker() {
        let (_dir, backend) = listing_fixture().await;
        let page = backend
            .list_files("bucket", "", "a/x", true, 100)
            .await
            .expect("list_files");
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a/y", "b/sub/deep", "top"]);
    }

    #[tokio::test]
    async fn test_should_filter_by_prefix() {
        let (_dir, backend) = listing_fixture().await;
        let page = backend
            .list_files("bucket", "a/", "", true, 100)
            .await
            .expect("list_files");
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a/x", "a/y"]);

        // Partial-component prefix.
        let page = backend
            .list_files("bucket", "to", "", true, 100)
            .await
            .expect("list_files");
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["top"]);
    }

    #[tokio::test]
    async fn test_should_truncate_at_max_entries() {
        let (_dir, backend) = listing_fixture().await;
        let page = backend
            .list_files("bucket", "", "", true, 2)
            .await
            .expect("list_files");
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a/x", "a/y"]);
        assert!(!page.eof);

        // Continue from the last name.
        let page = backend
            .list_files("bucket", "", "a/y", true, 2)
            .await
            .expect("list_files");
        let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b/sub/deep", "top"]);
    }

    #[tokio::test]
    async fn test_should_return_empty_listing_for_absent_prefix_dir() {
        let (_dir, backend) = listing_fixture().await;
        let page = backend
            .list_files("bucket", "nothing/here/", "", true, 100)
            .await
            .expect("list_files");
        assert!(page.entries.is_empty());
        assert!(page.eof);
    }

    // -----------------------------------------------------------------------
    // Free-space policy
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_reject_create_when_below_min_free() {
        let dir = tempfile::tempdir().expect("tempdir");
        // u64::MAX bytes can never be free.
        let backend = PosixBackend::with_min_free(dir.path(), MinFreeDisk::Bytes(u64::MAX))
            .await
            .expect("backend open");
        backend.make_vol("bucket").await.expect("make_vol");
        let result = backend.create_file("bucket", "obj").await;
        assert!(matches!(result, Err(StorageError::DiskFull { .. })));
    }

    #[test]
    fn test_should_parse_min_free_disk_settings() {
        assert_eq!(MinFreeDisk::parse("").expect("empty"), MinFreeDisk::Disabled);
        assert_eq!(
            MinFreeDisk::parse("10%").expect("pct"),
            MinFreeDisk::Percent(10)
        );
        assert_eq!(
            MinFreeDisk::parse("1048576").expect("bytes"),
            MinFreeDisk::Bytes(1_048_576)
        );
        assert!(MinFreeDisk::parse("150%").is_err());
        assert!(MinFreeDisk::parse("lots").is_err());
    }
}
