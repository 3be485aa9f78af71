//! Incremental log file reader.
//!
//! Each poll reads only the bytes appended since the previous poll and adds
//! them to an in-memory copy of the log. Bytes that are not valid UTF-8 are
//! replaced; a multibyte character cut in half by a poll is held back until
//! the rest of it arrives.
//!
//! When the file is truncated or replaced by a different file, the copy
//! starts over and the tail's generation goes up.

use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Accumulated contents of one log file.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    offset: u64,
    text: String,
    pending: Vec<u8>,
    lines: usize,
    present: bool,
    modified: Option<SystemTime>,
    identity: Option<FileIdentity>,
    generation: u64,
}

/// What tells one file apart from another at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileIdentity {
    #[cfg(unix)]
    Inode { dev: u64, ino: u64 },
    #[cfg(not(unix))]
    Created(SystemTime),
}

#[cfg(unix)]
fn file_identity(meta: &Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity::Inode {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
fn file_identity(meta: &Metadata) -> Option<FileIdentity> {
    meta.created().ok().map(FileIdentity::Created)
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            text: String::new(),
            pending: Vec::new(),
            lines: 0,
            present: false,
            modified: None,
            identity: None,
            generation: 0,
        }
    }

    /// Times the accumulated text has started over.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Everything read so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.lines
    }

    /// Whether the file existed at the last poll.
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Time since the file was last modified, as of `now`.
    pub fn age(&self, now: SystemTime) -> Option<Duration> {
        self.modified.and_then(|m| now.duration_since(m).ok())
    }

    /// Read newly appended bytes. Returns how many were read.
    ///
    /// A missing file is not an error: the tail keeps what it has and reports
    /// the file absent. A file that got shorter, or is no longer the file
    /// read before, was truncated or rotated, so the tail starts over from
    /// its beginning.
    pub async fn poll(&mut self) -> io::Result<usize> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.present = false;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        self.present = true;
        self.modified = meta.modified().ok();

        let len = meta.len();
        let identity = file_identity(&meta);
        let replaced = self.identity.is_some() && identity.is_some() && identity != self.identity;
        self.identity = identity;
        if replaced {
            tracing::info!(path = %self.path.display(), offset = self.offset, "log rotated, starting over");
            self.reset();
        } else if len < self.offset {
            tracing::info!(path = %self.path.display(), len, offset = self.offset, "log truncated, starting over");
            self.reset();
        }
        if len == self.offset {
            return Ok(0);
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.take(len - self.offset).read_to_end(&mut buf).await?;

        self.offset += buf.len() as u64;
        self.append(&buf);
        Ok(buf.len())
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.offset = 0;
        self.text.clear();
        self.pending.clear();
        self.lines = 0;
    }

    fn append(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let keep = incomplete_suffix_len(&self.pending);
        let tail = self.pending.split_off(self.pending.len() - keep);

        let decoded = String::from_utf8_lossy(&self.pending);
        self.lines += decoded.matches('\n').count();
        self.text.push_str(&decoded);

        self.pending = tail;
    }
}

/// Length of a trailing, not yet complete UTF-8 sequence.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        let b = bytes[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let need = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        let have = bytes.len() - i;
        return if have < need { have } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn incomplete_suffix_detection() {
        assert_eq!(incomplete_suffix_len(b"abc"), 0);
        let check = "✓".as_bytes(); // 3 bytes
        assert_eq!(incomplete_suffix_len(&check[..1]), 1);
        assert_eq!(incomplete_suffix_len(&check[..2]), 2);
        assert_eq!(incomplete_suffix_len(check), 0);
        // Stray continuation bytes are left for lossy decoding.
        assert_eq!(incomplete_suffix_len(&[0x80, 0x80, 0x80, 0x80]), 0);
    }

    #[test]
    fn poll_outside_test_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.log");
        std::fs::write(&path, b"hi\n").unwrap();

        let mut tail = LogTail::new(&path);
        assert_eq!(tokio_test::block_on(tail.poll()).unwrap(), 3);
        assert_eq!(tail.line_count(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut tail = LogTail::new(dir.path().join("absent.log"));
        assert_eq!(tail.poll().await.unwrap(), 0);
        assert!(!tail.is_present());
        assert_eq!(tail.text(), "");
    }

    #[tokio::test]
    async fn reads_only_appended_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.log");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"one\ntwo\n").unwrap();

        let mut tail = LogTail::new(&path);
        assert_eq!(tail.poll().await.unwrap(), 8);
        assert!(tail.is_present());
        assert_eq!(tail.line_count(), 2);

        file.write_all(b"three\n").unwrap();
        assert_eq!(tail.poll().await.unwrap(), 6);
        assert_eq!(tail.text(), "one\ntwo\nthree\n");
        assert_eq!(tail.line_count(), 3);

        assert_eq!(tail.poll().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn split_character_is_held_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.log");
        let mut file = std::fs::File::create(&path).unwrap();
        let check = "ok ✓\n".as_bytes();

        file.write_all(&check[..4]).unwrap();
        let mut tail = LogTail::new(&path);
        tail.poll().await.unwrap();
        assert_eq!(tail.text(), "ok ");

        file.write_all(&check[4..]).unwrap();
        tail.poll().await.unwrap();
        assert_eq!(tail.text(), "ok ✓\n");
    }

    #[tokio::test]
    async fn invalid_bytes_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.log");
        std::fs::write(&path, b"bad \xff byte\n").unwrap();

        let mut tail = LogTail::new(&path);
        tail.poll().await.unwrap();
        assert_eq!(tail.text(), "bad \u{FFFD} byte\n");
    }

    #[tokio::test]
    async fn truncation_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.log");
        std::fs::write(&path, b"a long first run of text\n").unwrap();

        let mut tail = LogTail::new(&path);
        tail.poll().await.unwrap();

        std::fs::write(&path, b"fresh\n").unwrap();
        tail.poll().await.unwrap();
        assert_eq!(tail.text(), "fresh\n");
        assert_eq!(tail.line_count(), 1);
    }

    #[tokio::test]
    async fn truncation_bumps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.log");
        std::fs::write(&path, b"a long first run of text\n").unwrap();

        let mut tail = LogTail::new(&path);
        tail.poll().await.unwrap();
        assert_eq!(tail.generation(), 0);

        std::fs::write(&path, b"short\n").unwrap();
        tail.poll().await.unwrap();
        assert_eq!(tail.generation(), 1);

        // Growth alone does not restart.
        std::fs::write(&path, b"short\nmore\n").unwrap();
        tail.poll().await.unwrap();
        assert_eq!(tail.generation(), 1);
        assert_eq!(tail.text(), "short\nmore\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rotation_to_longer_file_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.log");
        std::fs::write(&path, b"old start\n").unwrap();

        let mut tail = LogTail::new(&path);
        tail.poll().await.unwrap();

        let fresh = dir.path().join("node.log.new");
        std::fs::write(&fresh, b"new start\nthat runs past the old length\n").unwrap();
        std::fs::rename(&fresh, &path).unwrap();

        tail.poll().await.unwrap();
        assert_eq!(tail.generation(), 1);
        assert_eq!(tail.text(), "new start\nthat runs past the old length\n");
        assert_eq!(tail.line_count(), 2);
    }

    #[tokio::test]
    async fn age_uses_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.log");
        std::fs::write(&path, b"x\n").unwrap();

        let mut tail = LogTail::new(&path);
        assert!(tail.age(SystemTime::now()).is_none());
        tail.poll().await.unwrap();
        let later = SystemTime::now() + Duration::from_secs(90);
        assert!(tail.age(later).unwrap() >= Duration::from_secs(89));
    }
}
