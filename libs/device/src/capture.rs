//! Raw capture of received bus bytes.
//!
//! [`RawCapture`] appends every byte to a binary file in transfer order,
//! with no framing. When the file reaches its size limit it is renamed to
//! `<path>.old`, replacing any earlier backup, and a fresh file is started.
//! If that rename fails, writing continues into the current file and the
//! rotation is retried on the next byte.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use ebus_core::tracing::prelude::*;

/// Bytes between explicit flushes, bounding loss on a crash.
pub const FLUSH_INTERVAL: u64 = 1024;

/// Suffix appended to the capture path on rotation.
pub const ROTATED_SUFFIX: &str = ".old";

/// Size-bounded, rotating raw byte recorder.
#[derive(Debug)]
pub struct RawCapture {
    /// Capture target; `None` disables capture regardless of `enabled`.
    path: Option<PathBuf>,
    enabled: bool,
    file: Option<BufWriter<File>>,
    /// Bytes written since the file was (re)opened.
    written: u64,
    /// Rotation threshold in kilobytes.
    max_size_kb: u64,
}

impl RawCapture {
    /// Create a disabled recorder without a target.
    pub fn new(max_size_kb: u64) -> Self {
        Self {
            path: None,
            enabled: false,
            file: None,
            written: 0,
            max_size_kb,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a capture file is currently open for writing.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bytes written since the last open or rotation.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn max_size_kb(&self) -> u64 {
        self.max_size_kb
    }

    /// Enable or disable capture. Enabling (re)opens the target in append
    /// mode and restarts the byte count.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;

        if enabled && self.path.is_some() {
            self.open_file();
        } else {
            self.close_file();
        }
    }

    /// Change the capture target, reopening if capture is enabled.
    pub fn set_path(&mut self, path: Option<PathBuf>) {
        if path == self.path {
            return;
        }

        self.close_file();
        self.path = path;

        if self.enabled && self.path.is_some() {
            self.open_file();
        }
    }

    /// Change the rotation threshold; checked on the next append.
    pub fn set_max_size_kb(&mut self, max_size_kb: u64) {
        self.max_size_kb = max_size_kb;
    }

    /// Record one byte. Does nothing unless enabled with an open file.
    pub fn append(&mut self, byte: u8) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        file.write_all(&[byte])?;
        self.written += 1;
        if self.written % FLUSH_INTERVAL == 0 {
            file.flush()?;
        }

        if self.written >= self.max_size_kb.saturating_mul(1024) {
            self.rotate();
        }
        Ok(())
    }

    /// Flush buffered bytes to the file.
    pub fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    fn rotate(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };
        let rotated = rotated_path(&path);

        match fs::rename(&path, &rotated) {
            Ok(()) => {
                debug!(path = %path.display(), bytes = self.written, "Rotated raw capture");
                self.close_file();
                self.open_file();
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Raw capture rotation deferred");
            }
        }
    }

    fn open_file(&mut self) {
        self.close_file();
        self.written = 0;

        let Some(path) = &self.path else {
            return;
        };
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => self.file = Some(BufWriter::new(file)),
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot open raw capture file"),
        }
    }

    fn close_file(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                warn!(error = %e, "Lost buffered raw capture bytes");
            }
        }
    }
}

impl Drop for RawCapture {
    fn drop(&mut self) {
        self.close_file();
    }
}

/// `<path>.old`, appended to the full file name.
pub fn rotated_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(ROTATED_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn enabled_capture(dir: &TempDir, max_size_kb: u64) -> (RawCapture, PathBuf) {
        let path = dir.path().join("ebus_dump.bin");
        let mut capture = RawCapture::new(max_size_kb);
        capture.set_path(Some(path.clone()));
        capture.set_enabled(true);
        (capture, path)
    }

    #[test]
    fn disabled_capture_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ebus_dump.bin");
        let mut capture = RawCapture::new(100);
        capture.set_path(Some(path.clone()));

        capture.append(0xaa).unwrap();
        assert!(!capture.is_open());
        assert_eq!(capture.written(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn enabled_without_path_stays_closed() {
        let mut capture = RawCapture::new(100);
        capture.set_enabled(true);

        assert!(capture.is_enabled());
        assert!(!capture.is_open());
        capture.append(0xaa).unwrap();
        assert_eq!(capture.written(), 0);
    }

    #[test]
    fn bytes_are_appended_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (mut capture, path) = enabled_capture(&dir, 100);

        for byte in [0xaa, 0x10, 0x08, 0xb5] {
            capture.append(byte).unwrap();
        }
        capture.flush().unwrap();

        assert_eq!(capture.written(), 4);
        assert_eq!(fs::read(&path).unwrap(), vec![0xaa, 0x10, 0x08, 0xb5]);
    }

    #[test]
    fn full_kilobyte_is_flushed_without_explicit_flush() {
        let dir = tempfile::tempdir().unwrap();
        let (mut capture, path) = enabled_capture(&dir, 100);

        for i in 0..FLUSH_INTERVAL {
            capture.append(i as u8).unwrap();
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), FLUSH_INTERVAL);
    }

    #[test]
    fn reaching_threshold_rotates_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut capture, path) = enabled_capture(&dir, 1);
        let rotated = rotated_path(&path);

        for i in 0..1023u32 {
            capture.append(i as u8).unwrap();
        }
        assert!(!rotated.exists());

        capture.append(0xff).unwrap();
        assert!(rotated.exists());
        assert_eq!(fs::metadata(&rotated).unwrap().len(), 1024);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(capture.written(), 0);

        capture.append(0x01).unwrap();
        capture.append(0x02).unwrap();
        capture.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x01, 0x02]);
        assert_eq!(fs::metadata(&rotated).unwrap().len(), 1024);
    }

    #[test]
    fn rotation_replaces_previous_backup() {
        let dir = tempfile::tempdir().unwrap();
        let (mut capture, path) = enabled_capture(&dir, 1);
        let rotated = rotated_path(&path);
        fs::write(&rotated, b"stale").unwrap();

        for _ in 0..1024 {
            capture.append(0x55).unwrap();
        }

        let backup = fs::read(&rotated).unwrap();
        assert_eq!(backup.len(), 1024);
        assert!(backup.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn failed_rename_keeps_writing_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut capture, path) = enabled_capture(&dir, 1);
        let rotated = rotated_path(&path);

        // A non-empty directory in the way makes the rename fail
        fs::create_dir(&rotated).unwrap();
        fs::write(rotated.join("keep"), b"x").unwrap();

        for _ in 0..1030 {
            capture.append(0x33).unwrap();
        }
        capture.flush().unwrap();
        assert_eq!(capture.written(), 1030);
        assert_eq!(fs::metadata(&path).unwrap().len(), 1030);

        // Once the obstacle is gone the next byte rotates
        fs::remove_dir_all(&rotated).unwrap();
        capture.append(0x34).unwrap();
        assert_eq!(capture.written(), 0);
        assert_eq!(fs::metadata(&rotated).unwrap().len(), 1031);
    }

    #[test]
    fn reenabling_appends_and_resets_count() {
        let dir = tempfile::tempdir().unwrap();
        let (mut capture, path) = enabled_capture(&dir, 100);

        capture.append(0x01).unwrap();
        capture.append(0x02).unwrap();
        capture.set_enabled(false);
        assert!(!capture.is_open());

        capture.set_enabled(true);
        assert!(capture.is_open());
        assert_eq!(capture.written(), 0);

        capture.append(0x03).unwrap();
        capture.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x01, 0x02, 0x03]);
        assert_eq!(capture.written(), 1);
    }

    #[test]
    fn same_path_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (mut capture, path) = enabled_capture(&dir, 100);

        capture.append(0x01).unwrap();
        capture.set_path(Some(path.clone()));
        assert_eq!(capture.written(), 1);
    }

    #[test]
    fn switching_path_moves_capture() {
        let dir = tempfile::tempdir().unwrap();
        let (mut capture, first) = enabled_capture(&dir, 100);
        let second = dir.path().join("second.bin");

        capture.append(0x01).unwrap();
        capture.set_path(Some(second.clone()));
        assert_eq!(capture.written(), 0);
        capture.append(0x02).unwrap();
        capture.set_path(None);
        assert!(!capture.is_open());

        assert_eq!(fs::read(&first).unwrap(), vec![0x01]);
        assert_eq!(fs::read(&second).unwrap(), vec![0x02]);
    }

    #[test]
    fn rotated_path_keeps_extension() {
        assert_eq!(
            rotated_path(Path::new("/tmp/ebus_dump.bin")),
            PathBuf::from("/tmp/ebus_dump.bin.old")
        );
    }
}
