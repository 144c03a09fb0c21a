//! Per-category dated log files, the Rust shape of the original daemon's
//! `log.c`: one append-only file per category, reopened on `SIGHUP` so an
//! external `logrotate`-style rename doesn't leave us writing to an
//! unlinked inode. §4.12 of the expanded specification.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Mirrors `log_destination` in the original `wrnd/log.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Error,
    Common,
    Wdt,
    Rng,
    Nrf,
}

impl LogCategory {
    fn file_name(self) -> &'static str {
        match self {
            LogCategory::Error => "error.log",
            LogCategory::Common => "wrnd.log",
            LogCategory::Wdt => "device_wdt.log",
            LogCategory::Rng => "device_rng.log",
            LogCategory::Nrf => "device_nrf.log",
        }
    }
}

struct CategoryFile {
    path: PathBuf,
    file: File,
    ino: u64,
}

impl CategoryFile {
    fn open(dir: &Path, category: LogCategory) -> io::Result<Self> {
        let path = dir.join(category.file_name());
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let ino = file.metadata()?.ino();
        Ok(Self { path, file, ino })
    }

    /// Reopens the file if its inode no longer matches what's on disk —
    /// i.e. something else renamed or unlinked it since we opened it.
    fn reopen_if_rotated(&mut self) -> io::Result<()> {
        let rotated = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.ino() != self.ino,
            Err(_) => true,
        };
        if rotated {
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            self.ino = file.metadata()?.ino();
            self.file = file;
        }
        Ok(())
    }

    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self.file, "{}", line);
        let _ = self.file.flush();
    }
}

/// Owns all five category files. One instance lives for the life of the
/// daemon; `reopen()` is called from the `SIGHUP` handler path.
pub struct LogSink {
    error: Mutex<CategoryFile>,
    common: Mutex<CategoryFile>,
    wdt: Mutex<CategoryFile>,
    rng: Mutex<CategoryFile>,
    nrf: Mutex<CategoryFile>,
}

impl LogSink {
    pub fn open(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            error: Mutex::new(CategoryFile::open(dir, LogCategory::Error)?),
            common: Mutex::new(CategoryFile::open(dir, LogCategory::Common)?),
            wdt: Mutex::new(CategoryFile::open(dir, LogCategory::Wdt)?),
            rng: Mutex::new(CategoryFile::open(dir, LogCategory::Rng)?),
            nrf: Mutex::new(CategoryFile::open(dir, LogCategory::Nrf)?),
        })
    }

    fn file_for(&self, category: LogCategory) -> &Mutex<CategoryFile> {
        match category {
            LogCategory::Error => &self.error,
            LogCategory::Common => &self.common,
            LogCategory::Wdt => &self.wdt,
            LogCategory::Rng => &self.rng,
            LogCategory::Nrf => &self.nrf,
        }
    }

    /// Appends one dated line, `"%Y-%m-%d %H:%M:%S  <message>"`, matching
    /// `wrndlog`'s format exactly.
    pub fn log(&self, category: LogCategory, message: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("{}  {}", stamp, message);
        let mut file = self.file_for(category).lock().expect("log file mutex poisoned");
        file.write_line(&line);
    }

    /// `SIGHUP` handler: reopen any file that was rotated out from under us.
    pub fn reopen(&self) -> io::Result<()> {
        for category in [
            LogCategory::Error,
            LogCategory::Common,
            LogCategory::Wdt,
            LogCategory::Rng,
            LogCategory::Nrf,
        ] {
            self.file_for(category)
                .lock()
                .expect("log file mutex poisoned")
                .reopen_if_rotated()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_appends_a_dated_line_to_the_right_category() {
        let dir = tempdir();
        let sink = LogSink::open(&dir).unwrap();
        sink.log(LogCategory::Rng, "RNG [1] Threshold: 130");
        let contents = std::fs::read_to_string(dir.join("device_rng.log")).unwrap();
        assert!(contents.contains("RNG [1] Threshold: 130"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reopen_survives_missing_file() {
        let dir = tempdir();
        let sink = LogSink::open(&dir).unwrap();
        std::fs::remove_file(dir.join("error.log")).unwrap();
        sink.reopen().unwrap();
        sink.log(LogCategory::Error, "reopened after rotation");
        assert!(dir.join("error.log").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("wrnd-log-sink-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
