//! Copy of the console output, appended to a file with a timestamp per entry.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Local;
use tracing::warn;

pub struct ConsoleLog {
    path: PathBuf,
    /// `None` once a write has failed.
    file: Option<File>,
}

impl ConsoleLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append `text` as one entry. The first failed write disables the log
    /// and reports why on stderr.
    pub fn record(&mut self, text: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let mut entry = format!("{}{text}", Local::now().format("[%Y-%m-%d %H:%M:%S] "));
        if !entry.ends_with('\n') {
            entry.push('\n');
        }
        if let Err(e) = file.write_all(entry.as_bytes()).and_then(|_| file.flush()) {
            warn!(path = %self.path.display(), error = %e, "console log disabled");
            eprintln!("\n!!! LOG FILE ERROR: Disabled logging due to: {e} !!!");
            self.file = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_stamped(line: &str) -> bool {
        let b = line.as_bytes();
        line.len() > 22 && b[0] == b'[' && b[5] == b'-' && b[11] == b' ' && &line[20..22] == "] "
    }

    #[test]
    fn appends_timestamped_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.txt");
        std::fs::write(&path, "earlier\n").unwrap();

        let mut log = ConsoleLog::open(&path).unwrap();
        log.record("first line");
        log.record("second line\n");
        drop(log);

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "earlier");
        assert!(is_stamped(lines[1]), "{:?}", lines[1]);
        assert!(lines[1].ends_with("] first line"));
        assert!(lines[2].ends_with("] second line"));
    }

    #[test]
    fn unopenable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no").join("such").join("log.txt");
        assert!(ConsoleLog::open(&missing).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn write_failure_disables_the_log() {
        // Every write to /dev/full fails with ENOSPC.
        let mut log = ConsoleLog::open(Path::new("/dev/full")).unwrap();
        assert!(log.is_enabled());
        log.record("lost");
        assert!(!log.is_enabled());
        log.record("ignored");
        assert!(!log.is_enabled());
    }
}
