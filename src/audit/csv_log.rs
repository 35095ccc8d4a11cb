use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use csv::{Terminator, Writer, WriterBuilder};
use log::info;

use super::{AuditSink, ViolationEvent};
use crate::error::LogError;

pub const AUDIT_HEADER: [&str; 3] = ["Timestamp", "Violation Type", "Session ID"];

/// CSV audit file, truncated and re-headed every time it is opened.
pub struct CsvAuditLog {
    path: PathBuf,
    writer: Mutex<Writer<File>>,
}

impl CsvAuditLog {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create audit log directory {}", parent.display())
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;

        let mut writer = WriterBuilder::new()
            .terminator(Terminator::CRLF)
            .from_writer(file);
        write_row(&mut writer, &AUDIT_HEADER)
            .with_context(|| format!("failed to write audit header to {}", path.display()))?;

        info!("Audit log initialized at {}", path.display());

        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

impl AuditSink for CsvAuditLog {
    fn append(&self, event: &ViolationEvent) -> Result<(), LogError> {
        let timestamp = event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut guard = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        write_row(&mut guard, &[&timestamp, &event.label, &event.session_id])?;
        Ok(())
    }
}

/// Writes one record and flushes it, so every appended row is on disk.
fn write_row(writer: &mut Writer<File>, fields: &[&str]) -> io::Result<()> {
    writer.write_record(fields).map_err(io::Error::from)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn create_writes_header_and_truncates_previous_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("violations_log.csv");
        fs::write(&path, "stale,row,from\r\nan,earlier,run\r\n").unwrap();

        let log = CsvAuditLog::create(&path).unwrap();

        assert_eq!(log.path(), path.as_path());
        assert_eq!(read_lines(&path), vec!["Timestamp,Violation Type,Session ID"]);
    }

    #[test]
    fn append_writes_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("log.csv");
        let log = CsvAuditLog::create(&path).unwrap();

        let first = ViolationEvent::new("session-1", "Phone detected");
        let second = ViolationEvent::new("session-1", "looking away");
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",Phone detected,session-1"));
        assert!(lines[2].ends_with(",looking away,session-1"));
        assert!(lines[1].starts_with(&first.timestamp.format("%Y-%m-%dT").to_string()));
    }

    #[test]
    fn labels_with_separators_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let log = CsvAuditLog::create(&path).unwrap();

        log.append(&ViolationEvent::new("s-1", "phone, \"held\"")).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with(",\"phone, \"\"held\"\"\",s-1\r\n"));
    }
}
