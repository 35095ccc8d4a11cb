use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

/// How a failed frame pull feeds into the escalation policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FrameFailurePolicy {
    /// Treat the iteration as having no violations.
    #[default]
    Ignore,
    /// Treat the iteration as a "no-face" frame.
    TreatAsNoFace,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProctorSettings {
    pub exam_duration_secs: u64,
    pub poll_interval_ms: u64,
    pub frame_timeout_ms: u64,
    pub max_frame_failures: u32,
    pub frame_failure_policy: FrameFailurePolicy,
    pub heartbeat_every_ticks: u32,
    pub audit_log_path: PathBuf,
    pub database_path: PathBuf,
    /// Directory of images replayed as camera frames; blank frames when unset.
    pub frame_dir: Option<PathBuf>,
    /// Detector script, one frame's labels per line; clean frames when unset.
    pub detector_script: Option<PathBuf>,
}

impl Default for ProctorSettings {
    fn default() -> Self {
        Self {
            exam_duration_secs: 30 * 60,
            poll_interval_ms: 30,
            frame_timeout_ms: 2_000,
            max_frame_failures: 10,
            frame_failure_policy: FrameFailurePolicy::Ignore,
            heartbeat_every_ticks: 100,
            audit_log_path: PathBuf::from("violations_log.csv"),
            database_path: PathBuf::from("proctor.sqlite3"),
            frame_dir: None,
            detector_script: None,
        }
    }
}

impl ProctorSettings {
    pub fn exam_duration(&self) -> Duration {
        Duration::from_secs(self.exam_duration_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms.max(1))
    }

    /// Resolves a configured path against the data directory unless it is absolute.
    pub fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ProctorSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`, falling back to defaults when the file is
    /// missing or unreadable as JSON.
    pub fn load(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring malformed settings file {}: {err}; using defaults",
                    path.display()
                );
                ProctorSettings::default()
            })
        } else {
            ProctorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> ProctorSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: ProctorSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &ProctorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.json")).unwrap();
        let settings = store.get();

        assert_eq!(settings, ProctorSettings::default());
        assert_eq!(settings.exam_duration(), Duration::from_secs(1800));
        assert_eq!(settings.poll_interval(), Duration::from_millis(30));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "examDurationSecs": 600, "frameFailurePolicy": "treatAsNoFace" }"#,
        )
        .unwrap();

        let settings = SettingsStore::load(path).unwrap().get();
        assert_eq!(settings.exam_duration_secs, 600);
        assert_eq!(settings.frame_failure_policy, FrameFailurePolicy::TreatAsNoFace);
        assert_eq!(settings.max_frame_failures, 10);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(SettingsStore::load(path).unwrap().get(), ProctorSettings::default());
    }

    #[test]
    fn update_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("settings.json");
        let store = SettingsStore::load(path.clone()).unwrap();

        let settings = ProctorSettings {
            poll_interval_ms: 50,
            ..ProctorSettings::default()
        };
        store.update(settings.clone()).unwrap();

        assert_eq!(store.path(), path.as_path());
        assert_eq!(SettingsStore::load(path).unwrap().get(), settings);
    }

    #[test]
    fn relative_paths_resolve_against_data_dir() {
        let data_dir = Path::new("/var/lib/proctor");
        assert_eq!(
            ProctorSettings::resolve(data_dir, Path::new("log.csv")),
            PathBuf::from("/var/lib/proctor/log.csv")
        );
        assert_eq!(
            ProctorSettings::resolve(data_dir, Path::new("/tmp/log.csv")),
            PathBuf::from("/tmp/log.csv")
        );
    }
}
