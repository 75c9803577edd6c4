//! Alert suppression state machines.
//!
//! A tracker decides, reading by reading, whether something changed enough to
//! be reported. Two variants exist and are never combined:
//!
//! - [`SubjectHysteresis`]: one NORMAL/ALERTING state per originating subject,
//!   i.e. per physical sensor instance, held in memory. This is the default.
//! - [`GlobalHysteresis`]: one flag for the whole installation, optionally
//!   persisted to a small JSON file so it survives restarts. Any in-bounds
//!   reading clears it, whichever sensor raised it.

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::schema::{Bounds, SensorReading};

#[derive(Debug, Error)]
pub enum HysteresisError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No event.
    Unchanged,
    /// NORMAL -> ALERTING.
    Alert,
    /// ALERTING -> NORMAL.
    Recover,
}

pub trait HysteresisTracker: Send + Sync {
    /// Feeds one validated reading with its current bounds.
    fn observe(&mut self, subject: &str, reading: &SensorReading, bounds: &Bounds) -> Transition;

    /// Called once per cycle after the batch has been evaluated.
    fn persist(&mut self) -> Result<(), HysteresisError> {
        Ok(())
    }

    /// Number of identities currently alerting.
    fn alerting_count(&self) -> usize;
}

/// Per-subject state: the set of subjects currently ALERTING.
#[derive(Debug, Default)]
pub struct SubjectHysteresis {
    alerting: HashSet<String>,
}

impl SubjectHysteresis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alerting(&self, subject: &str) -> bool {
        self.alerting.contains(subject)
    }
}

impl HysteresisTracker for SubjectHysteresis {
    fn observe(&mut self, subject: &str, reading: &SensorReading, bounds: &Bounds) -> Transition {
        if bounds.contains(reading.value) {
            return if self.alerting.remove(subject) {
                Transition::Recover
            } else {
                Transition::Unchanged
            };
        }

        if self.alerting.insert(subject.to_string()) {
            Transition::Alert
        } else {
            Transition::Unchanged
        }
    }

    fn alerting_count(&self) -> usize {
        self.alerting.len()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GlobalState {
    alerting: bool,
}

/// One alerting flag across all sensors.
#[derive(Debug, Default)]
pub struct GlobalHysteresis {
    alerting: bool,
    dirty: bool,
    state_file: Option<PathBuf>,
}

impl GlobalHysteresis {
    /// In-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the flag from `path`; a missing file means not alerting.
    ///
    /// # Errors
    ///
    /// `Io` if the file exists but cannot be read, `Corrupt` if it does not
    /// hold `{"alerting": bool}`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, HysteresisError> {
        let path = path.into();
        let alerting = match fs::read_to_string(&path) {
            Ok(content) => {
                let state: GlobalState =
                    serde_json::from_str(&content).map_err(|source| HysteresisError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                state.alerting
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(source) => return Err(HysteresisError::Io { path, source }),
        };

        debug!("Restored global alerting flag {} from {}", alerting, path.display());
        Ok(Self {
            alerting,
            dirty: false,
            state_file: Some(path),
        })
    }

    pub fn is_alerting(&self) -> bool {
        self.alerting
    }

    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    fn write_state(path: &Path, alerting: bool) -> Result<(), HysteresisError> {
        let io_err = |source| HysteresisError::Io {
            path: path.to_path_buf(),
            source,
        };
        let body = serde_json::to_vec(&GlobalState { alerting }).map_err(|source| {
            HysteresisError::Corrupt {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)
    }
}

impl HysteresisTracker for GlobalHysteresis {
    fn observe(&mut self, _subject: &str, reading: &SensorReading, bounds: &Bounds) -> Transition {
        let violating = !bounds.contains(reading.value);
        match (self.alerting, violating) {
            (false, true) => {
                self.alerting = true;
                self.dirty = true;
                Transition::Alert
            }
            (true, false) => {
                self.alerting = false;
                self.dirty = true;
                Transition::Recover
            }
            _ => Transition::Unchanged,
        }
    }

    fn persist(&mut self) -> Result<(), HysteresisError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(path) = &self.state_file {
            Self::write_state(path, self.alerting)?;
            debug!("Persisted global alerting flag {} to {}", self.alerting, path.display());
        }
        self.dirty = false;
        Ok(())
    }

    fn alerting_count(&self) -> usize {
        usize::from(self.alerting)
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    fn reading(name: &str, value: f64) -> SensorReading {
        SensorReading {
            name: name.into(),
            device_id: "dev".into(),
            location: "room".into(),
            value,
            timestamp: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn bounds(sensor: &str) -> Bounds {
        Bounds::new(sensor, 10.0, 20.0).unwrap()
    }

    #[test]
    fn test_subject_alert_then_recover() {
        let mut tracker = SubjectHysteresis::new();
        let b = bounds("temp");

        assert_eq!(tracker.observe("s.temp", &reading("temp", 25.0), &b), Transition::Alert);
        assert_eq!(tracker.observe("s.temp", &reading("temp", 30.0), &b), Transition::Unchanged);
        assert_eq!(tracker.alerting_count(), 1);
        assert_eq!(tracker.observe("s.temp", &reading("temp", 15.0), &b), Transition::Recover);
        assert_eq!(tracker.observe("s.temp", &reading("temp", 16.0), &b), Transition::Unchanged);
        assert_eq!(tracker.alerting_count(), 0);
    }

    #[test]
    fn test_subjects_are_independent() {
        let mut tracker = SubjectHysteresis::new();
        let b = bounds("temp");

        assert_eq!(tracker.observe("s.temp.a", &reading("temp", 25.0), &b), Transition::Alert);
        assert_eq!(tracker.observe("s.temp.b", &reading("temp", 26.0), &b), Transition::Alert);
        assert_eq!(tracker.observe("s.temp.a", &reading("temp", 15.0), &b), Transition::Recover);
        assert!(tracker.is_alerting("s.temp.b"));
        assert!(!tracker.is_alerting("s.temp.a"));
    }

    #[test]
    fn test_subject_recovers_against_widened_bounds() {
        let mut tracker = SubjectHysteresis::new();
        tracker.observe("s.co2", &reading("co2", 25.0), &bounds("co2"));
        let wider = Bounds::new("co2", 0.0, 30.0).unwrap();
        assert_eq!(tracker.observe("s.co2", &reading("co2", 25.0), &wider), Transition::Recover);
        assert!(!tracker.is_alerting("s.co2"));
    }

    #[test]
    fn test_boundaries_never_alert() {
        let mut tracker = SubjectHysteresis::new();
        let b = bounds("temp");
        assert_eq!(tracker.observe("s", &reading("temp", 10.0), &b), Transition::Unchanged);
        assert_eq!(tracker.observe("s", &reading("temp", 20.0), &b), Transition::Unchanged);
        assert_eq!(tracker.alerting_count(), 0);
    }

    #[test]
    fn test_global_flag_spans_sensors() {
        let mut tracker = GlobalHysteresis::new();
        assert_eq!(tracker.observe("a", &reading("co2", 25.0), &bounds("co2")), Transition::Alert);
        assert_eq!(tracker.observe("b", &reading("temp", 30.0), &bounds("temp")), Transition::Unchanged);
        assert_eq!(tracker.observe("b", &reading("temp", 15.0), &bounds("temp")), Transition::Recover);
        assert!(!tracker.is_alerting());
    }

    #[test]
    fn test_global_persists_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerting.json");

        let mut tracker = GlobalHysteresis::load(&path).unwrap();
        assert!(!tracker.is_alerting());
        tracker.observe("a", &reading("co2", 25.0), &bounds("co2"));
        tracker.persist().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, r#"{"alerting":true}"#);

        let restored = GlobalHysteresis::load(&path).unwrap();
        assert!(restored.is_alerting());
        assert_eq!(restored.alerting_count(), 1);
    }

    #[test]
    fn test_global_persist_skips_unchanged_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerting.json");

        let mut tracker = GlobalHysteresis::load(&path).unwrap();
        tracker.observe("a", &reading("co2", 15.0), &bounds("co2"));
        tracker.persist().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_global_load_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerting.json");
        fs::write(&path, "alerting").unwrap();

        assert!(matches!(
            GlobalHysteresis::load(&path),
            Err(HysteresisError::Corrupt { .. })
        ));
    }
}
