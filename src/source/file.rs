//! File-based history source.
//!
//! Serves a historical set stored as a JSON object keyed by timestamp.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use super::payload::decode_history;
use super::HistorySource;
use crate::data::HistoricalSet;

/// A history source backed by a JSON file.
///
/// The file is re-read only when its modification time changes; otherwise
/// the cached set is returned.
#[derive(Debug)]
pub struct FileSource {
    path: Option<PathBuf>,
    description: String,
    last_error: Option<String>,
    last_modified: Option<SystemTime>,
    cached: Option<HistoricalSet>,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path: Some(path),
            description,
            last_error: None,
            last_modified: None,
            cached: None,
        }
    }

    /// A source with no backing file. Always yields an empty set.
    pub fn empty() -> Self {
        Self {
            path: None,
            description: "file: <none>".to_string(),
            last_error: None,
            last_modified: None,
            cached: Some(HistoricalSet::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The error from the last fetch, if any.
    pub fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn modified_time(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).ok()?.modified().ok()
    }

    fn read_file(&mut self, path: &Path) -> Option<HistoricalSet> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                self.last_error = Some(format!("Read error: {}", e));
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => {
                self.last_error = None;
                Some(decode_history(value))
            }
            Err(e) => {
                self.last_error = Some(format!("Parse error: {}", e));
                None
            }
        }
    }
}

impl HistorySource for FileSource {
    fn fetch(&mut self) -> Option<HistoricalSet> {
        let Some(path) = self.path.clone() else {
            return self.cached.clone();
        };

        let current_modified = Self::modified_time(&path);
        let changed = match (self.last_modified, current_modified) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(last), Some(current)) => current != last,
        };

        if changed || self.cached.is_none() {
            match self.read_file(&path) {
                Some(set) => {
                    debug!("Loaded {} historical entries from {}", set.len(), path.display());
                    self.last_modified = current_modified;
                    self.cached = Some(set);
                }
                None => {
                    if let Some(err) = &self.last_error {
                        warn!("History unavailable from {}: {}", path.display(), err);
                    }
                    // A failed re-read keeps serving the last good set
                    return self.cached.clone();
                }
            }
        }

        self.cached.clone()
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_json() -> &'static str {
        r#"{
            "2024-03-01T10:00:00Z": { "temperature": 24.0, "humidity": 65.0, "airPurity": 80.0 },
            "2024-03-01 11:00:00": { "temperature": 25.0, "humidity": 66.0, "airpurity": 81.0 },
            "broken": { "temperature": "hot" }
        }"#
    }

    #[test]
    fn test_file_source_new() {
        let source = FileSource::new("/tmp/history.json");
        assert_eq!(source.path(), Some(Path::new("/tmp/history.json")));
        assert_eq!(source.description(), "file: /tmp/history.json");
        assert!(source.error().is_none());
    }

    #[test]
    fn test_file_source_fetch_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", sample_json()).unwrap();

        let mut source = FileSource::new(file.path());
        let set = source.fetch().unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains_key("2024-03-01 11:00:00"));

        // Unchanged file serves the cache
        assert_eq!(source.fetch().unwrap(), set);
    }

    #[test]
    fn test_file_source_missing_file() {
        let mut source = FileSource::new("/nonexistent/path/history.json");
        assert!(source.fetch().is_none());
        assert!(source.error().unwrap().contains("Read error"));
    }

    #[test]
    fn test_file_source_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let mut source = FileSource::new(file.path());
        assert!(source.fetch().is_none());
        assert!(source.error().unwrap().contains("Parse error"));
    }

    #[test]
    fn test_empty_file_source() {
        let mut source = FileSource::empty();
        assert!(source.path().is_none());
        assert_eq!(source.fetch(), Some(HistoricalSet::new()));
    }
}
