//! Log-file enumeration and line filtering.
//!
//! Any file in the log directory whose name contains `"log"` is an input
//! source; only lines containing `"payload"` carry trace data (the other
//! lines are producer/consumer chatter).

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Filename substring that marks an input source.
const LOG_MARKER: &str = "log";

/// Line substring that marks a trace line.
const PAYLOAD_MARKER: &str = "payload";

/// Discover log files under `dir`, sorted by path for a deterministic
/// processing order.
pub fn discover_log_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map_or(false, |name| name.contains(LOG_MARKER))
        })
        .map(|e| e.into_path())
        .collect();

    files.sort();
    files
}

/// Read a log file, keeping only trace lines (non-empty, containing the
/// payload marker).
pub fn read_trace_lines(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening log file: {}", path.display()))?;
    let reader = BufReader::with_capacity(64 * 1024, file);

    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        let trimmed = line.trim();
        if !trimmed.is_empty() && trimmed.contains(PAYLOAD_MARKER) {
            lines.push(trimmed.to_string());
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_discover_filters_on_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("consumer.log.0")).unwrap();
        std::fs::File::create(dir.path().join("producer.log.1")).unwrap();
        std::fs::File::create(dir.path().join("notes.txt")).unwrap();

        let files = discover_log_files(dir.path());
        assert_eq!(files.len(), 2);
        // Sorted by path
        assert!(files[0].ends_with("consumer.log.0"));
        assert!(files[1].ends_with("producer.log.1"));
    }

    #[test]
    fn test_read_trace_lines_filters_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "startup banner").unwrap();
        writeln!(f, "c|t1|t2|th|ns|m|payload-bytes|ph|sh").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "  c2|t1|t2|th|ns|m|payload-bytes|ph|sh  ").unwrap();

        let lines = read_trace_lines(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("c2|"));
    }
}
