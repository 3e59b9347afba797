//! Runtime settings.
//!
//! The store location resolves flag → `LAGTRACE_DB` env → default; the
//! env fallback is the surviving form of the original deployment's
//! environment-variable bootstrap.

use std::path::{Path, PathBuf};

/// Resolved settings for a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub logs_dir: PathBuf,
    pub out_dir: PathBuf,
    pub table: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./lagtrace.db"),
            logs_dir: PathBuf::from("./logs"),
            out_dir: PathBuf::from("./result"),
            table: crate::store::db::DEFAULT_TABLE.to_string(),
        }
    }
}

impl Settings {
    /// Override fields supplied on the command line.
    pub fn with_overrides(
        mut self,
        db: Option<&Path>,
        logs: Option<&Path>,
        out: Option<&Path>,
        table: Option<&str>,
    ) -> Self {
        if let Some(p) = db {
            self.db_path = p.to_path_buf();
        }
        if let Some(p) = logs {
            self.logs_dir = p.to_path_buf();
        }
        if let Some(p) = out {
            self.out_dir = p.to_path_buf();
        }
        if let Some(t) = table {
            self.table = t.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.db_path, PathBuf::from("./lagtrace.db"));
        assert_eq!(s.table, "trace_specs");
    }

    #[test]
    fn test_overrides_win() {
        let s = Settings::default().with_overrides(
            Some(Path::new("/tmp/x.db")),
            None,
            None,
            Some("other_table"),
        );
        assert_eq!(s.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(s.logs_dir, PathBuf::from("./logs"));
        assert_eq!(s.table, "other_table");
    }
}
