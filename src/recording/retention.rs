//! Bounded file retention for output directories

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

/// Keep the `keep` most recently modified files in `dir`, removing the rest.
///
/// Best effort: failures are logged and never returned. Returns the number
/// of files removed.
pub fn prune(dir: &Path, keep: usize) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(?dir, %e, "retention scan failed");
            return 0;
        }
    };

    let mut files: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, entry.path()))
        })
        .collect();

    if files.len() <= keep {
        return 0;
    }

    // Newest first; names break ties so timestamped names order correctly
    files.sort_by(|a, b| b.cmp(a));

    let mut removed = 0;
    for (_, path) in files.into_iter().skip(keep) {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(?path, "retention removed file");
                removed += 1;
            }
            Err(e) => warn!(?path, %e, "retention delete failed"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn test_keeps_most_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        let oldest = touch(dir.path(), "a.wav", 300);
        let old = touch(dir.path(), "b.wav", 200);
        let new = touch(dir.path(), "c.wav", 100);
        let newest = touch(dir.path(), "d.wav", 0);

        assert_eq!(prune(dir.path(), 2), 2);
        assert!(!oldest.exists());
        assert!(!old.exists());
        assert!(new.exists());
        assert!(newest.exists());
    }

    #[test]
    fn test_under_limit_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.wav", 10);
        assert_eq!(prune(dir.path(), 5), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_subdirectories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("responses")).unwrap();
        touch(dir.path(), "a.wav", 10);
        touch(dir.path(), "b.wav", 0);

        assert_eq!(prune(dir.path(), 1), 1);
        assert!(dir.path().join("responses").is_dir());
        assert!(dir.path().join("b.wav").exists());
    }

    #[test]
    fn test_missing_directory_is_not_fatal() {
        assert_eq!(prune(Path::new("/nonexistent/safetyscribe"), 1), 0);
    }
}
