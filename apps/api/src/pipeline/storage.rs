//! Per-run scratch directory for captured profile pages.
//!
//! Pages are written right after capture and removed as soon as they have
//! been read back for extraction. The whole directory is purged at the end of
//! the run whether it succeeded or not.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tracing::debug;

use crate::models::candidate::{CandidateRef, ResumePage};

#[derive(Debug)]
pub struct StoredResume {
    pub candidate: CandidateRef,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct ResumeStore {
    dir: TempDir,
    saved: AtomicUsize,
}

/// The sequence number keeps names unique when two keys sanitize alike.
fn file_name_for(seq: usize, account_key: &str) -> String {
    let safe: String = account_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("cv_{seq:04}_{safe}.html")
}

impl ResumeStore {
    /// Creates a fresh directory under `root`, or under the system temp dir if `None`.
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix("sourcing-run-").tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix("sourcing-run-").tempdir()?,
        };
        debug!(path = %dir.path().display(), "Resume store created");
        Ok(Self {
            dir,
            saved: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn save(&self, page: &ResumePage) -> io::Result<StoredResume> {
        let seq = self.saved.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.path().join(file_name_for(seq, &page.candidate.account_key));
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(page.html.as_bytes())?;
        Ok(StoredResume {
            candidate: page.candidate.clone(),
            path,
        })
    }

    /// Reads a stored page back and deletes its file.
    pub fn take(&self, stored: StoredResume) -> io::Result<ResumePage> {
        let html = fs::read_to_string(&stored.path);
        let removed = fs::remove_file(&stored.path);
        let html = html?;
        removed?;
        Ok(ResumePage {
            candidate: stored.candidate,
            html,
        })
    }

    pub fn file_count(&self) -> io::Result<usize> {
        Ok(fs::read_dir(self.dir.path())?.count())
    }

    /// Deletes the directory and everything left in it.
    pub fn purge(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(path = %path.display(), "Resume store purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(key: &str) -> ResumePage {
        ResumePage {
            candidate: CandidateRef::from_account_key("https://x/resume", key),
            html: format!("<html>{key}</html>"),
        }
    }

    #[test]
    fn test_take_reads_and_removes_file() {
        let root = tempfile::tempdir().unwrap();
        let store = ResumeStore::create(Some(root.path())).unwrap();

        let stored = store.save(&page("abc")).unwrap();
        assert!(stored.path.ends_with("cv_0000_abc.html"));
        assert_eq!(store.file_count().unwrap(), 1);

        let back = store.take(stored).unwrap();
        assert_eq!(back.html, "<html>abc</html>");
        assert_eq!(store.file_count().unwrap(), 0);
    }

    #[test]
    fn test_unsafe_key_is_sanitized() {
        assert_eq!(file_name_for(3, "../etc/passwd"), "cv_0003____etc_passwd.html");
    }

    #[test]
    fn test_keys_that_sanitize_alike_keep_their_own_pages() {
        let root = tempfile::tempdir().unwrap();
        let store = ResumeStore::create(Some(root.path())).unwrap();

        let dotted = store.save(&page("a.b")).unwrap();
        let underscored = store.save(&page("a_b")).unwrap();
        assert_ne!(dotted.path, underscored.path);
        assert_eq!(store.file_count().unwrap(), 2);

        let first = store.take(dotted).unwrap();
        assert_eq!(first.candidate.account_key, "a.b");
        assert_eq!(first.html, "<html>a.b</html>");
        let second = store.take(underscored).unwrap();
        assert_eq!(second.candidate.account_key, "a_b");
        assert_eq!(second.html, "<html>a_b</html>");
    }

    #[test]
    fn test_purge_removes_leftovers() {
        let root = tempfile::tempdir().unwrap();
        let store = ResumeStore::create(Some(root.path())).unwrap();
        store.save(&page("a")).unwrap();
        store.save(&page("b")).unwrap();
        let dir = store.path().to_path_buf();

        store.purge().unwrap();

        assert!(!dir.exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
