//! Mapping from namespaces to files under the data root.
//!
//! ```text
//! <root>/
//!   <namespace>/
//!     stream.jsonl   append log, one event per line
//!     bulk.json      bulk document
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::namespace::Namespace;
use crate::types::{BULK_FILE_NAME, STREAM_FILE_NAME};

/// Suffix of the scratch file used by [`replace_file`].
const TEMP_SUFFIX: &str = ".tmp";

/// Resolves namespace file paths under a data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Layout {
        Layout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all files of `ns`.
    pub fn namespace_dir(&self, ns: &Namespace) -> PathBuf {
        self.root.join(ns.as_str())
    }

    /// Path of the append log of `ns`.
    pub fn stream_path(&self, ns: &Namespace) -> PathBuf {
        self.namespace_dir(ns).join(STREAM_FILE_NAME)
    }

    /// Path of the bulk document of `ns`.
    pub fn bulk_path(&self, ns: &Namespace) -> PathBuf {
        self.namespace_dir(ns).join(BULK_FILE_NAME)
    }
}

/// Replace the contents of `path` with `data`.
///
/// The bytes are written to a sibling scratch file which is then renamed over
/// `path`, so a concurrent reader sees either the old or the new contents.
pub(crate) fn replace_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(TEMP_SUFFIX);
    let temp = PathBuf::from(temp);

    let mut file = fs::File::create(&temp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_nested_under_namespace_dir() {
        let layout = Layout::new("/data");
        let ns = Namespace::new("bob");
        assert_eq!(layout.root(), Path::new("/data"));
        assert_eq!(layout.namespace_dir(&ns), PathBuf::from("/data/bob"));
        assert_eq!(layout.stream_path(&ns), PathBuf::from("/data/bob/stream.jsonl"));
        assert_eq!(layout.bulk_path(&ns), PathBuf::from("/data/bob/bulk.json"));
    }

    #[test]
    fn hostile_identifiers_stay_inside_root() {
        let layout = Layout::new("/data");
        let ns = Namespace::new("../../etc");
        assert_eq!(layout.namespace_dir(&ns), PathBuf::from("/data/etc"));
    }

    #[test]
    fn replace_file_overwrites_and_leaves_no_scratch_file() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("doc.json");
        fs::write(&path, b"old contents that are longer").expect("seed");

        replace_file(&path, b"new").expect("replace should succeed");

        assert_eq!(fs::read(&path).expect("read back"), b"new");
        assert!(!dir.path().join("doc.json.tmp").exists());
    }

    #[test]
    fn replace_file_creates_missing_target() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("fresh.json");
        replace_file(&path, b"{}").expect("replace should succeed");
        assert_eq!(fs::read(&path).expect("read back"), b"{}");
    }

    #[test]
    fn replace_file_fails_when_parent_is_missing() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("missing").join("doc.json");
        assert!(replace_file(&path, b"{}").is_err());
    }
}
