//! Host permission handling.
//!
//! Modes are always computed and carried around; the actual `chmod` only
//! happens on hosts that honor Unix permission bits.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

/// Mode requested for directories created during extraction, so they stay
/// writable until their own mode is fixed.
pub const OPEN_DIR_MODE: u32 = 0o777;

/// Mode recorded for files on hosts without Unix permissions.
pub const FALLBACK_FILE_MODE: u32 = 0o644;

/// Whether permission changes are applied on this host.
pub fn honors_unix_permissions() -> bool {
    cfg!(unix)
}

/// Permission bits of a source file, for storing in an archive.
pub fn source_mode(metadata: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o7777
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        FALLBACK_FILE_MODE
    }
}

/// Apply `mode` to `path`. File type bits are masked off; no-op off Unix.
pub fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

/// Create `path` and any missing ancestors with fully open permissions.
pub fn create_open_dir_all(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(OPEN_DIR_MODE);
    }
    builder.create(path)
}

/// Directory modes whose application waits until every member is written.
#[derive(Debug, Default)]
pub struct DeferredDirModes {
    entries: Vec<(String, PathBuf, u32)>,
}

impl DeferredDirModes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the mode of the directory `member`, extracted at `path`.
    pub fn push(&mut self, member: &str, path: PathBuf, mode: u32) {
        self.entries.push((member.to_string(), path, mode));
    }

    /// Order in which the modes are applied: reverse lexicographic by member
    /// path, so children are fixed before their parents.
    fn ordered(&self) -> Vec<&(String, PathBuf, u32)> {
        let mut ordered: Vec<_> = self.entries.iter().collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0));
        ordered
    }

    pub fn apply(self) -> io::Result<()> {
        if !honors_unix_permissions() {
            return Ok(());
        }
        for (member, path, mode) in self.ordered() {
            log::debug!("fixing mode of {member} to {mode:o}");
            apply_mode(path, *mode)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn deferred_modes_are_applied_children_first() {
        let mut deferred = DeferredDirModes::new();
        deferred.push("top/", PathBuf::from("/x/top"), 0o555);
        deferred.push("top/a/b/", PathBuf::from("/x/top/a/b"), 0o700);
        deferred.push("top/a/", PathBuf::from("/x/top/a"), 0o755);

        let order: Vec<&str> = deferred.ordered().iter().map(|e| e.0.as_str()).collect();
        assert_eq!(order, ["top/a/b/", "top/a/", "top/"]);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_parent_is_fixed_after_child() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let parent = temp.path().join("top");
        let child = parent.join("sub");
        create_open_dir_all(&child).unwrap();

        let mut deferred = DeferredDirModes::new();
        deferred.push("top/", parent.clone(), 0o555);
        deferred.push("top/sub/", child.clone(), 0o700);
        deferred.apply().unwrap();

        let parent_mode = fs::metadata(&parent).unwrap().permissions().mode() & 0o777;
        let child_mode = fs::metadata(&child).unwrap().permissions().mode() & 0o777;
        assert_eq!(parent_mode, 0o555);
        assert_eq!(child_mode, 0o700);

        apply_mode(&parent, 0o755).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn apply_mode_masks_file_type_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let file = temp.path().join("tool");
        fs::write(&file, "#!/bin/sh\n").unwrap();
        apply_mode(&file, 0o100755).unwrap();

        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o755);
        assert_eq!(source_mode(&fs::metadata(&file).unwrap()), 0o755);
    }
}
