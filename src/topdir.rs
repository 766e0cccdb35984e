//! Single-top-directory policy shared by every codec.
//!
//! The first member of an archive decides the top directory. Either its
//! leading path segment is the top directory and every other member must
//! share it, or the member is rooted (`/` or `.` first character) and the top
//! directory is synthesized from the archive file name, with the leading
//! segment stripped from every member.

use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// Leading path segment of a member, split on the first `/`.
pub fn leading_segment(member: &str) -> &str {
    member.split('/').next().unwrap_or("")
}

/// A member is rooted when it starts with `/` or `.`.
pub fn is_rooted(member: &str) -> bool {
    member.starts_with('/') || member.starts_with('.')
}

/// Top directory name derived from the archive file name: the last
/// extension is stripped, then a trailing `.tar`.
///
/// `foo.tar.gz` -> `foo`, `foo.zip` -> `foo`, `foo` -> `foo`.
pub fn synthesize_top_dir(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.rsplit_once('.').map(|(head, _)| head).unwrap_or(&name);
    stem.strip_suffix(".tar").unwrap_or(stem).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TopDir {
    Literal(String),
    Rooted(String),
}

/// Enforces the single-top-directory invariant over an ordered member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopDirValidator {
    top: TopDir,
}

impl TopDirValidator {
    /// Build the validator from the first member of `archive`.
    pub fn from_first_member(first: &str, archive: &Path) -> Self {
        let top = if is_rooted(first) {
            let name = synthesize_top_dir(archive);
            log::debug!(
                "{} is rooted at '{}', using '{}' as top directory",
                archive.display(),
                leading_segment(first),
                name
            );
            TopDir::Rooted(name)
        } else {
            TopDir::Literal(leading_segment(first).to_string())
        };
        Self { top }
    }

    /// Name of the directory created under the destination.
    pub fn name(&self) -> &str {
        match &self.top {
            TopDir::Literal(name) | TopDir::Rooted(name) => name,
        }
    }

    /// Whether the leading segment of each member is replaced by the
    /// synthesized top directory.
    pub fn strips_leading_segment(&self) -> bool {
        matches!(self.top, TopDir::Rooted(_))
    }

    /// Check that `member` belongs under the same top directory.
    pub fn check(&self, member: &str) -> Result<()> {
        match &self.top {
            TopDir::Literal(top) => {
                let segment = leading_segment(member);
                if segment != top {
                    return Err(ArchiveError::invalid(format!(
                        "invalid member {member}: every file should be in the same top dir ({top} != {segment})"
                    )));
                }
            }
            TopDir::Rooted(_) => {
                if !is_rooted(member) {
                    let segment = leading_segment(member);
                    return Err(ArchiveError::invalid(format!(
                        "invalid member {member}: every file should be rooted like the first one (/ != {segment})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Path of `member` relative to the extraction destination.
    ///
    /// Empty and `.` segments are dropped; `..` is rejected.
    pub fn member_target(&self, member: &str) -> Result<PathBuf> {
        let mut segments = member.split('/');
        let mut target = PathBuf::new();
        if let TopDir::Rooted(name) = &self.top {
            segments.next();
            target.push(name);
        }
        for segment in segments {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(ArchiveError::invalid(format!(
                        "invalid member {member}: parent directory references are not allowed"
                    )))
                }
                other => target.push(other),
            }
        }
        if target.as_os_str().is_empty() {
            return Err(ArchiveError::invalid(format!(
                "invalid member '{member}': empty path"
            )));
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_top_dir_accepts_same_segment() {
        let v = TopDirValidator::from_first_member("pkg/", Path::new("pkg.zip"));
        assert_eq!(v.name(), "pkg");
        assert!(!v.strips_leading_segment());
        v.check("pkg/bin/tool").unwrap();
        v.check("pkg").unwrap();
    }

    #[test]
    fn literal_top_dir_rejects_other_segment() {
        let v = TopDirValidator::from_first_member("a/x.txt", Path::new("a.zip"));
        let err = v.check("b/y.txt").unwrap_err();
        assert!(err.is_invalid_archive());
        let msg = err.to_string();
        assert!(msg.contains("a != b"), "{msg}");
    }

    #[test]
    fn rooted_top_dir_is_synthesized_from_archive_name() {
        let v = TopDirValidator::from_first_member("./", Path::new("/tmp/foo-1.0.tar.gz"));
        assert_eq!(v.name(), "foo-1.0");
        assert!(v.strips_leading_segment());
        v.check("./bin/tool").unwrap();
        v.check("/etc/conf").unwrap();
        assert!(v.check("bin/tool").unwrap_err().is_invalid_archive());
    }

    #[test]
    fn synthesized_names() {
        assert_eq!(synthesize_top_dir(Path::new("foo.tar.bz2")), "foo");
        assert_eq!(synthesize_top_dir(Path::new("foo.zip")), "foo");
        assert_eq!(synthesize_top_dir(Path::new("foo.tar")), "foo");
        assert_eq!(synthesize_top_dir(Path::new("foo")), "foo");
    }

    #[test]
    fn member_targets() {
        let literal = TopDirValidator::from_first_member("pkg/a", Path::new("x.zip"));
        assert_eq!(literal.member_target("pkg/a/b.txt").unwrap(), PathBuf::from("pkg/a/b.txt"));
        assert_eq!(literal.member_target("pkg/").unwrap(), PathBuf::from("pkg"));

        let rooted = TopDirValidator::from_first_member("/usr", Path::new("sys.tar.xz"));
        assert_eq!(rooted.member_target("/usr/lib").unwrap(), PathBuf::from("sys/usr/lib"));
        assert_eq!(rooted.member_target("./etc/x").unwrap(), PathBuf::from("sys/etc/x"));
        assert_eq!(rooted.member_target("./").unwrap(), PathBuf::from("sys"));
    }

    #[test]
    fn parent_references_are_invalid() {
        let v = TopDirValidator::from_first_member("pkg/a", Path::new("x.zip"));
        assert!(v.member_target("pkg/../../etc/passwd").unwrap_err().is_invalid_archive());
    }
}
