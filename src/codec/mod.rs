//! Archive codecs.
//!
//! - [`zip`] - zip, in-process
//! - [`tar`] - tar family, through the host `tar` program
//! - [`tar_native`] - tar family, in-process fallback
//!
//! Every codec packs one directory under its own basename and extracts to
//! `destination/<top directory>`, enforcing the single-top-directory policy
//! of [`crate::topdir`].

pub mod tar;
pub mod tar_native;
pub mod zip;

use std::ffi::{OsStr, OsString};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::DirEntry;

use crate::algo::Algorithm;
use crate::error::Result;

/// Output behavior shared by the codecs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecOptions {
    pub quiet: bool,
    pub verbose: bool,
}

impl CodecOptions {
    /// Whether external tool output is echoed.
    pub fn echoes_output(&self) -> bool {
        !self.quiet || self.verbose
    }
}

pub trait Codec {
    /// Pack `directory` into `archive_basepath` + the algorithm's extension.
    /// Returns the archive path.
    fn compress(
        &self,
        directory: &Path,
        archive_basepath: &Path,
        algo: &Algorithm,
    ) -> Result<PathBuf>;

    /// Unpack `archive` under `destination`. Returns the extracted top
    /// directory.
    fn extract(&self, archive: &Path, destination: &Path, algo: &Algorithm) -> Result<PathBuf>;
}

/// `base` with `extension` appended verbatim (no replacement of an existing
/// extension).
pub fn append_extension(base: &Path, extension: &str) -> PathBuf {
    let mut raw = OsString::from(base.as_os_str());
    raw.push(extension);
    PathBuf::from(raw)
}

/// Final component of the source directory, used as the archive top
/// directory.
pub fn source_name(directory: &Path) -> Result<&OsStr> {
    directory.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot archive '{}': no directory name", directory.display()),
        )
        .into()
    })
}

/// [`source_name`] as text, for member names written in-process.
pub fn source_basename(directory: &Path) -> Result<String> {
    source_name(directory).map(|name| name.to_string_lossy().into_owned())
}

/// Relative path rendered with `/` separators.
pub fn posix_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// What a walked source entry contributes to an archive.
pub(crate) enum Stored {
    Dir(Metadata),
    File(Metadata),
}

/// Classify a walked entry. Symlinks are followed: a link to a file is
/// stored as that file, a link to a directory is skipped. Special files are
/// skipped with a warning.
pub(crate) fn stored_entry(entry: &DirEntry) -> Result<Option<Stored>> {
    let file_type = entry.file_type();
    if file_type.is_dir() {
        let metadata = entry.metadata().map_err(io::Error::from)?;
        return Ok(Some(Stored::Dir(metadata)));
    }
    let metadata = if file_type.is_symlink() {
        fs::metadata(entry.path())?
    } else {
        entry.metadata().map_err(io::Error::from)?
    };
    if metadata.is_dir() {
        log::warn!(
            "skipping {}: symlink to a directory is not archived",
            entry.path().display()
        );
        return Ok(None);
    }
    if !metadata.is_file() {
        log::warn!("skipping {}: not a regular file", entry.path().display());
        return Ok(None);
    }
    Ok(Some(Stored::File(metadata)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_appended_not_replaced() {
        assert_eq!(
            append_extension(Path::new("/tmp/pkg-1.2"), ".tar.gz"),
            PathBuf::from("/tmp/pkg-1.2.tar.gz")
        );
    }

    #[test]
    fn basename_of_directory() {
        assert_eq!(source_basename(Path::new("/work/out")).unwrap(), "out");
        assert!(source_basename(Path::new("/")).is_err());
    }

    #[test]
    fn posix_rendering() {
        assert_eq!(posix_path(Path::new("a/b/c.txt")), "a/b/c.txt");
    }

    #[test]
    fn echo_policy() {
        assert!(CodecOptions::default().echoes_output());
        let quiet = CodecOptions {
            quiet: true,
            verbose: false,
        };
        assert!(!quiet.echoes_output());
        let both = CodecOptions {
            quiet: true,
            verbose: true,
        };
        assert!(both.echoes_output());
    }
}
