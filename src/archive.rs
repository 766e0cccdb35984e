//! Archive facade: path normalization, naming and codec dispatch.

use std::fs::{self, File};
use std::ffi::{OsStr, OsString};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::algo::{self, Algorithm};
use crate::codec::tar::TarCodec;
use crate::codec::tar_native::NativeTarCodec;
use crate::codec::zip::ZipCodec;
use crate::codec::{append_extension, Codec, CodecOptions};
use crate::config::{ArchiveConfig, TarBackend};
use crate::error::{ArchiveError, Result};
use crate::process::{ensure_exists, find_program, CommandRunner, SystemRunner};

/// Entry point for compressing and extracting directory trees.
pub struct Archiver {
    config: ArchiveConfig,
    runner: Box<dyn CommandRunner>,
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new(ArchiveConfig::default())
    }
}

impl Archiver {
    pub fn new(config: ArchiveConfig) -> Self {
        Self::with_runner(config, Box::new(SystemRunner))
    }

    /// Use `runner` for every external command.
    pub fn with_runner(config: ArchiveConfig, runner: Box<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    fn options(&self) -> CodecOptions {
        CodecOptions {
            quiet: self.config.quiet,
            verbose: self.config.verbose,
        }
    }

    fn codec(&self, algo: &Algorithm) -> Result<Box<dyn Codec + '_>> {
        if algo.is_zip() {
            return Ok(Box::new(ZipCodec::new(self.options())));
        }
        match self.config.tar_backend {
            TarBackend::Native => {
                log::debug!("using native tar backend for {algo}");
                Ok(Box::new(NativeTarCodec::new(self.options())))
            }
            TarBackend::External => {
                let program = match &self.config.tar_program {
                    Some(program) => program.clone(),
                    None => find_program("tar")?,
                };
                log::debug!("using {} for {algo}", program.display());
                Ok(Box::new(TarCodec::new(
                    self.runner.as_ref(),
                    program,
                    self.options(),
                )))
            }
        }
    }

    /// Compress `directory` into an archive.
    ///
    /// Without `archive` the archive is created next to `directory`, named
    /// after it. With `archive`, anything from the last `.zip` (zip) or
    /// `.tar` (streaming formats) of its file name on is replaced by the
    /// canonical extension. Returns the absolute archive path.
    pub fn compress(
        &self,
        directory: &Path,
        archive: Option<&Path>,
        algo: &Algorithm,
    ) -> Result<PathBuf> {
        ensure_exists(directory, "directory")?;
        let directory = absolute(directory)?;
        if !directory.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", directory.display()),
            )
            .into());
        }

        let archive = absolute(archive.unwrap_or(&directory))?;
        let basepath = archive_basepath(&archive, algo);
        let archive_path = self.codec(algo)?.compress(&directory, &basepath, algo)?;

        if self.config.checksum {
            write_checksum(&archive_path)?;
        }
        Ok(archive_path)
    }

    /// Extract `archive` into `destination`, returning the extracted top
    /// directory.
    pub fn extract(
        &self,
        archive: &Path,
        destination: &Path,
        algo: &Algorithm,
    ) -> Result<PathBuf> {
        ensure_exists(archive, "archive")?;
        let archive = absolute(archive)?;
        let destination = absolute(destination)?;
        self.codec(algo)?.extract(&archive, &destination, algo)
    }

    /// Extract with legacy semantics when the compatibility layer is on:
    /// the algorithm is re-guessed from the file name and the extracted
    /// root may be renamed to `topdir`.
    pub fn extract_as(
        &self,
        archive: &Path,
        destination: &Path,
        algo: &Algorithm,
        topdir: Option<&str>,
    ) -> Result<PathBuf> {
        if !self.config.compat {
            if let Some(topdir) = topdir {
                return Err(ArchiveError::CompatDisabled {
                    topdir: topdir.to_string(),
                });
            }
            return self.extract(archive, destination, algo);
        }

        let guessed = self.guess_algo(archive);
        if topdir.is_none() && *algo == guessed {
            return self.extract(archive, destination, algo);
        }
        if *algo != guessed {
            log::debug!("{algo} disagrees with file name, extracting as {guessed}");
        }

        let root = self.extract(archive, destination, &guessed)?;
        let Some(topdir) = topdir else {
            return Ok(root);
        };
        if root.file_name().is_some_and(|name| name == topdir) {
            return Ok(root);
        }

        let renamed = absolute(destination)?.join(topdir);
        remove_existing(&renamed)?;
        log::debug!("moving {} to {}", root.display(), renamed.display());
        fs::rename(&root, &renamed)?;
        Ok(renamed)
    }

    pub fn guess_algo(&self, archive: &Path) -> Algorithm {
        algo::guess_algo(archive, self.config.streaming_supported())
    }
}

/// Absolute form of `path` with `.` and `..` folded away lexically, without
/// touching the filesystem.
fn absolute(path: &Path) -> io::Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Archive path without its extension; the codec appends the canonical one.
fn archive_basepath(archive: &Path, algo: &Algorithm) -> PathBuf {
    let name = archive.file_name().unwrap_or_default();
    let marker = if algo.is_zip() { ".zip" } else { ".tar" };
    let stem = strip_from_last(name, marker);
    match archive.parent() {
        Some(parent) => parent.join(stem),
        None => PathBuf::from(stem),
    }
}

/// `name` up to the last occurrence of `marker`, or all of it.
fn strip_from_last(name: &OsStr, marker: &str) -> OsString {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        let bytes = name.as_bytes();
        let marker = marker.as_bytes();
        match bytes.windows(marker.len()).rposition(|w| w == marker) {
            Some(at) => OsStr::from_bytes(&bytes[..at]).to_os_string(),
            None => name.to_os_string(),
        }
    }
    #[cfg(not(unix))]
    {
        match name.to_str() {
            Some(text) => text
                .rsplit_once(marker)
                .map_or(text, |(head, _)| head)
                .into(),
            None => name.to_os_string(),
        }
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Sidecar written next to `archive` when checksums are enabled.
pub fn checksum_path(archive: &Path) -> PathBuf {
    append_extension(archive, ".sha256")
}

/// Write `<archive>.sha256` as `"<hex>  <filename>\n"`.
pub fn write_checksum(archive: &Path) -> Result<PathBuf> {
    let sha = sha256_file(archive)?;
    let filename = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar = checksum_path(archive);
    fs::write(&sidecar, format!("{sha}  {filename}\n"))?;
    log::debug!("wrote {}", sidecar.display());
    Ok(sidecar)
}

/// [`Archiver::compress`] with the default configuration.
pub fn compress(directory: &Path, archive: Option<&Path>, algo: &Algorithm) -> Result<PathBuf> {
    Archiver::default().compress(directory, archive, algo)
}

/// [`Archiver::extract`] with the default configuration.
pub fn extract(archive: &Path, destination: &Path, algo: &Algorithm) -> Result<PathBuf> {
    Archiver::default().extract(archive, destination, algo)
}

/// [`Archiver::guess_algo`] with the default configuration.
pub fn guess_algo(archive: &Path) -> Algorithm {
    Archiver::default().guess_algo(archive)
}
