//! In-process tar family codec built on the `tar` crate.
//!
//! Used when no host archiver should be involved. Unlike the external codec
//! every member is validated, not just the head of the listing.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use tar::{Archive, Builder as TarBuilder, EntryType, Header};
use walkdir::WalkDir;

use super::{
    append_extension, posix_path, source_basename, stored_entry, Codec, CodecOptions, Stored,
};
use crate::algo::Algorithm;
use crate::error::{ArchiveError, Result};
use crate::permissions::{
    apply_mode, create_open_dir_all, source_mode, DeferredDirModes, OPEN_DIR_MODE,
};
use crate::progress::Progress;
use crate::topdir::TopDirValidator;

const ZSTD_LEVEL: i32 = 3;
const XZ_PRESET: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Plain,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl Stream {
    fn for_algo(algo: &Algorithm) -> Result<Self> {
        match algo {
            Algorithm::Tar => Ok(Self::Plain),
            Algorithm::Gzip => Ok(Self::Gzip),
            Algorithm::Bzip2 => Ok(Self::Bzip2),
            Algorithm::Xz => Ok(Self::Xz),
            Algorithm::Other(name) if name == "zstd" || name == "zst" => Ok(Self::Zstd),
            other => Err(ArchiveError::UnsupportedAlgorithm {
                algo: other.to_string(),
            }),
        }
    }

    fn decoder(self, file: File) -> Result<Box<dyn Read>> {
        Ok(match self {
            Self::Plain => Box::new(file),
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
            Self::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(file)),
            Self::Zstd => Box::new(zstd::stream::Decoder::new(file)?),
        })
    }

    fn encoder(self, file: File) -> Result<Compressor> {
        Ok(match self {
            Self::Plain => Compressor::Plain(file),
            Self::Gzip => Compressor::Gzip(flate2::write::GzEncoder::new(
                file,
                flate2::Compression::default(),
            )),
            Self::Bzip2 => Compressor::Bzip2(bzip2::write::BzEncoder::new(
                file,
                bzip2::Compression::default(),
            )),
            Self::Xz => Compressor::Xz(xz2::write::XzEncoder::new(file, XZ_PRESET)),
            Self::Zstd => Compressor::Zstd(zstd::stream::Encoder::new(file, ZSTD_LEVEL)?),
        })
    }
}

/// Output side of the archive, finished explicitly so trailers get written.
enum Compressor {
    Plain(File),
    Gzip(flate2::write::GzEncoder<File>),
    Bzip2(bzip2::write::BzEncoder<File>),
    Xz(xz2::write::XzEncoder<File>),
    Zstd(zstd::stream::Encoder<'static, File>),
}

impl Compressor {
    fn finish(self) -> io::Result<()> {
        let file = match self {
            Self::Plain(file) => file,
            Self::Gzip(enc) => enc.finish()?,
            Self::Bzip2(enc) => enc.finish()?,
            Self::Xz(enc) => enc.finish()?,
            Self::Zstd(enc) => enc.finish()?,
        };
        file.sync_all()
    }

    fn inner(&mut self) -> &mut dyn Write {
        match self {
            Self::Plain(w) => w,
            Self::Gzip(w) => w,
            Self::Bzip2(w) => w,
            Self::Xz(w) => w,
            Self::Zstd(w) => w,
        }
    }
}

impl Write for Compressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}

pub struct NativeTarCodec {
    options: CodecOptions,
}

impl NativeTarCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }
}

fn header_for(kind: EntryType, metadata: &Metadata) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(if kind == EntryType::Regular {
        metadata.len()
    } else {
        0
    });
    header.set_mode(source_mode(metadata));
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    header
}

impl Codec for NativeTarCodec {
    fn compress(
        &self,
        directory: &Path,
        archive_basepath: &Path,
        algo: &Algorithm,
    ) -> Result<PathBuf> {
        let stream = Stream::for_algo(algo)?;
        let archive_path = append_extension(archive_basepath, &algo.extension());
        log::debug!(
            "compressing {} to {} (native {:?})",
            directory.display(),
            archive_path.display(),
            stream
        );
        let top = source_basename(directory)?;

        let out = File::create(&archive_path)?;
        let mut builder = TarBuilder::new(stream.encoder(out)?);
        let progress = Progress::adding(self.options.quiet);

        let root = fs::metadata(directory)?;
        let mut header = header_for(EntryType::Directory, &root);
        builder.append_data(&mut header, format!("{top}/"), io::empty())?;

        for entry in WalkDir::new(directory)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            let relative = posix_path(entry.path().strip_prefix(directory).unwrap_or(entry.path()));
            let name = format!("{top}/{relative}");

            match stored_entry(&entry)? {
                Some(Stored::Dir(metadata)) => {
                    let mut header = header_for(EntryType::Directory, &metadata);
                    builder.append_data(&mut header, format!("{name}/"), io::empty())?;
                }
                Some(Stored::File(metadata)) => {
                    let mut header = header_for(EntryType::Regular, &metadata);
                    let mut source = File::open(entry.path())?;
                    builder.append_data(&mut header, &name, &mut source)?;
                }
                None => continue,
            }
            progress.member(&relative);
        }

        builder.into_inner()?.finish()?;
        progress.finish();
        Ok(archive_path)
    }

    fn extract(&self, archive: &Path, destination: &Path, algo: &Algorithm) -> Result<PathBuf> {
        let stream = Stream::for_algo(algo)?;
        log::debug!(
            "extracting {} to {} (native {:?})",
            archive.display(),
            destination.display(),
            stream
        );
        let mut tar = Archive::new(stream.decoder(File::open(archive)?)?);
        let progress = Progress::uncounted(self.options.quiet, self.options.verbose);
        let mut directories = DeferredDirModes::new();
        let mut validator: Option<TopDirValidator> = None;

        for entry in tar.entries()? {
            let mut entry = entry?;
            let member = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let validator =
                validator.get_or_insert_with(|| TopDirValidator::from_first_member(&member, archive));
            validator.check(&member)?;
            let relative = validator.member_target(&member)?;
            reject_symlinked_parents(destination, &relative, &member)?;
            let target = destination.join(&relative);
            let mode = entry.header().mode()?;

            match entry.header().entry_type() {
                EntryType::Directory => {
                    remove_symlink(&target)?;
                    create_open_dir_all(&target)?;
                    apply_mode(&target, OPEN_DIR_MODE)?;
                    directories.push(&member, target, mode);
                }
                EntryType::Regular | EntryType::Continuous => {
                    if let Some(parent) = target.parent() {
                        create_open_dir_all(parent)?;
                    }
                    remove_symlink(&target)?;
                    let mut out = File::create(&target)?;
                    io::copy(&mut entry, &mut out)?;
                    apply_mode(&target, mode)?;
                }
                EntryType::Symlink => {
                    let link = entry
                        .link_name()?
                        .ok_or_else(|| {
                            ArchiveError::invalid(format!("symlink {member} has no target"))
                        })?
                        .into_owned();
                    check_link_target(&relative, &link, &member)?;
                    if let Some(parent) = target.parent() {
                        create_open_dir_all(parent)?;
                    }
                    create_symlink(&link, &target)?;
                }
                other => {
                    log::warn!("skipping {member}: unsupported entry type {other:?}");
                    continue;
                }
            }
            progress.member(&member);
        }

        progress.finish();
        let validator = validator.ok_or_else(|| {
            ArchiveError::invalid(format!("{} has no members", archive.display()))
        })?;
        directories.apply()?;
        Ok(destination.join(validator.name()))
    }
}

/// Refuse members that would be written through a symlink extracted
/// earlier.
fn reject_symlinked_parents(destination: &Path, relative: &Path, member: &str) -> Result<()> {
    let mut current = destination.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        let is_link = fs::symlink_metadata(&current)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            return Err(ArchiveError::invalid(format!(
                "invalid member {member}: parent {} is a symlink",
                current.display()
            )));
        }
    }
    Ok(())
}

/// A symlink target must stay inside the extracted top directory.
/// `relative` is the link's own path, top directory first.
fn check_link_target(relative: &Path, link: &Path, member: &str) -> Result<()> {
    let escapes = || {
        ArchiveError::invalid(format!(
            "invalid member {member}: symlink target {} leaves the top directory",
            link.display()
        ))
    };
    let mut depth = relative.components().count() as isize - 2;
    if depth < 0 {
        return Err(escapes());
    }
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(escapes());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escapes()),
        }
    }
    Ok(())
}

fn remove_symlink(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => fs::remove_file(path),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn create_symlink(link: &Path, target: &Path) -> io::Result<()> {
    if target.symlink_metadata().is_ok() {
        fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn create_symlink(link: &Path, target: &Path) -> io::Result<()> {
    log::warn!(
        "skipping symlink {} -> {}: not supported on this host",
        target.display(),
        link.display()
    );
    Ok(())
}
