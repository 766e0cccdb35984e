//! Zip codec.
//!
//! Compression dereferences symlinks: a link to a file is stored as the
//! file's content under the link's name, a link to a directory is dropped
//! (not descended into). Only regular files get entries.
//!
//! Extraction trusts the first member's leading segment as the top directory
//! and rejects the archive at the first member that disagrees. Members
//! written before the mismatch stay on disk.

use std::fs::{File, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{
    append_extension, posix_path, source_basename, stored_entry, Codec, CodecOptions, Stored,
};
use crate::algo::Algorithm;
use crate::error::{ArchiveError, Result};
use crate::permissions::{
    apply_mode, create_open_dir_all, honors_unix_permissions, source_mode, DeferredDirModes,
    OPEN_DIR_MODE,
};
use crate::progress::Progress;
use crate::topdir::TopDirValidator;

pub struct ZipCodec {
    options: CodecOptions,
}

/// Member metadata read before anything is written.
#[derive(Debug)]
struct ZipMember {
    index: usize,
    name: String,
    is_dir: bool,
    mode: Option<u32>,
}

impl ZipCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }
}

impl Codec for ZipCodec {
    fn compress(
        &self,
        directory: &Path,
        archive_basepath: &Path,
        _algo: &Algorithm,
    ) -> Result<PathBuf> {
        let archive_path = append_extension(archive_basepath, ".zip");
        log::debug!(
            "compressing {} to {}",
            directory.display(),
            archive_path.display()
        );
        let top = source_basename(directory)?;

        let mut writer = ZipWriter::new(File::create(&archive_path)?);
        let progress = Progress::adding(self.options.quiet);

        for entry in WalkDir::new(directory)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            let Some(Stored::File(metadata)) = stored_entry(&entry)? else {
                continue;
            };
            let relative = posix_path(entry.path().strip_prefix(directory).unwrap_or(entry.path()));
            let name = format!("{top}/{relative}");

            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(source_mode(&metadata))
                .last_modified_time(zip_mtime(&metadata))
                .large_file(metadata.len() >= u64::from(u32::MAX));
            writer.start_file(name.as_str(), options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut writer)?;
            progress.member(&relative);
        }

        writer.finish()?;
        progress.finish();
        Ok(archive_path)
    }

    fn extract(&self, archive: &Path, destination: &Path, _algo: &Algorithm) -> Result<PathBuf> {
        log::debug!("extracting {} to {}", archive.display(), destination.display());
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file).map_err(|e| open_error(archive, e))?;
        let members = read_members(&mut zip)?;

        let first = members.first().ok_or_else(|| {
            ArchiveError::invalid(format!("{} has no members", archive.display()))
        })?;
        let validator = TopDirValidator::from_first_member(&first.name, archive);

        let progress = Progress::counted(
            members.len() as u64,
            self.options.quiet,
            self.options.verbose,
        );
        let mut directories = DeferredDirModes::new();

        for member in &members {
            validator.check(&member.name)?;
            let target = destination.join(validator.member_target(&member.name)?);

            if member.is_dir {
                create_open_dir_all(&target)?;
                apply_mode(&target, OPEN_DIR_MODE)?;
                if let Some(mode) = member.mode {
                    directories.push(&member.name, target, mode);
                }
            } else {
                if let Some(parent) = target.parent() {
                    create_open_dir_all(parent)?;
                }
                let mut entry = zip.by_index(member.index)?;
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                if let Some(mode) = member.mode {
                    apply_mode(&target, mode)?;
                }
            }
            progress.member(&member.name);
        }

        progress.finish();
        directories.apply()?;
        log::debug!("{} extracted in {}", archive.display(), destination.display());
        Ok(destination.join(validator.name()))
    }
}

fn zip_mtime(metadata: &Metadata) -> zip::DateTime {
    metadata
        .modified()
        .ok()
        .map(OffsetDateTime::from)
        .and_then(|t| {
            zip::DateTime::from_date_and_time(
                u16::try_from(t.year()).ok()?,
                u8::from(t.month()),
                t.day(),
                t.hour(),
                t.minute(),
                t.second(),
            )
            .ok()
        })
        .unwrap_or_default()
}

/// Unix modes are kept in memory even where they will not be applied.
fn read_members(zip: &mut ZipArchive<File>) -> Result<Vec<ZipMember>> {
    let mut members = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let file = zip.by_index_raw(index)?;
        members.push(ZipMember {
            index,
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            mode: file.unix_mode(),
        });
    }
    if !honors_unix_permissions() {
        log::debug!("host ignores unix permissions, modes will not be applied");
    }
    Ok(members)
}

fn open_error(archive: &Path, err: ZipError) -> ArchiveError {
    match err {
        ZipError::Io(err) => err.into(),
        other => ArchiveError::invalid(format!("{}: {}", archive.display(), other)),
    }
}
