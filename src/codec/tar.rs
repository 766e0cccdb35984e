//! Tar family codec driving the host `tar` program.
//!
//! Only the first two listed members are inspected before extraction; the
//! listing process is killed afterwards. Later members are not validated.
//!
//! Member names are taken from the listing as printed. GNU tar escapes
//! non-printable bytes there (`pkg\377`), so such a top directory comes back
//! in its escaped spelling. The extraction itself is unaffected.
//!
//! Tool output echoed with `--verbose` goes to stderr.

use std::fs;
use std::path::{Path, PathBuf};

use super::{append_extension, source_name, Codec, CodecOptions};
use crate::algo::Algorithm;
use crate::error::{ArchiveError, Result};
use crate::process::{Cmd, CmdResult, CommandRunner};
use crate::topdir::TopDirValidator;

/// Members read from the listing before it is cancelled.
const LISTING_PEEK: usize = 2;

pub struct TarCodec<'a> {
    runner: &'a dyn CommandRunner,
    program: PathBuf,
    options: CodecOptions,
}

impl<'a> TarCodec<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: PathBuf, options: CodecOptions) -> Self {
        Self {
            runner,
            program,
            options,
        }
    }

    /// `tar [--verbose] [extra] <action> [--<algo>] --file <archive> --directory <dir>`
    fn command(
        &self,
        extra: &[&str],
        action: &str,
        algo: &Algorithm,
        archive: &Path,
        directory: &Path,
    ) -> Cmd {
        let mut cmd = Cmd::new(&self.program);
        if self.options.echoes_output() {
            cmd = cmd.arg("--verbose");
        }
        cmd = cmd.args(extra).arg(action);
        if let Some(flag) = algo.tar_flag() {
            cmd = cmd.arg(flag);
        }
        cmd.arg("--file")
            .arg_path(archive)
            .arg("--directory")
            .arg_path(directory)
    }

    fn run(&self, cmd: Cmd) -> Result<CmdResult> {
        let result = cmd.run_with(self.runner)?;
        if self.options.echoes_output() {
            for line in result.lines() {
                eprintln!("{line}");
            }
        }
        Ok(result)
    }

    /// Decide the top directory from the head of the listing.
    fn inspect(&self, archive: &Path) -> Result<TopDirValidator> {
        let listing = Cmd::new(&self.program)
            .arg("--list")
            .arg("--file")
            .arg_path(archive)
            .error_msg(format!("could not list {}", archive.display()));
        let peek = self.runner.peek_lines(&listing, LISTING_PEEK)?;

        let mut members = peek.lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty());
        let Some(first) = members.next() else {
            if let Some(exit) = peek.exit {
                listing.check(exit)?;
            }
            return Err(ArchiveError::invalid(format!(
                "{} has no members",
                archive.display()
            )));
        };

        let validator = TopDirValidator::from_first_member(first, archive);
        if let Some(second) = members.next() {
            validator.check(second)?;
        }
        Ok(validator)
    }
}

impl Codec for TarCodec<'_> {
    fn compress(
        &self,
        directory: &Path,
        archive_basepath: &Path,
        algo: &Algorithm,
    ) -> Result<PathBuf> {
        let archive_path = append_extension(archive_basepath, &algo.extension());
        log::debug!(
            "compressing {} to {} with {}",
            directory.display(),
            archive_path.display(),
            self.program.display()
        );
        let parent = directory.parent().unwrap_or(Path::new("/"));
        let input = source_name(directory)?;

        let cmd = self
            .command(&[], "--create", algo, &archive_path, parent)
            .arg(input)
            .error_msg(format!("could not create {}", archive_path.display()));
        self.run(cmd)?;
        Ok(archive_path)
    }

    fn extract(&self, archive: &Path, destination: &Path, algo: &Algorithm) -> Result<PathBuf> {
        log::debug!("extracting {} to {}", archive.display(), destination.display());
        let validator = self.inspect(archive)?;

        let (extra, extract_dir): (&[&str], PathBuf) = if validator.strips_leading_segment() {
            (&["--strip-components=1"], destination.join(validator.name()))
        } else {
            (&[], destination.to_path_buf())
        };
        fs::create_dir_all(&extract_dir)?;

        let cmd = self
            .command(extra, "--extract", algo, archive, &extract_dir)
            .error_msg(format!("could not extract {}", archive.display()));
        self.run(cmd)?;
        Ok(destination.join(validator.name()))
    }
}
