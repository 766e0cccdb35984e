//! Pack a directory tree into a single archive and unpack it again.
//!
//! Every archive holds exactly one top directory. Compression stores the
//! source directory under its own name; extraction checks that all members
//! share one leading path segment and returns the directory it created.
//!
//! - **Zip** - handled in-process, Unix permission bits preserved
//! - **Tar family** - `tar`, `gzip`, `bzip2`, `xz` or any `--<algo>` the host
//!   archiver understands, delegated to the external `tar` program (or the
//!   in-process backend when configured)
//!
//! # Architecture
//!
//! ```text
//! Archiver (archive)
//!     │
//!     ├── ZipCodec ─────────┐
//!     ├── TarCodec ─── CommandRunner (process)
//!     └── NativeTarCodec ───┤
//!                           │
//!          TopDirValidator (topdir) + permissions
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use treepack::{Algorithm, Archiver};
//!
//! # fn main() -> treepack::Result<()> {
//! let archiver = Archiver::default();
//! let archive = archiver.compress(Path::new("build/out"), None, &Algorithm::Gzip)?;
//! let algo = archiver.guess_algo(&archive);
//! let root = archiver.extract(&archive, Path::new("/tmp/unpacked"), &algo)?;
//! assert!(root.ends_with("out"));
//! # Ok(())
//! # }
//! ```

pub mod algo;
pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod permissions;
pub mod preflight;
pub mod process;
pub mod progress;
pub mod topdir;

pub use algo::Algorithm;
pub use archive::{checksum_path, compress, extract, guess_algo, Archiver};
pub use config::{ArchiveConfig, TarBackend};
pub use error::{ArchiveError, Result};
