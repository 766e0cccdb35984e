//! Preflight checks for streaming archive formats.
//!
//! Zip is handled in-process and needs nothing from the host. The tar family
//! is delegated to the host `tar`, which in turn shells out to the matching
//! compressor, so those programs must be on `PATH`.
//!
//! # Example
//!
//! ```rust
//! use treepack::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("xz") {
//!     println!("xz-utils not installed");
//! }
//!
//! let tools = &[("tar", "tar"), ("gzip", "gzip")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::algo::Algorithm;
use crate::error::{ArchiveError, Result};

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools used by streaming formats.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("tar", "tar"),
    ("gzip", "gzip"),
    ("bzip2", "bzip2"),
    ("xz", "xz-utils"),
];

/// Tools needed to handle `algo` through the external archiver.
pub fn tools_for(algo: &Algorithm) -> Vec<(&'static str, &'static str)> {
    let compressor = match algo {
        Algorithm::Zip => return Vec::new(),
        Algorithm::Tar | Algorithm::Other(_) => None,
        Algorithm::Gzip => Some(("gzip", "gzip")),
        Algorithm::Bzip2 => Some(("bzip2", "bzip2")),
        Algorithm::Xz => Some(("xz", "xz-utils")),
    };
    std::iter::once(("tar", "tar")).chain(compressor).collect()
}

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err(MissingTools)` listing each missing tool and its package
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        return Err(ArchiveError::MissingTools { tools: missing });
    }

    Ok(())
}

/// Check every tool in [`REQUIRED_TOOLS`].
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        // 'ls' should exist on any Unix system
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_failure() {
        let tools = &[("nonexistent_command_xyz", "fake-package")];
        match check_required_tools(tools).unwrap_err() {
            ArchiveError::MissingTools { tools } => {
                assert_eq!(tools, ["  nonexistent_command_xyz (install: fake-package)"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tools_for_algorithms() {
        assert!(tools_for(&Algorithm::Zip).is_empty());
        assert_eq!(tools_for(&Algorithm::Tar), [("tar", "tar")]);
        assert_eq!(tools_for(&Algorithm::Xz), [("tar", "tar"), ("xz", "xz-utils")]);
        assert_eq!(tools_for(&Algorithm::from_name("lzip")), [("tar", "tar")]);
    }
}
