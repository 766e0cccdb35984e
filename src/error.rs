//! Error type shared by every codec and the facade.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive breaks the single-top-directory invariant (or is otherwise
    /// structurally unusable).
    #[error("invalid archive: {message}")]
    InvalidArchive { message: String },

    #[error("command failed (exit code {code}): {command}\n{output}")]
    ToolFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("required program '{program}' not found in PATH")]
    ToolNotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("missing required host tools:\n{}", .tools.join("\n"))]
    MissingTools { tools: Vec<String> },

    #[error("algorithm '{algo}' is not supported by the native tar backend")]
    UnsupportedAlgorithm { algo: String },

    #[error("renaming the top directory to '{topdir}' requires the compatibility layer")]
    CompatDisabled { topdir: String },

    #[error("failed to parse config '{}': {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ArchiveError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArchive {
            message: message.into(),
        }
    }

    /// True when the archive itself is malformed, as opposed to a failure of
    /// the filesystem or of an external tool.
    pub fn is_invalid_archive(&self) -> bool {
        matches!(self, Self::InvalidArchive { .. })
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_archive_is_distinguished_from_io() {
        let structural = ArchiveError::invalid("a != b");
        assert!(structural.is_invalid_archive());
        assert_eq!(structural.to_string(), "invalid archive: a != b");

        let io: ArchiveError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(!io.is_invalid_archive());
        assert_eq!(io.to_string(), "gone");
    }

    #[test]
    fn missing_tools_lists_every_tool() {
        let err = ArchiveError::MissingTools {
            tools: vec!["  xz (install: xz-utils)".into(), "  tar (install: tar)".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("xz (install: xz-utils)"));
        assert!(msg.contains("tar (install: tar)"));
    }
}
