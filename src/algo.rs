//! Archive algorithms, their canonical extensions and extension inference.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Compression algorithm requested by the caller.
///
/// `Other` carries any name the external archiver may understand as a
/// `--<name>` flag (e.g. `zstd`, `lzip`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Algorithm {
    #[default]
    Zip,
    Tar,
    Gzip,
    Bzip2,
    Xz,
    Other(String),
}

impl Algorithm {
    pub fn from_name(name: &str) -> Self {
        match name {
            "zip" => Self::Zip,
            "tar" => Self::Tar,
            "gzip" => Self::Gzip,
            "bzip2" => Self::Bzip2,
            "xz" => Self::Xz,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Other(name) => name,
        }
    }

    pub fn is_zip(&self) -> bool {
        matches!(self, Self::Zip)
    }

    /// Extension appended to the archive base path, including the leading dot.
    pub fn extension(&self) -> String {
        match self {
            Self::Zip => ".zip".to_string(),
            Self::Tar => ".tar".to_string(),
            Self::Gzip => ".tar.gz".to_string(),
            Self::Bzip2 => ".tar.bz2".to_string(),
            Self::Xz => ".tar.xz".to_string(),
            Self::Other(name) => format!(".tar.{name}"),
        }
    }

    /// Compression flag for the external archiver; plain tar needs none.
    pub fn tar_flag(&self) -> Option<String> {
        match self {
            Self::Tar | Self::Zip => None,
            other => Some(format!("--{}", other.as_str())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl From<String> for Algorithm {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<Algorithm> for String {
    fn from(value: Algorithm) -> Self {
        value.as_str().to_string()
    }
}

/// Whether the host is considered able to handle streaming (tar) formats.
pub fn host_supports_streaming() -> bool {
    cfg!(unix)
}

/// Guess the algorithm from the archive file name.
///
/// Without streaming support only zip is considered, whatever the extension.
/// Otherwise the final extension is matched by substring; an unknown
/// extension is returned as-is so the external archiver can still try it.
pub fn guess_algo(archive: &Path, streaming_supported: bool) -> Algorithm {
    if !streaming_supported {
        return Algorithm::Zip;
    }
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some((_, extension)) = name.rsplit_once('.') else {
        return Algorithm::Zip;
    };

    if extension.contains("zip") {
        Algorithm::Zip
    } else if extension.contains("gz") {
        Algorithm::Gzip
    } else if extension.contains("bz2") {
        Algorithm::Bzip2
    } else if extension.contains("xz") {
        Algorithm::Xz
    } else {
        Algorithm::from_name(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guess(name: &str) -> Algorithm {
        guess_algo(Path::new(name), true)
    }

    #[test]
    fn guesses_known_extensions() {
        assert_eq!(guess("foo.tar.bz2"), Algorithm::Bzip2);
        assert_eq!(guess("foo.zip"), Algorithm::Zip);
        assert_eq!(guess("foo.tar.xz"), Algorithm::Xz);
        assert_eq!(guess("/some/dir/foo.tar.gz"), Algorithm::Gzip);
        assert_eq!(guess("foo.tgz"), Algorithm::Gzip);
        assert_eq!(guess("foo.tar"), Algorithm::Tar);
    }

    #[test]
    fn unknown_extension_is_the_algorithm() {
        assert_eq!(guess("foo.weird"), Algorithm::Other("weird".into()));
        assert_eq!(guess("foo.tar.zst"), Algorithm::Other("zst".into()));
    }

    #[test]
    fn no_extension_falls_back_to_zip() {
        assert_eq!(guess("archive"), Algorithm::Zip);
    }

    #[test]
    fn without_streaming_support_everything_is_zip() {
        assert_eq!(guess_algo(Path::new("foo.tar.gz"), false), Algorithm::Zip);
        assert_eq!(guess_algo(Path::new("foo.weird"), false), Algorithm::Zip);
    }

    #[test]
    fn canonical_extensions() {
        assert_eq!(Algorithm::Zip.extension(), ".zip");
        assert_eq!(Algorithm::Tar.extension(), ".tar");
        assert_eq!(Algorithm::Gzip.extension(), ".tar.gz");
        assert_eq!(Algorithm::Bzip2.extension(), ".tar.bz2");
        assert_eq!(Algorithm::Xz.extension(), ".tar.xz");
        assert_eq!(Algorithm::from_name("lzma").extension(), ".tar.lzma");
    }

    #[test]
    fn tar_flags() {
        assert_eq!(Algorithm::Tar.tar_flag(), None);
        assert_eq!(Algorithm::Gzip.tar_flag().as_deref(), Some("--gzip"));
        assert_eq!(Algorithm::from_name("zstd").tar_flag().as_deref(), Some("--zstd"));
    }

    #[test]
    fn names_round_trip_through_strings() {
        for name in ["zip", "tar", "gzip", "bzip2", "xz", "zstd"] {
            let algo: Algorithm = name.parse().unwrap();
            assert_eq!(algo.to_string(), name);
        }
    }
}
