use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogicalPathError {
    #[error("logical path is empty")]
    Empty,
    #[error("logical path {0:?} is absolute")]
    Absolute(String),
    #[error("logical path {path:?} has an invalid segment {segment:?}")]
    Segment { path: String, segment: String },
}

/// Forward-slash separated relative path of an asset, as written in the manifest.
///
/// Validated on construction: no empty, `.` or `..` segments, no backslashes,
/// NULs or drive prefixes. Converting to a host path happens only through
/// [`LogicalPath::to_fs_path`], so manifests stay OS-independent.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalPath(String);

impl LogicalPath {
    pub fn parse(s: &str) -> Result<Self, LogicalPathError> {
        if s.is_empty() {
            return Err(LogicalPathError::Empty);
        }
        if s.starts_with('/') {
            return Err(LogicalPathError::Absolute(s.to_owned()));
        }
        for seg in s.split('/') {
            let bad = seg.is_empty()
                || seg == "."
                || seg == ".."
                || seg.contains(['\\', '\0'])
                // "C:" would make a drive-relative path on Windows
                || seg.contains(':');
            if bad {
                return Err(LogicalPathError::Segment { path: s.to_owned(), segment: seg.to_owned() });
            }
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Every segment but the last: the directories the asset lives in.
    pub fn parent_segments(&self) -> impl Iterator<Item = &str> {
        let parent = self.0.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        parent.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment: the human-readable file name.
    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, n)| n).unwrap_or(&self.0)
    }

    /// Directory under `root` that holds this asset.
    pub fn fs_parent(&self, root: &Path) -> PathBuf {
        let mut p = root.to_path_buf();
        p.extend(self.parent_segments());
        p
    }

    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.fs_parent(root).join(self.file_name())
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl FromStr for LogicalPath {
    type Err = LogicalPathError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for LogicalPath {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LogicalPath {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
