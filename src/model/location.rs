//! Model base locations

use std::fmt;
use std::path::PathBuf;

const CHECKPOINT_FILE: &str = "model.json";
const METADATA_FILE: &str = "metadata.json";

/// Base location of a model, either remote or on local disk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelLocation {
    /// `http://` or `https://` base URL, always ending in `/`
    Remote(String),
    /// Local directory
    Local(PathBuf),
}

impl ModelLocation {
    /// Parse a configured location
    ///
    /// URLs with an HTTP(S) scheme are fetched remotely. `file://` URLs and
    /// plain paths are read from disk.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            let mut base = raw.to_string();
            if !base.ends_with('/') {
                base.push('/');
            }
            Self::Remote(base)
        } else if let Some(path) = raw.strip_prefix("file://") {
            Self::Local(PathBuf::from(path))
        } else {
            Self::Local(PathBuf::from(raw))
        }
    }

    /// Location of the topology/weights descriptor
    pub fn checkpoint_url(&self) -> String {
        self.join(CHECKPOINT_FILE)
    }

    /// Location of the label/metadata descriptor
    pub fn metadata_url(&self) -> String {
        self.join(METADATA_FILE)
    }

    fn join(&self, file: &str) -> String {
        match self {
            Self::Remote(base) => format!("{base}{file}"),
            Self::Local(dir) => dir.join(file).to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for ModelLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(base) => write!(f, "{base}"),
            Self::Local(dir) => write!(f, "{}", dir.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_location_gets_trailing_slash() {
        let location = ModelLocation::parse("https://example.com/models/abc");
        assert_eq!(
            location,
            ModelLocation::Remote("https://example.com/models/abc/".to_string())
        );
        assert_eq!(
            location.checkpoint_url(),
            "https://example.com/models/abc/model.json"
        );
        assert_eq!(
            location.metadata_url(),
            "https://example.com/models/abc/metadata.json"
        );
    }

    #[test]
    fn test_local_locations() {
        let location = ModelLocation::parse("file:///srv/models/yes-no");
        assert_eq!(location, ModelLocation::Local(PathBuf::from("/srv/models/yes-no")));
        assert_eq!(location.checkpoint_url(), "/srv/models/yes-no/model.json");

        let location = ModelLocation::parse("./models");
        assert_eq!(location.metadata_url(), "./models/metadata.json");
    }
}
