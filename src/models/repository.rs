use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// A configured package feed: a display name plus a URL or local path.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PackageSource {
    pub name: String,
    pub source: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl PackageSource {
    pub fn new<S: Into<String>>(name: S, source: S) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn url(&self) -> Option<Url> {
        Url::parse(&self.source).ok()
    }

    pub fn is_http(&self) -> bool {
        self.url()
            .is_some_and(|u| u.scheme() == "http" || u.scheme() == "https")
    }

    pub fn is_local(&self) -> bool {
        !self.is_http()
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        match self.url() {
            Some(url) if url.scheme() == "file" => url.to_file_path().ok(),
            Some(url) if url.scheme().len() > 1 => None,
            // single letter schemes are windows drive letters
            _ => Some(PathBuf::from(&self.source)),
        }
    }
}

impl PartialEq for PackageSource {
    fn eq(&self, other: &Self) -> bool {
        self.source.eq_ignore_ascii_case(&other.source)
    }
}

impl Eq for PackageSource {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_and_local_sources() {
        let remote = PackageSource::new("nuget.org", "https://api.nuget.org/v3/index.json");
        assert!(remote.is_http());
        assert!(remote.local_path().is_none());

        let local = PackageSource::new("local", "/var/packages");
        assert!(local.is_local());
        assert_eq!(local.local_path(), Some(PathBuf::from("/var/packages")));

        let file = PackageSource::new("file", "file:///tmp/feed");
        assert_eq!(file.local_path(), Some(PathBuf::from("/tmp/feed")));
    }

    #[test]
    fn test_sources_compare_by_location_ignoring_case() {
        let a = PackageSource::new("one", "https://Feed.example/");
        let b = PackageSource::new("two", "https://feed.example/");
        assert_eq!(a, b);
    }
}
