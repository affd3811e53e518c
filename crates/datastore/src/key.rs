use core::fmt;

/// A hierarchical datastore key, always starting with `/` and never ending with one.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(String);

impl Key {
    pub fn new(path: impl AsRef<str>) -> Self {
        let mut key = String::from("/");

        for segment in path.as_ref().split('/').filter(|s| !s.is_empty()) {
            if key.len() > 1 {
                key.push('/');
            }
            key.push_str(segment);
        }

        Self(key)
    }

    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        Self::new(format!("{}/{}", self.0, segment.as_ref()))
    }

    /// The last path segment of the key.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Whether `self` is a strict descendant of `prefix`.
    pub fn is_descendant_of(&self, prefix: &Key) -> bool {
        if prefix.0 == "/" {
            return self.0.len() > 1;
        }

        self.0.len() > prefix.0.len()
            && self.0.starts_with(&prefix.0)
            && self.0.as_bytes()[prefix.0.len()] == b'/'
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}
