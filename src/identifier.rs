//! Extension identifiers (`publisher.name[@version]`) and exclusion sets.
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::IdentifierError;

/// One installable extension, optionally pinned to a version.
///
/// Equality and hashing use the lower-cased `publisher.name` key only, so
/// `GitHub.Copilot` and `github.copilot@1.2.0` are the same identifier for
/// deduplication and exclusion.
///
/// # Examples
///
/// ```
/// use extpack_cli::identifier::Identifier;
///
/// let id: Identifier = "Rust-Lang.Rust-Analyzer@0.3.2".parse().unwrap();
/// assert_eq!(id.publisher(), "Rust-Lang");
/// assert_eq!(id.name(), "Rust-Analyzer");
/// assert_eq!(id.pinned_version(), Some("0.3.2"));
/// assert_eq!(id.key(), "rust-lang.rust-analyzer");
/// assert_eq!(id, "rust-lang.rust-analyzer".parse().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct Identifier {
    publisher: String,
    name: String,
    pinned_version: Option<String>,
    key: String,
}

impl Identifier {
    /// Parse `publisher.name` or `publisher.name@version`.
    ///
    /// The version is split on the last `@`; publisher and name on the
    /// first `.`, so names may themselves contain dots.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentifierError`] if the string is empty, has no `.`
    /// separator, has an empty publisher, name, or version, or if publisher
    /// or name contain a path separator, `..`, or a control character.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }

        let (base, pinned_version) = match trimmed.rsplit_once('@') {
            Some((_, version)) if version.trim().is_empty() => {
                return Err(IdentifierError::EmptyVersion(trimmed.to_string()));
            }
            Some((base, version)) => (base.trim(), Some(version.trim().to_string())),
            None => (trimmed, None),
        };

        let Some((publisher, name)) = base.split_once('.') else {
            return Err(IdentifierError::MissingSeparator(trimmed.to_string()));
        };
        if publisher.is_empty() {
            return Err(IdentifierError::EmptyPublisher(trimmed.to_string()));
        }
        if name.is_empty() {
            return Err(IdentifierError::EmptyName(trimmed.to_string()));
        }
        if !is_token(publisher) || !is_token(name) {
            return Err(IdentifierError::UnsafeCharacters(trimmed.to_string()));
        }

        Ok(Self {
            key: format!("{publisher}.{name}").to_lowercase(),
            publisher: publisher.to_string(),
            name: name.to_string(),
            pinned_version,
        })
    }

    /// Publisher as written.
    #[must_use]
    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    /// Extension name as written.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested version, if pinned.
    #[must_use]
    pub fn pinned_version(&self) -> Option<&str> {
        self.pinned_version.as_deref()
    }

    /// Lower-cased `publisher.name`, the identity used for dedup and exclusion.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `publisher.name` with the original casing, as sent to the catalog.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.publisher, self.name)
    }
}

/// Publisher and name become part of a directory name, so they must not
/// be able to name another directory.
fn is_token(part: &str) -> bool {
    !part.contains("..")
        && !part
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pinned_version {
            Some(version) => write!(f, "{}.{}@{version}", self.publisher, self.name),
            None => write!(f, "{}.{}", self.publisher, self.name),
        }
    }
}

/// Case-insensitive set of identifiers that must never be installed.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    keys: HashSet<String>,
}

impl ExclusionSet {
    /// Build the set from raw patterns, returning the patterns that could
    /// not be parsed alongside it. Version suffixes are ignored.
    #[must_use]
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> (Self, Vec<(String, IdentifierError)>) {
        let mut set = Self::default();
        let mut rejected = Vec::new();
        for pattern in patterns {
            match Identifier::parse(pattern.as_ref()) {
                Ok(id) => set.insert(&id),
                Err(e) => rejected.push((pattern.as_ref().to_string(), e)),
            }
        }
        (set, rejected)
    }

    /// Add an identifier to the set.
    pub fn insert(&mut self, id: &Identifier) {
        self.keys.insert(id.key().to_string());
    }

    /// Whether `id` is excluded.
    #[must_use]
    pub fn contains(&self, id: &Identifier) -> bool {
        self.keys.contains(id.key())
    }

    /// Number of excluded identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing is excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_identifier() {
        let id = Identifier::parse("ms-python.python").unwrap();
        assert_eq!(id.publisher(), "ms-python");
        assert_eq!(id.name(), "python");
        assert_eq!(id.pinned_version(), None);
        assert_eq!(id.to_string(), "ms-python.python");
    }

    #[test]
    fn parse_pinned_identifier() {
        let id = Identifier::parse("pub.foo@2.0.0").unwrap();
        assert_eq!(id.pinned_version(), Some("2.0.0"));
        assert_eq!(id.key(), "pub.foo");
        assert_eq!(id.to_string(), "pub.foo@2.0.0");
    }

    #[test]
    fn parse_trims_whitespace() {
        let id = Identifier::parse("  pub.foo  ").unwrap();
        assert_eq!(id.qualified_name(), "pub.foo");
    }

    #[test]
    fn name_may_contain_dots() {
        let id = Identifier::parse("pub.foo.bar").unwrap();
        assert_eq!(id.publisher(), "pub");
        assert_eq!(id.name(), "foo.bar");
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert_eq!(
            Identifier::parse("nodot"),
            Err(IdentifierError::MissingSeparator("nodot".to_string()))
        );
        assert_eq!(
            Identifier::parse("nodot@1.0.0"),
            Err(IdentifierError::MissingSeparator("nodot@1.0.0".to_string()))
        );
    }

    #[test]
    fn empty_parts_are_rejected() {
        assert_eq!(Identifier::parse("   "), Err(IdentifierError::Empty));
        assert!(matches!(
            Identifier::parse(".foo"),
            Err(IdentifierError::EmptyPublisher(_))
        ));
        assert!(matches!(
            Identifier::parse("pub."),
            Err(IdentifierError::EmptyName(_))
        ));
        assert!(matches!(
            Identifier::parse("pub.foo@"),
            Err(IdentifierError::EmptyVersion(_))
        ));
    }

    #[test]
    fn path_characters_are_rejected() {
        for raw in [
            "a/.x",
            "pub.x/../y",
            "pub\\evil.x",
            "pub.a..b",
            "c:.x",
            "pub.na\nme",
            "pub/x.y@1.0.0",
        ] {
            assert!(
                matches!(
                    Identifier::parse(raw),
                    Err(IdentifierError::UnsafeCharacters(_))
                ),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn equality_is_case_insensitive_and_ignores_version() {
        let a = Identifier::parse("GitHub.Copilot").unwrap();
        let b = Identifier::parse("github.copilot@1.0.0").unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn exclusion_set_is_case_insensitive() {
        let (set, rejected) = ExclusionSet::from_patterns(&["Pub.Bar", "pub.baz@1.0"]);
        assert!(rejected.is_empty());
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Identifier::parse("pub.bar").unwrap()));
        assert!(set.contains(&Identifier::parse("PUB.BAZ").unwrap()));
        assert!(!set.contains(&Identifier::parse("pub.foo").unwrap()));
    }

    #[test]
    fn exclusion_set_reports_malformed_patterns() {
        let (set, rejected) = ExclusionSet::from_patterns(&["pub.bar", "garbage"]);
        assert_eq!(set.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, "garbage");
    }
}
