//! Bundle reference parsing.
//!
//! A reference names a bundle in a repository the way an image reference
//! names a container image:
//!
//! - `helloworld` → default repository, tag `latest`
//! - `helloworld:0.1.0` → default repository, tag `0.1.0`
//! - `hub.example.org/team/app:1.2.0` → explicit repository domain
//! - `http://localhost:8080/app:dev` → explicit protocol and domain
//!
//! Digest references (`name@sha256:...`) are not supported.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, RegistryResult};

/// Protocol used when the reference does not name one.
pub const DEFAULT_PROTOCOL: &str = "https";

/// Tag used when the reference does not name one.
pub const DEFAULT_TAG: &str = "latest";

const MAX_TAG_LEN: usize = 128;

/// A parsed bundle reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReference {
    protocol: String,
    domain: Option<String>,
    path: String,
    tag: String,
}

impl BundleReference {
    /// Parse a reference string.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoist_registry::BundleReference;
    ///
    /// let r = BundleReference::parse("helloworld").unwrap();
    /// assert_eq!(r.protocol(), "https");
    /// assert_eq!(r.domain(), None);
    /// assert_eq!(r.tag(), "latest");
    ///
    /// let r = BundleReference::parse("http://localhost:8080/team/app:1.0.0").unwrap();
    /// assert_eq!(r.domain(), Some("localhost:8080"));
    /// assert_eq!(r.path(), "team/app");
    /// assert_eq!(r.tag(), "1.0.0");
    /// ```
    pub fn parse(reference: &str) -> RegistryResult<Self> {
        let original = reference;
        let reference = reference.trim();
        let invalid = |reason: &str| RegistryError::InvalidReference {
            reference: original.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (protocol, rest) = match reference.split_once("://") {
            Some((proto, rest)) => (proto, rest),
            None => (DEFAULT_PROTOCOL, reference),
        };
        if protocol.is_empty() || !protocol.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(invalid("invalid protocol"));
        }

        if rest.contains('@') {
            return Err(invalid("digest references are not supported, use a tag"));
        }

        let (domain, remainder) = match rest.split_once('/') {
            Some((first, remainder)) if is_domain(first) => (Some(first), remainder),
            _ => (None, rest),
        };

        let last_slash = remainder.rfind('/').map_or(0, |i| i + 1);
        let (path, tag) = match remainder[last_slash..].rfind(':') {
            Some(i) => {
                let colon = last_slash + i;
                (&remainder[..colon], Some(&remainder[colon + 1..]))
            }
            None => (remainder, None),
        };

        if let Some(domain) = domain {
            validate_domain(domain).map_err(|reason| invalid(&reason))?;
        }
        validate_path(path).map_err(|reason| invalid(&reason))?;
        let tag = match tag {
            Some(tag) => {
                validate_tag(tag).map_err(|reason| invalid(&reason))?;
                tag
            }
            None => DEFAULT_TAG,
        };

        Ok(Self {
            protocol: protocol.to_lowercase(),
            domain: domain.map(str::to_string),
            path: path.to_string(),
            tag: tag.to_string(),
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Repository domain, if the reference names one.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Repository path without domain or tag, e.g. `team/app`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Fill in the domain when the reference lacks one.
    pub fn with_default_domain(mut self, domain: &str) -> Self {
        if self.domain.is_none() {
            self.domain = Some(domain.to_string());
        }
        self
    }

    /// `<proto>://<domain>/repositories/<path>/tags/<tag>`.
    pub fn lookup_url(&self, default_domain: &str) -> String {
        let domain = self.domain.as_deref().unwrap_or(default_domain);
        format!(
            "{}://{}/repositories/{}/tags/{}",
            self.protocol, domain, self.path, self.tag
        )
    }
}

impl fmt::Display for BundleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.protocol)?;
        if let Some(domain) = &self.domain {
            write!(f, "{}/", domain)?;
        }
        write!(f, "{}:{}", self.path, self.tag)
    }
}

/// Where the bundle to install comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// Resolve through a repository.
    Reference(BundleReference),

    /// Use a manifest file on disk as-is.
    File(PathBuf),
}

impl BundleSource {
    /// Pick the source from a positional reference and a `--file` flag.
    ///
    /// Exactly one of the two must be given.
    pub fn from_args(bundle: Option<&str>, file: Option<&Path>) -> RegistryResult<Self> {
        let bundle = bundle.map(str::trim).filter(|b| !b.is_empty());
        match (bundle, file) {
            (Some(_), Some(_)) => Err(RegistryError::ConflictingBundleSource),
            (None, None) => Err(RegistryError::MissingBundle),
            (Some(reference), None) => Ok(Self::Reference(BundleReference::parse(reference)?)),
            (None, Some(path)) => Ok(Self::File(path.to_path_buf())),
        }
    }
}

impl fmt::Display for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(r) => fmt::Display::fmt(r, f),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn is_domain(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn validate_domain(domain: &str) -> Result<(), String> {
    let (host, port) = match domain.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };
    if host.is_empty()
        || host.starts_with(['.', '-'])
        || host.ends_with(['.', '-'])
        || !host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return Err(format!("invalid domain {domain:?}"));
    }
    if let Some(port) = port {
        if port.parse::<u16>().is_err() {
            return Err(format!("invalid port in domain {domain:?}"));
        }
    }
    Ok(())
}

/// Components are `[a-z0-9]+` joined by `.`, `_`, `__` or runs of `-`.
fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("bundle name is required".to_string());
    }

    for component in path.split('/') {
        if !is_path_component(component) {
            return Err(format!(
                "invalid path component {component:?}: must be lowercase alphanumerics separated by '.', '_', '__' or '-'"
            ));
        }
    }
    Ok(())
}

fn is_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    if bytes.is_empty() || !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }

    let mut i = 0;
    while i < bytes.len() {
        if alnum(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !alnum(bytes[i]) {
            i += 1;
        }
        let separator = &component[start..i];
        let ok = matches!(separator, "." | "_" | "__")
            || (!separator.is_empty() && separator.bytes().all(|b| b == b'-'));
        if !ok {
            return false;
        }
    }
    true
}

fn validate_tag(tag: &str) -> Result<(), String> {
    let bytes = tag.as_bytes();
    let first_ok = bytes
        .first()
        .is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'_');
    let rest_ok = bytes
        .iter()
        .skip(1)
        .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));

    if tag.len() > MAX_TAG_LEN || !first_ok || !rest_ok {
        return Err(format!("invalid tag {tag:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_only() {
        let r = BundleReference::parse("foo").unwrap();
        assert_eq!(r.protocol(), "https");
        assert_eq!(r.domain(), None);
        assert_eq!(r.path(), "foo");
        assert_eq!(r.tag(), "latest");
        assert_eq!(
            r.lookup_url("hub.cnlabs.io"),
            "https://hub.cnlabs.io/repositories/foo/tags/latest"
        );
    }

    #[test]
    fn test_parse_full_reference() {
        let r = BundleReference::parse("http://localhost:8080/team/app:1.2.0").unwrap();
        assert_eq!(r.protocol(), "http");
        assert_eq!(r.domain(), Some("localhost:8080"));
        assert_eq!(r.path(), "team/app");
        assert_eq!(r.tag(), "1.2.0");
        assert_eq!(
            r.lookup_url("ignored.example.org"),
            "http://localhost:8080/repositories/team/app/tags/1.2.0"
        );
    }

    #[test]
    fn test_dotted_domain_with_tag() {
        let r = BundleReference::parse("name.example.org/bundle:1.0.0").unwrap();
        assert_eq!(r.protocol(), "https");
        assert_eq!(r.domain(), Some("name.example.org"));
        assert_eq!(r.path(), "bundle");
        assert_eq!(r.tag(), "1.0.0");
        assert_eq!(
            r.lookup_url("hub.cnlabs.io"),
            "https://name.example.org/repositories/bundle/tags/1.0.0"
        );
    }

    #[test]
    fn test_first_component_without_dot_is_path() {
        let r = BundleReference::parse("team/app:v1").unwrap();
        assert_eq!(r.domain(), None);
        assert_eq!(r.path(), "team/app");
        assert_eq!(r.tag(), "v1");
    }

    #[test]
    fn test_localhost_is_domain() {
        let r = BundleReference::parse("localhost/app").unwrap();
        assert_eq!(r.domain(), Some("localhost"));
        assert_eq!(r.path(), "app");
    }

    #[test]
    fn test_port_is_not_tag() {
        let r = BundleReference::parse("registry.example.org:5000/app").unwrap();
        assert_eq!(r.domain(), Some("registry.example.org:5000"));
        assert_eq!(r.tag(), "latest");
    }

    #[test]
    fn test_default_domain() {
        let r = BundleReference::parse("foo:1.0.0")
            .unwrap()
            .with_default_domain("hub.example.org");
        assert_eq!(r.domain(), Some("hub.example.org"));
        assert_eq!(r.to_string(), "https://hub.example.org/foo:1.0.0");

        let r = BundleReference::parse("other.example.org/foo")
            .unwrap()
            .with_default_domain("hub.example.org");
        assert_eq!(r.domain(), Some("other.example.org"));
    }

    #[test]
    fn test_separators_in_path() {
        for ok in ["my-app", "my--app", "my_app", "my__app", "my.app", "a1/b2-c3"] {
            assert!(BundleReference::parse(ok).is_ok(), "{ok} should parse");
        }
        for bad in ["My-App", "-app", "app-", "my___app", "my..app", "a//b", "my_-app"] {
            assert!(BundleReference::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_invalid_references() {
        for bad in [
            "",
            "   ",
            "foo@sha256:abcdef",
            "foo:",
            "foo:-bad",
            "://foo",
            "hub.example.org/",
            "hub.example.org:port/foo",
        ] {
            assert!(
                matches!(
                    BundleReference::parse(bad),
                    Err(RegistryError::InvalidReference { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_tag_length_limit() {
        let long = format!("foo:{}", "a".repeat(128));
        assert!(BundleReference::parse(&long).is_ok());
        let too_long = format!("foo:{}", "a".repeat(129));
        assert!(BundleReference::parse(&too_long).is_err());
    }

    #[test]
    fn test_source_from_args() {
        assert!(matches!(
            BundleSource::from_args(Some("foo"), None).unwrap(),
            BundleSource::Reference(_)
        ));
        assert_eq!(
            BundleSource::from_args(None, Some(Path::new("bundle.json"))).unwrap(),
            BundleSource::File(PathBuf::from("bundle.json"))
        );
        assert!(matches!(
            BundleSource::from_args(Some("foo"), Some(Path::new("bundle.json"))),
            Err(RegistryError::ConflictingBundleSource)
        ));
        assert!(matches!(
            BundleSource::from_args(None, None),
            Err(RegistryError::MissingBundle)
        ));
        assert!(matches!(
            BundleSource::from_args(Some("  "), None),
            Err(RegistryError::MissingBundle)
        ));
    }
}
