//! Archive locators: `<type>://<name><archive-relative path>`.
//!
//! # Design
//! - Each path segment is percent-encoded on the way in and decoded on the way
//!   out, so the archive-relative path survives any identifier bytes.
//! - A locator is rejected at construction if its path would not decode back
//!   verbatim (dot segments are normalised away by URL parsing).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use url::Url;

use crate::error::{ConnectorError, ConnectorResult};

/// Persistent reference to an archived copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveLocator {
    uri: Url,
}

impl ArchiveLocator {
    /// Build a locator for an archive-relative path on the given connector.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidIdentity`] when `kind` or `name` cannot
    /// serve as URI scheme and authority, and [`ConnectorError::InvalidRequest`]
    /// when `archive_path` is not absolute or cannot round-trip through a URI.
    pub fn new(kind: &str, name: &str, archive_path: &str) -> ConnectorResult<Self> {
        if !archive_path.starts_with('/') {
            return Err(ConnectorError::invalid_request(
                "archive_path",
                "not_absolute",
                archive_path,
            ));
        }
        let encoded = archive_path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let uri = Url::parse(&format!("{kind}://{name}{encoded}")).map_err(|_| {
            ConnectorError::InvalidIdentity {
                field: "type",
                value: kind.to_string(),
            }
        })?;
        check_identity(&uri, kind, name)?;

        let locator = Self { uri };
        if locator.archive_path()? != archive_path {
            return Err(ConnectorError::invalid_request(
                "archive_path",
                "not_representable",
                archive_path,
            ));
        }
        Ok(locator)
    }

    /// Parse a locator previously rendered with [`Display`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidRequest`] when `raw` is not a URI with
    /// an authority and a path, or carries a query or fragment.
    pub fn parse(raw: &str) -> ConnectorResult<Self> {
        let uri = Url::parse(raw)
            .map_err(|_| ConnectorError::invalid_request("locator", "malformed", raw))?;
        if uri.cannot_be_a_base() || uri.host_str().is_none_or(str::is_empty) {
            return Err(ConnectorError::invalid_request(
                "locator",
                "missing_authority",
                raw,
            ));
        }
        if uri.query().is_some() || uri.fragment().is_some() {
            return Err(ConnectorError::invalid_request(
                "locator",
                "unexpected_query",
                raw,
            ));
        }
        Ok(Self { uri })
    }

    /// Connector type (URI scheme, lower-cased).
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.uri.scheme()
    }

    /// Connector instance name (URI authority).
    #[must_use]
    pub fn authority(&self) -> &str {
        self.uri.host_str().unwrap_or_default()
    }

    /// Decoded archive-relative path, always starting with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidRequest`] when the encoded path does not
    /// decode to UTF-8.
    pub fn archive_path(&self) -> ConnectorResult<String> {
        let encoded = self.uri.path();
        urlencoding::decode(encoded)
            .map(std::borrow::Cow::into_owned)
            .map_err(|_| ConnectorError::invalid_request("locator", "undecodable_path", encoded))
    }

    /// Rendered URI.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.uri.as_str()
    }
}

fn check_identity(uri: &Url, kind: &str, name: &str) -> ConnectorResult<()> {
    if !uri.scheme().eq_ignore_ascii_case(kind) {
        return Err(ConnectorError::InvalidIdentity {
            field: "type",
            value: kind.to_string(),
        });
    }
    let authority_matches = !name.is_empty()
        && uri.host_str() == Some(name)
        && uri.port().is_none()
        && uri.username().is_empty()
        && uri.password().is_none();
    if authority_matches {
        Ok(())
    } else {
        Err(ConnectorError::InvalidIdentity {
            field: "name",
            value: name.to_string(),
        })
    }
}

impl Display for ArchiveLocator {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ArchiveLocator {
    type Err = ConnectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}
