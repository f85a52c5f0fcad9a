//! Locator module
//!
//! A [`Locator`] is the crawler's answer to "where does this resource live":
//! either an absolute filesystem path or an absolute http(s) URL, under one
//! abstraction. Constructed locators are always absolute; relative references
//! are resolved against an existing locator instead (see [`Locator::resolve`]).

mod resolve;

pub(crate) use resolve::clean_path;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::{LocatorError, LocatorResult};

/// The normalized location of a resource: an absolute filesystem path or an
/// absolute http(s) URL.
///
/// A `file://` URL is converted to a filesystem locator at construction time,
/// so downstream code only ever sees the two cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    inner: Inner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Inner {
    File(PathBuf),
    Url(Url),
}

impl Locator {
    /// Creates a locator from a string.
    ///
    /// Accepted inputs are absolute filesystem paths, `file://` URLs (which
    /// become filesystem locators), and `http`/`https` URLs. Anything else --
    /// a relative path or an unknown scheme -- is rejected.
    pub fn new(input: &str) -> LocatorResult<Self> {
        match Url::parse(input) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Self {
                    inner: Inner::Url(url),
                }),
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|()| LocatorError::InvalidFileUrl(input.to_string()))?;
                    Ok(Self {
                        inner: Inner::File(path),
                    })
                }
                scheme => Err(LocatorError::UnsupportedScheme(scheme.to_string())),
            },
            // No scheme at all: treat the input as a filesystem path.
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let path = Path::new(input);
                if !path.is_absolute() {
                    return Err(LocatorError::ExpectedAbsolutePath(input.to_string()));
                }
                Ok(Self {
                    inner: Inner::File(path.to_path_buf()),
                })
            }
            Err(source) => Err(LocatorError::Parse {
                input: input.to_string(),
                source,
            }),
        }
    }

    pub(crate) fn from_path(path: PathBuf) -> Self {
        Self {
            inner: Inner::File(path),
        }
    }

    /// Returns true if this locator points into the filesystem.
    pub fn is_file(&self) -> bool {
        matches!(self.inner, Inner::File(_))
    }

    /// The filesystem path, if this is a file locator.
    pub fn as_path(&self) -> Option<&Path> {
        match &self.inner {
            Inner::File(path) => Some(path),
            Inner::Url(_) => None,
        }
    }

    /// The URL, if this is a URL locator.
    pub fn as_url(&self) -> Option<&Url> {
        match &self.inner {
            Inner::File(_) => None,
            Inner::Url(url) => Some(url),
        }
    }

    /// Sets a query parameter, replacing any existing value for the key.
    ///
    /// An empty value removes the parameter. File locators are left untouched:
    /// link shortcuts append pagination hints like `limit=250`, and those must
    /// not corrupt filesystem paths.
    pub fn set_query_param(&mut self, key: &str, value: &str) {
        let url = match &mut self.inner {
            Inner::File(_) => return,
            Inner::Url(url) => url,
        };
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k.as_ref() != key)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            if !value.is_empty() {
                pairs.append_pair(key, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::File(path) => write!(f, "{}", path.display()),
            Inner::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Explicit JSON form of a locator.
///
/// The `file` flag is redundant with the string, but carrying it makes a
/// corrupted record fail loudly on decode instead of silently flipping mode.
#[derive(Serialize, Deserialize)]
struct JsonLocator {
    url: String,
    file: bool,
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JsonLocator {
            url: self.to_string(),
            file: self.is_file(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = JsonLocator::deserialize(deserializer)?;
        if json.url.is_empty() {
            return Err(D::Error::custom(LocatorError::MissingUrl));
        }
        let locator = Locator::new(&json.url).map_err(D::Error::custom)?;
        if locator.is_file() != json.file {
            return Err(D::Error::custom(LocatorError::FileFlagMismatch(json.url)));
        }
        Ok(locator)
    }
}
