//! Reference resolution against a base locator.
//!
//! STAC links are frequently relative, and what "relative" means depends on
//! where the enclosing document lives: URL bases follow RFC 3986 reference
//! resolution, file bases join against the document's directory with
//! OS-native path semantics.

use std::path::{Component, Path, PathBuf};

use url::Url;

use super::{Inner, Locator};
use crate::{LocatorError, LocatorResult};

impl Locator {
    /// Resolves a link reference against this locator.
    ///
    /// A reference that carries its own scheme re-enters [`Locator::new`],
    /// so an absolute `https://` link inside a file-based catalog yields a
    /// URL locator (the loader's mode check decides whether it may be
    /// followed). Otherwise the reference is interpreted relative to the
    /// base: the base is treated as a document, and its parent directory (or
    /// URL equivalent) becomes the join root.
    pub fn resolve(&self, reference: &str) -> LocatorResult<Self> {
        match Url::parse(reference) {
            Ok(_) => Locator::new(reference),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.inner {
                Inner::File(base) => Ok(Self::resolve_path(base, reference)),
                Inner::Url(base) => {
                    let url = base.join(reference).map_err(|source| LocatorError::Parse {
                        input: reference.to_string(),
                        source,
                    })?;
                    Ok(Locator {
                        inner: Inner::Url(url),
                    })
                }
            },
            Err(source) => Err(LocatorError::Parse {
                input: reference.to_string(),
                source,
            }),
        }
    }

    fn resolve_path(base: &Path, reference: &str) -> Self {
        let path = Path::new(reference);
        if path.is_absolute() {
            return Locator::from_path(path.to_path_buf());
        }
        let dir = base.parent().unwrap_or_else(|| Path::new("/"));
        Locator::from_path(clean_path(&dir.join(path)))
    }
}

/// Lexically cleans a path: drops `.` components and folds `..` into the
/// preceding component. `..` segments may climb above the original base;
/// popping stops at the root.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}
