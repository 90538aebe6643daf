//! Extension selection shared by every multi-extension operation.

use celestial_headers::{ExtensionId, HduList};

use crate::error::{WcsError, WcsResult};

pub const SCIENCE: &str = "SCI";

/// Which extensions an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtSelection {
    One(ExtensionId),
    Many(Vec<ExtensionId>),
    /// Every `SCI` extension, or extension 0 of a simple file.
    #[default]
    Science,
}

impl ExtSelection {
    /// Resolves to extension indexes in selection order, without duplicates.
    pub fn resolve(&self, hdul: &HduList) -> WcsResult<Vec<usize>> {
        let indexes = match self {
            Self::One(id) => vec![index_of(hdul, id)?],
            Self::Many(ids) => {
                if ids.is_empty() {
                    return Err(WcsError::argument("empty extension list"));
                }
                let mut indexes = Vec::with_capacity(ids.len());
                for id in ids {
                    let index = index_of(hdul, id)?;
                    if !indexes.contains(&index) {
                        indexes.push(index);
                    }
                }
                indexes
            }
            Self::Science => {
                let indexes = science_extensions(hdul);
                if indexes.is_empty() {
                    return Err(WcsError::argument("file has no science extensions"));
                }
                indexes
            }
        };
        Ok(indexes)
    }
}

fn index_of(hdul: &HduList, id: &ExtensionId) -> WcsResult<usize> {
    hdul.index_of(id)
        .map_err(|_| WcsError::argument(format!("no extension {id} in file")))
}

impl From<ExtensionId> for ExtSelection {
    fn from(id: ExtensionId) -> Self {
        Self::One(id)
    }
}

impl From<usize> for ExtSelection {
    fn from(index: usize) -> Self {
        Self::One(ExtensionId::Index(index))
    }
}

impl From<(&str, u32)> for ExtSelection {
    fn from(id: (&str, u32)) -> Self {
        Self::One(id.into())
    }
}

impl From<Vec<ExtensionId>> for ExtSelection {
    fn from(ids: Vec<ExtensionId>) -> Self {
        Self::Many(ids)
    }
}

impl From<Vec<usize>> for ExtSelection {
    fn from(indexes: Vec<usize>) -> Self {
        Self::Many(indexes.into_iter().map(ExtensionId::Index).collect())
    }
}

impl From<&[(&str, u32)]> for ExtSelection {
    fn from(ids: &[(&str, u32)]) -> Self {
        Self::Many(ids.iter().map(|&id| id.into()).collect())
    }
}

/// `SCI` extensions in file order. A file without any named extension is a
/// simple file whose data and WCS live in extension 0.
pub fn science_extensions(hdul: &HduList) -> Vec<usize> {
    let science = hdul.indices_named(SCIENCE);
    if science.is_empty() && hdul.iter().skip(1).all(|hdu| hdu.extname().is_none()) {
        return vec![0];
    }
    science
}

/// Human-readable label for error messages and logs.
pub fn extension_label(hdul: &HduList, index: usize) -> String {
    match hdul.hdu(index).ok().and_then(|hdu| Some((hdu.extname()?, hdu.extver()))) {
        Some((name, ver)) => format!("('{name}', {ver})"),
        None => index.to_string(),
    }
}
