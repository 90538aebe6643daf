use crate::header::{Header, Keyword};
use crate::io::HduList;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one extension of a file, either by position or by its
/// `(EXTNAME, EXTVER)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtensionId {
    Index(usize),
    Named { name: String, ver: u32 },
}

impl ExtensionId {
    pub fn named(name: impl Into<String>, ver: u32) -> Self {
        Self::Named {
            name: name.into(),
            ver,
        }
    }
}

impl From<usize> for ExtensionId {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<(&str, u32)> for ExtensionId {
    fn from((name, ver): (&str, u32)) -> Self {
        Self::named(name, ver)
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Named { name, ver } => write!(f, "('{}', {})", name, ver),
        }
    }
}

/// Two-dimensional (or one-dimensional) float image, stored row-major with
/// the fastest axis first in `shape`, as FITS orders `NAXISn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    shape: Vec<usize>,
    pixels: Vec<f32>,
}

impl ImageData {
    /// Returns `None` when the pixel count does not match the shape.
    pub fn new(shape: Vec<usize>, pixels: Vec<f32>) -> Option<Self> {
        let expected: usize = shape.iter().product();
        (expected == pixels.len() && !shape.is_empty()).then_some(Self { shape, pixels })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn max_abs(&self) -> f64 {
        self.pixels
            .iter()
            .fold(0.0_f64, |acc, &p| acc.max((p as f64).abs()))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum HduData {
    #[default]
    Empty,
    Image(ImageData),
    /// A complete extension set carried inside another file.
    Nested(Box<HduList>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hdu {
    pub header: Header,
    #[serde(default)]
    pub data: HduData,
}

impl Hdu {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            data: HduData::Empty,
        }
    }

    pub fn primary() -> Self {
        let mut header = Header::new();
        header.add_keyword(Keyword::logical("SIMPLE", true));
        header.add_keyword(Keyword::integer("NAXIS", 0));
        header.add_keyword(Keyword::logical("EXTEND", true));
        Self::new(header)
    }

    pub fn extension(name: &str, ver: u32) -> Self {
        let mut header = Header::new();
        header.add_keyword(Keyword::string("XTENSION", "IMAGE"));
        header.add_keyword(Keyword::string("EXTNAME", name));
        header.add_keyword(Keyword::integer("EXTVER", ver as i64));
        Self::new(header)
    }

    pub fn with_data(mut self, data: HduData) -> Self {
        self.data = data;
        self
    }

    pub fn extname(&self) -> Option<&str> {
        self.header.get_keyword_value("EXTNAME")?.as_string()
    }

    /// `EXTVER`, defaulting to 1 when the keyword is absent.
    pub fn extver(&self) -> u32 {
        self.header
            .get_keyword_value("EXTVER")
            .and_then(|v| v.as_integer())
            .map_or(1, |v| v as u32)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.extname()
            .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
    }

    pub fn image(&self) -> Option<&ImageData> {
        match &self.data {
            HduData::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn nested(&self) -> Option<&HduList> {
        match &self.data {
            HduData::Nested(list) => Some(list),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_reports_name_and_version() {
        let hdu = Hdu::extension("SCI", 2);
        assert_eq!(hdu.extname(), Some("SCI"));
        assert_eq!(hdu.extver(), 2);
        assert!(hdu.is_named("sci"));
        assert!(!hdu.is_named("ERR"));
    }

    #[test]
    fn missing_extver_defaults_to_one() {
        let mut hdu = Hdu::extension("SCI", 4);
        hdu.header.remove("EXTVER");
        assert_eq!(hdu.extver(), 1);
    }

    #[test]
    fn primary_has_no_extname() {
        let hdu = Hdu::primary();
        assert_eq!(hdu.extname(), None);
        assert!(hdu.header.contains("SIMPLE"));
    }

    #[test]
    fn image_data_checks_shape() {
        assert!(ImageData::new(vec![2, 3], vec![0.0; 6]).is_some());
        assert!(ImageData::new(vec![2, 3], vec![0.0; 5]).is_none());
        assert!(ImageData::new(vec![], vec![]).is_none());
    }

    #[test]
    fn image_data_max_abs() {
        let image = ImageData::new(vec![3], vec![0.5, -2.0, 1.0]).unwrap();
        assert_eq!(image.max_abs(), 2.0);
    }

    #[test]
    fn extension_id_display() {
        assert_eq!(ExtensionId::from(3).to_string(), "3");
        assert_eq!(ExtensionId::from(("SCI", 1)).to_string(), "('SCI', 1)");
    }
}
