//! Instruments the pipeline knows and the corrections each one allows.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use celestial_headers::Header;
use celestial_wcs::{KeywordProvider, WcsError, WcsResult};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CorrectionSet: u8 {
        const DET2IM = 0b00001;
        const VELOCITY_ABERRATION = 0b00010;
        const TIME_DEPENDENT = 0b00100;
        const COMPOSITE_POLYNOMIAL = 0b01000;
        const LOOKUP = 0b10000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    Acs,
    Wfc3,
    Wfpc2,
    Nicmos,
    Stis,
}

impl Instrument {
    pub const ALL: [Instrument; 5] = [Self::Acs, Self::Wfc3, Self::Wfpc2, Self::Nicmos, Self::Stis];

    /// Reads `INSTRUME` from a primary header.
    pub fn from_header(primary: &Header) -> WcsResult<Self> {
        primary.require_string("INSTRUME")?.parse()
    }

    pub fn allowed(self) -> CorrectionSet {
        match self {
            Self::Acs => CorrectionSet::all(),
            Self::Wfc3 => CorrectionSet::all().difference(CorrectionSet::TIME_DEPENDENT),
            Self::Wfpc2 => {
                CorrectionSet::DET2IM | CorrectionSet::VELOCITY_ABERRATION | CorrectionSet::COMPOSITE_POLYNOMIAL
            }
            Self::Nicmos | Self::Stis => CorrectionSet::VELOCITY_ABERRATION | CorrectionSet::COMPOSITE_POLYNOMIAL,
        }
    }

    /// Keyword and value identifying the reference chip for a detector, if
    /// this instrument has one.
    pub fn reference_chip(self, detector: Option<&str>) -> Option<(&'static str, i64)> {
        let detector = detector.map(str::trim);
        match (self, detector) {
            (Self::Wfpc2, _) => Some(("DETECTOR", 3)),
            (Self::Acs, Some("WFC")) | (Self::Wfc3, Some("UVIS")) => Some(("CCDCHIP", 2)),
            _ => None,
        }
    }

    /// Keyword naming the chip of a science extension.
    pub fn chip_keyword(self) -> &'static str {
        match self {
            Self::Wfpc2 => "DETECTOR",
            _ => "CCDCHIP",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Acs => "ACS",
            Self::Wfc3 => "WFC3",
            Self::Wfpc2 => "WFPC2",
            Self::Nicmos => "NICMOS",
            Self::Stis => "STIS",
        }
    }
}

impl FromStr for Instrument {
    type Err = WcsError;

    fn from_str(s: &str) -> WcsResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACS" => Ok(Self::Acs),
            "WFC3" => Ok(Self::Wfc3),
            "WFPC2" => Ok(Self::Wfpc2),
            "NICMOS" => Ok(Self::Nicmos),
            "STIS" => Ok(Self::Stis),
            other => Err(WcsError::argument(format!("unsupported instrument '{other}'"))),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
