//! The distortion corrections and the order they run in.
//!
//! Each correction is a pure function of the extension being updated and the
//! reference extension. It returns the keywords to merge; the pipeline merges
//! them and re-reads the extension before the next correction runs.

use std::fmt;

use celestial_headers::Header;
use celestial_wcs::linear::invert;
use celestial_wcs::tables::table_extver;
use celestial_wcs::{DistortionKind, KeywordMap, KeywordProvider, WcsError, WcsResult};
use chrono::{Datelike, NaiveDate};

use crate::extension::{ExtensionWcs, NamedModel};
use crate::instrument::{CorrectionSet, Instrument};
use crate::options::UpdateOptions;
use crate::reference::{idc_root, is_unset, LookupChip};

pub type CorrectionFn = fn(&ExtensionWcs, &ExtensionWcs) -> WcsResult<KeywordMap>;

/// Angle between the detector frame and the V2/V3 frame used by the
/// time-dependent skew, degrees.
const THETA_V2V3: f64 = 2.234529;
const TDD_EPOCH: f64 = 2004.15;
const ARCSEC: f64 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Correction {
    Det2Im,
    VelocityAberration,
    TimeDependent,
    CompositePolynomial,
    Lookup,
}

impl Correction {
    /// Application order. Detector-to-image runs before anything that reads
    /// pixel positions; lookup tables see the polynomial-corrected geometry.
    pub const ORDER: [Correction; 5] = [
        Self::Det2Im,
        Self::VelocityAberration,
        Self::TimeDependent,
        Self::CompositePolynomial,
        Self::Lookup,
    ];

    pub fn flag(self) -> CorrectionSet {
        match self {
            Self::Det2Im => CorrectionSet::DET2IM,
            Self::VelocityAberration => CorrectionSet::VELOCITY_ABERRATION,
            Self::TimeDependent => CorrectionSet::TIME_DEPENDENT,
            Self::CompositePolynomial => CorrectionSet::COMPOSITE_POLYNOMIAL,
            Self::Lookup => CorrectionSet::LOOKUP,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Det2Im => "DET2IMCorr",
            Self::VelocityAberration => "VACorr",
            Self::TimeDependent => "TDDCorr",
            Self::CompositePolynomial => "CompSIP",
            Self::Lookup => "NPOLCorr",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Det2Im => "Detector to image correction",
            Self::VelocityAberration => "Velocity aberration correction",
            Self::TimeDependent => "Time dependent distortion correction",
            Self::CompositePolynomial => "Composite polynomial distortion model (SIP)",
            Self::Lookup => "Non-polynomial lookup table distortion correction",
        }
    }

    pub fn function(self) -> CorrectionFn {
        match self {
            Self::Det2Im => det2im,
            Self::VelocityAberration => velocity_aberration,
            Self::TimeDependent => time_dependent,
            Self::CompositePolynomial => composite_polynomial,
            Self::Lookup => lookup,
        }
    }

    pub fn apply(self, ext: &ExtensionWcs, reference: &ExtensionWcs) -> WcsResult<KeywordMap> {
        (self.function())(ext, reference)
    }

    /// Payload this correction owns. Cards of that kind missing from the
    /// returned map are dropped when it is merged.
    pub fn payload_kind(self) -> Option<DistortionKind> {
        match self {
            Self::Det2Im => Some(DistortionKind::Det2Im),
            Self::CompositePolynomial => Some(DistortionKind::Sip),
            Self::Lookup => Some(DistortionKind::Lookup),
            Self::VelocityAberration | Self::TimeDependent => None,
        }
    }

    /// Corrections of `set`, in application order.
    pub fn ordered(set: CorrectionSet) -> impl Iterator<Item = Correction> {
        Self::ORDER.into_iter().filter(move |c| set.contains(c.flag()))
    }
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every correction `instrument` supports, in application order.
pub fn corrections_for(instrument: Instrument) -> Vec<Correction> {
    Correction::ordered(instrument.allowed()).collect()
}

/// Corrections to run on a file: the instrument's allowed set narrowed by the
/// options and by the reference files the primary header names.
pub fn select_corrections(primary: &Header, instrument: Instrument, options: &UpdateOptions) -> CorrectionSet {
    let mut set = instrument.allowed();
    let unset = |keyword: &str| is_unset(primary.get_string(keyword).as_deref());

    if !options.vacorr {
        set.remove(CorrectionSet::VELOCITY_ABERRATION);
    }
    let wfc = instrument == Instrument::Acs
        && primary.get_string("DETECTOR").is_some_and(|d| d.trim() == "WFC");
    if !options.tddcorr || !wfc {
        set.remove(CorrectionSet::TIME_DEPENDENT);
    }
    if unset("IDCTAB") {
        set.remove(CorrectionSet::COMPOSITE_POLYNOMIAL | CorrectionSet::TIME_DEPENDENT);
    }
    if !options.npolcorr || unset("NPOLFILE") {
        set.remove(CorrectionSet::LOOKUP);
    }
    if !options.d2imcorr || unset("D2IMFILE") {
        set.remove(CorrectionSet::DET2IM);
    }
    set
}

fn mul(a: [[f64; 2]; 2], b: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
    [
        [a[0][0] * b[0][0] + a[0][1] * b[1][0], a[0][0] * b[0][1] + a[0][1] * b[1][1]],
        [a[1][0] * b[0][0] + a[1][1] * b[1][0], a[1][0] * b[0][1] + a[1][1] * b[1][1]],
    ]
}

fn apply(m: [[f64; 2]; 2], v: [f64; 2]) -> [f64; 2] {
    [m[0][0] * v[0] + m[0][1] * v[1], m[1][0] * v[0] + m[1][1] * v[1]]
}

/// Rotation whose CD matrix orientation is `degrees` for a positive-scale
/// model with east to the left.
fn rotation(degrees: f64) -> [[f64; 2]; 2] {
    let (s, c) = libm::sincos(degrees.to_radians());
    [[c, s], [-s, c]]
}

/// East increases to the left on the sky.
const PARITY: [[f64; 2]; 2] = [[-1.0, 0.0], [0.0, 1.0]];

/// Smallest signed difference `a - b` between two angles, degrees.
fn diff_angles(a: f64, b: f64) -> f64 {
    let d = (a - b) % 360.0;
    if d > 180.0 {
        d - 360.0
    } else if d < -180.0 {
        d + 360.0
    } else {
        d
    }
}

/// Skew applied to the polynomial coefficients by a time-dependent
/// correction with the given `TDDALPHA`/`TDDBETA`.
pub fn tdd_matrix(alpha: f64, beta: f64) -> [[f64; 2]; 2] {
    let skew = [
        [1.0 + beta / 2048.0, alpha / 2048.0],
        [alpha / 2048.0, 1.0 - beta / 2048.0],
    ];
    mul(rotation(THETA_V2V3), mul(skew, rotation(-THETA_V2V3)))
}

/// `DATE-OBS` (`YYYY-MM-DD`, optionally followed by a time) as a decimal year.
pub fn decimal_year(date: &str) -> WcsResult<f64> {
    let day = date.trim().get(..10).unwrap_or(date);
    let parsed = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|err| WcsError::invalid_keyword("DATE-OBS", format!("{date:?}: {err}")))?;
    let days = NaiveDate::from_ymd_opt(parsed.year(), 12, 31).map_or(365, |end| end.ordinal());
    Ok(f64::from(parsed.year()) + f64::from(parsed.ordinal0()) / f64::from(days))
}

fn set_cd(keywords: &mut KeywordMap, cd: [[f64; 2]; 2]) {
    for (i, row) in cd.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            keywords.set_float(format!("CD{}_{}", i + 1, j + 1), *value);
        }
    }
}

fn velocity_aberration(ext: &ExtensionWcs, reference: &ExtensionWcs) -> WcsResult<KeywordMap> {
    let mut keywords = KeywordMap::new();
    let factor = ext.vafactor;
    if factor == 1.0 {
        return Ok(keywords);
    }
    let cd = ext.record.cd()?;
    set_cd(&mut keywords, cd.map(|row| row.map(|v| v * factor)));

    let crval = ext.record.crval()?;
    let reference_crval = reference.record.crval()?;
    for axis in 0..2 {
        let value = reference_crval[axis] + factor * diff_angles(crval[axis], reference_crval[axis]);
        keywords.set_float(format!("CRVAL{}", axis + 1), value);
    }
    Ok(keywords)
}

fn time_dependent(ext: &ExtensionWcs, _reference: &ExtensionWcs) -> WcsResult<KeywordMap> {
    let date = ext
        .date_obs
        .as_deref()
        .ok_or_else(|| WcsError::missing_keyword("DATE-OBS"))?;
    let elapsed = (decimal_year(date)? - TDD_EPOCH) / 2.5;
    let mut keywords = KeywordMap::new();
    keywords
        .set_float("TDDALPHA", 0.095 + 0.090 * elapsed)
        .set_float("TDDBETA", -0.029 - 0.030 * elapsed);
    Ok(keywords)
}

fn sip_ctype(current: Option<String>, default: &str) -> String {
    let base = current.unwrap_or_else(|| default.to_string());
    let base = base.trim_end();
    let base = base.strip_suffix("-SIP").unwrap_or(base);
    format!("{base}-SIP")
}

fn composite_polynomial(ext: &ExtensionWcs, reference: &ExtensionWcs) -> WcsResult<KeywordMap> {
    let model = ext.idc_model()?;
    let reference_model = reference.idc_model()?;
    let factor = ext.vafactor;

    let reference_orientation = reference.linear()?.orientation();
    let orientation = reference_orientation + (model.theta - reference_model.theta);
    let linear = model.linear();
    let cd = mul(rotation(orientation), mul(PARITY, linear)).map(|row| row.map(|v| v * factor / ARCSEC));

    // Tangent-plane offset of this chip's reference point from the reference chip's.
    let offset = apply(
        mul(rotation(reference_orientation), PARITY),
        [
            (model.v2ref - reference_model.v2ref) * factor / ARCSEC,
            (model.v3ref - reference_model.v3ref) * factor / ARCSEC,
        ],
    );
    let reference_crval = reference.record.crval()?;
    let cos_dec = libm::cos(reference_crval[1].to_radians());
    let crval = [
        reference_crval[0] + offset[0] / cos_dec,
        reference_crval[1] + offset[1],
    ];

    let mut keywords = KeywordMap::new();
    let [ctype1, ctype2] = ext.record.ctype();
    keywords
        .set_string("CTYPE1", sip_ctype(ctype1, "RA---TAN"))
        .set_string("CTYPE2", sip_ctype(ctype2, "DEC--TAN"))
        .set_float("CRPIX1", model.refpix[0])
        .set_float("CRPIX2", model.refpix[1])
        .set_float("CRVAL1", crval[0])
        .set_float("CRVAL2", crval[1]);
    set_cd(&mut keywords, cd);

    let inverse = invert(linear)?;
    let order = model.order as i64;
    keywords.set_int("A_ORDER", order).set_int("B_ORDER", order);
    for n in 2..=model.order {
        for m in 0..=n {
            let sip = apply(inverse, [model.cx(n, m), model.cy(n, m)]);
            keywords
                .set_float(format!("A_{}_{}", m, n - m), sip[0])
                .set_float(format!("B_{}_{}", m, n - m), sip[1]);
        }
    }

    let idctab = ext.idctab.clone().unwrap_or_default();
    let root = idc_root(&idctab);
    let sipname = match &ext.rootname {
        Some(rootname) => format!("{rootname}_{root}"),
        None => root.to_string(),
    };
    keywords
        .set_string("SIPNAME", sipname)
        .set_string("IDCTAB", idctab.as_str())
        .set_float("IDCSCALE", model.scale)
        .set_float("IDCV2REF", model.v2ref)
        .set_float("IDCV3REF", model.v3ref)
        .set_float("IDCTHETA", model.theta)
        .set_float("OCX10", model.cx(1, 0))
        .set_float("OCX11", model.cx(1, 1))
        .set_float("OCY10", model.cy(1, 0))
        .set_float("OCY11", model.cy(1, 1));
    Ok(keywords)
}

fn table_keywords(
    keywords: &mut KeywordMap,
    tables: &NamedModel<LookupChip>,
    sciver: u32,
    dis: &str,
    err: &str,
    record: &str,
) -> WcsResult<()> {
    for grid in &tables.model.grids {
        let axis = grid.axis;
        let image = grid.image()?;
        keywords
            .set_string(format!("{dis}{axis}"), "Lookup")
            .set_float(format!("{err}{axis}"), image.max_abs())
            .set_int(format!("{record}{axis}.EXTVER"), i64::from(table_extver(sciver, axis)))
            .set_int(format!("{record}{axis}.NAXES"), grid.shape.len() as i64);
        if grid.shape.len() == 1 {
            keywords.set_int(format!("{record}{axis}.AXIS.1"), i64::from(axis));
        } else {
            for i in 1..=grid.shape.len() {
                keywords.set_int(format!("{record}{axis}.AXIS.{i}"), i as i64);
            }
        }
    }
    Ok(())
}

fn det2im(ext: &ExtensionWcs, _reference: &ExtensionWcs) -> WcsResult<KeywordMap> {
    let tables = ext
        .d2im
        .as_ref()
        .ok_or_else(|| WcsError::model_mismatch(format!("no detector-to-image model for chip {}", ext.chip)))?;
    let mut keywords = KeywordMap::new();
    table_keywords(&mut keywords, tables, ext.extver, "D2IMDIS", "D2IMERR", "D2IM")?;
    if let Some(first) = tables.model.grids.iter().map(|g| g.axis).min() {
        keywords.set_int("AXISCORR", i64::from(first));
    }
    keywords.set_string("D2IMEXT", tables.basename());
    Ok(keywords)
}

fn lookup(ext: &ExtensionWcs, _reference: &ExtensionWcs) -> WcsResult<KeywordMap> {
    let tables = ext
        .npol
        .as_ref()
        .ok_or_else(|| WcsError::model_mismatch(format!("no lookup-table model for chip {}", ext.chip)))?;
    let mut keywords = KeywordMap::new();
    table_keywords(&mut keywords, tables, ext.extver, "CPDIS", "CPERR", "DP")?;
    keywords.set_string("NPOLEXT", tables.basename());
    Ok(keywords)
}
