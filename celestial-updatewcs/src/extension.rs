//! The view of one science extension that corrections compute from.

use celestial_headers::{Header, HduList};
use celestial_wcs::headerlet::model_basename;
use celestial_wcs::select::extension_label;
use celestial_wcs::{DistortionPayload, KeywordProvider, LinearTransform, WcsError, WcsKey, WcsRecord, WcsResult};

use crate::instrument::{CorrectionSet, Instrument};
use crate::reference::{is_unset, IdcRow, IdcTable, LookupChip, LookupTable, ReferenceFiles};

/// A reference model together with the name the header gives it.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedModel<T> {
    pub name: String,
    pub model: T,
}

impl<T> NamedModel<T> {
    pub fn basename(&self) -> &str {
        model_basename(&self.name)
    }
}

/// Reference models used for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Models {
    pub idc: Option<NamedModel<IdcTable>>,
    pub npol: Option<NamedModel<LookupTable>>,
    pub d2im: Option<NamedModel<LookupTable>>,
}

impl Models {
    /// Loads the models the enabled corrections need, as named by the
    /// primary header.
    pub fn load(primary: &Header, corrections: CorrectionSet, references: &dyn ReferenceFiles) -> WcsResult<Self> {
        let named = |keyword: &str| primary.get_string(keyword).filter(|v| !is_unset(Some(v.as_str())));
        let mut models = Self::default();
        if corrections.intersects(CorrectionSet::COMPOSITE_POLYNOMIAL | CorrectionSet::TIME_DEPENDENT) {
            if let Some(name) = named("IDCTAB") {
                models.idc = Some(NamedModel {
                    model: references.idc_table(&name)?,
                    name,
                });
            }
        }
        if corrections.contains(CorrectionSet::LOOKUP) {
            if let Some(name) = named("NPOLFILE") {
                models.npol = Some(NamedModel {
                    model: references.lookup_table(&name)?,
                    name,
                });
            }
        }
        if corrections.contains(CorrectionSet::DET2IM) {
            if let Some(name) = named("D2IMFILE") {
                models.d2im = Some(NamedModel {
                    model: references.lookup_table(&name)?,
                    name,
                });
            }
        }
        Ok(models)
    }
}

/// Primary record, distortion payload and per-chip models of one extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionWcs {
    pub index: usize,
    pub extver: u32,
    pub chip: i64,
    pub record: WcsRecord,
    pub payload: DistortionPayload,
    pub vafactor: f64,
    /// `TDDALPHA`/`TDDBETA` when a time-dependent correction was applied.
    pub tdd: Option<(f64, f64)>,
    pub rootname: Option<String>,
    pub date_obs: Option<String>,
    pub idctab: Option<String>,
    pub idc: Option<IdcRow>,
    pub npol: Option<NamedModel<LookupChip>>,
    pub d2im: Option<NamedModel<LookupChip>>,
}

impl ExtensionWcs {
    pub fn read(hdul: &HduList, index: usize, instrument: Instrument, models: &Models) -> WcsResult<Self> {
        let primary = &hdul.hdu(0)?.header;
        let hdu = hdul.hdu(index)?;
        let header = &hdu.header;
        let label = || extension_label(hdul, index);

        let record = WcsRecord::read(header, WcsKey::PRIMARY).ok_or_else(|| WcsError::key_not_found(' ', label()))?;
        let chip = header.get_int(instrument.chip_keyword()).unwrap_or(1);
        let tdd = match (header.get_float("TDDALPHA"), header.get_float("TDDBETA")) {
            (Some(alpha), Some(beta)) => Some((alpha, beta)),
            _ => None,
        };

        let idc = match &models.idc {
            Some(idc) => Some(idc.model.row(chip).cloned().ok_or_else(|| {
                WcsError::model_mismatch(format!("{} has no entry for chip {chip} of {}", idc.name, label()))
            })?),
            None => None,
        };
        let chip_tables = |model: &Option<NamedModel<LookupTable>>| -> WcsResult<Option<NamedModel<LookupChip>>> {
            let Some(model) = model else {
                return Ok(None);
            };
            let tables = model.model.chip(chip).cloned().ok_or_else(|| {
                WcsError::model_mismatch(format!("{} has no entry for chip {chip} of {}", model.name, label()))
            })?;
            Ok(Some(NamedModel {
                name: model.name.clone(),
                model: tables,
            }))
        };

        Ok(Self {
            index,
            extver: hdu.extver(),
            chip,
            payload: DistortionPayload::read(header),
            vafactor: header.get_float("VAFACTOR").unwrap_or(1.0),
            tdd,
            rootname: primary.get_string("ROOTNAME"),
            date_obs: primary.get_string("DATE-OBS"),
            idctab: models.idc.as_ref().map(|idc| idc.name.clone()),
            idc,
            npol: chip_tables(&models.npol)?,
            d2im: chip_tables(&models.d2im)?,
            record,
        })
    }

    pub fn linear(&self) -> WcsResult<LinearTransform> {
        self.record.linear()
    }

    /// Polynomial model of this chip, with the time-dependent skew applied
    /// when one is recorded.
    pub fn idc_model(&self) -> WcsResult<IdcRow> {
        let row = self
            .idc
            .as_ref()
            .ok_or_else(|| WcsError::model_mismatch(format!("no distortion table for chip {}", self.chip)))?;
        Ok(match self.tdd {
            Some((alpha, beta)) => row.transformed(crate::corrections::tdd_matrix(alpha, beta)),
            None => row.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceCatalog;
    use celestial_headers::{Hdu, Keyword};

    fn file() -> HduList {
        let mut primary = Hdu::primary();
        primary.header.add_keyword(Keyword::string("ROOTNAME", "j94f05bgq"));
        primary.header.add_keyword(Keyword::string("IDCTAB", "jref$x_idc.fits"));
        primary.header.add_keyword(Keyword::string("NPOLFILE", "N/A"));
        let mut sci = Hdu::extension("SCI", 1);
        for keyword in [
            Keyword::integer("CCDCHIP", 2),
            Keyword::real("CRPIX1", 10.0),
            Keyword::real("CRPIX2", 20.0),
            Keyword::real("CRVAL1", 5.0),
            Keyword::real("CRVAL2", -72.0),
            Keyword::real("CD1_1", -1e-5),
            Keyword::real("CD1_2", 0.0),
            Keyword::real("CD2_1", 0.0),
            Keyword::real("CD2_2", 1e-5),
            Keyword::real("VAFACTOR", 1.0001),
        ] {
            sci.header.add_keyword(keyword);
        }
        HduList::from_hdus(vec![primary, sci])
    }

    fn idc(chip: i64) -> IdcTable {
        IdcTable {
            rows: vec![IdcRow {
                chip,
                order: 1,
                scale: 0.05,
                refpix: [10.0, 20.0],
                v2ref: 0.0,
                v3ref: 0.0,
                theta: 0.0,
                cx: vec![vec![0.0], vec![0.0, 0.05]],
                cy: vec![vec![0.0], vec![0.05, 0.0]],
            }],
        }
    }

    #[test]
    fn loads_only_named_models() {
        let hdul = file();
        let refs = ReferenceCatalog::new().with_idc("x_idc.fits", idc(2));
        let models = Models::load(&hdul.hdus()[0].header, CorrectionSet::all(), &refs).unwrap();
        assert_eq!(models.idc.as_ref().map(NamedModel::basename), Some("x_idc.fits"));
        assert!(models.npol.is_none());
        assert!(models.d2im.is_none());
    }

    #[test]
    fn missing_reference_file_is_io() {
        let hdul = file();
        let err = Models::load(&hdul.hdus()[0].header, CorrectionSet::all(), &ReferenceCatalog::new()).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn reads_extension_state() {
        let hdul = file();
        let refs = ReferenceCatalog::new().with_idc("x_idc.fits", idc(2));
        let models = Models::load(&hdul.hdus()[0].header, CorrectionSet::all(), &refs).unwrap();
        let ext = ExtensionWcs::read(&hdul, 1, Instrument::Acs, &models).unwrap();

        assert_eq!(ext.chip, 2);
        assert_eq!(ext.vafactor, 1.0001);
        assert_eq!(ext.rootname.as_deref(), Some("j94f05bgq"));
        assert!(ext.tdd.is_none());
        assert_eq!(ext.idc_model().unwrap().scale, 0.05);
    }

    #[test]
    fn missing_chip_is_model_mismatch() {
        let hdul = file();
        let refs = ReferenceCatalog::new().with_idc("x_idc.fits", idc(1));
        let models = Models::load(&hdul.hdus()[0].header, CorrectionSet::all(), &refs).unwrap();
        let err = ExtensionWcs::read(&hdul, 1, Instrument::Acs, &models).unwrap_err();
        assert!(matches!(err, WcsError::ModelMismatch { .. }));
    }
}
