#![allow(dead_code)]

use std::path::{Path, PathBuf};

use celestial_headers::{Hdu, HduData, HduList, ImageData, Keyword};
use celestial_wcs::tables::table_extver;
use celestial_wcs::{WcsKey, WcsRecord};

pub const ROOTNAME: &str = "j94f05bgq";
pub const WCSNAME: &str = "IDC_qbu1641sj";
pub const SIPNAME: &str = "j94f05bgq_qbu1641sj";
pub const NPOLEXT: &str = "v971826mj_npl.fits";
pub const D2IMEXT: &str = "v971826aj_d2i.fits";

fn table(extname: &str, extver: u32, scale: f32) -> Hdu {
    let pixels: Vec<f32> = (0..12).map(|i| scale * i as f32).collect();
    let mut hdu = Hdu::extension(extname, extver)
        .with_data(HduData::Image(ImageData::new(vec![4, 3], pixels).unwrap()));
    hdu.header.set("NAXIS1", 4_i64);
    hdu.header.set("NAXIS2", 3_i64);
    hdu
}

fn science(ver: u32) -> Hdu {
    let offset = f64::from(ver - 1);
    let mut hdu = Hdu::extension("SCI", ver);
    let h = &mut hdu.header;
    h.add_keyword(Keyword::integer("CCDCHIP", i64::from(3 - ver)));
    h.add_keyword(Keyword::integer("WCSAXES", 2));
    h.add_keyword(Keyword::real("CRPIX1", 2048.0));
    h.add_keyword(Keyword::real("CRPIX2", 1024.0));
    h.add_keyword(Keyword::real("CRVAL1", 5.63056810618 + offset * 0.01));
    h.add_keyword(Keyword::real("CRVAL2", -72.0545718428 - offset * 0.03));
    h.add_keyword(Keyword::string("CTYPE1", "RA---TAN-SIP"));
    h.add_keyword(Keyword::string("CTYPE2", "DEC--TAN-SIP"));
    h.add_keyword(Keyword::real("CD1_1", 1.29056256197e-05));
    h.add_keyword(Keyword::real("CD1_2", 5.95309123260e-06));
    h.add_keyword(Keyword::real("CD2_1", 5.02205812356e-06));
    h.add_keyword(Keyword::real("CD2_2", -1.26449562930e-05));
    h.add_keyword(Keyword::string("WCSNAME", WCSNAME));
    h.add_keyword(Keyword::string("IDCTAB", "jref$qbu1641sj_idc.fits"));
    h.add_keyword(Keyword::integer("A_ORDER", 2));
    h.add_keyword(Keyword::real("A_0_2", 2.16615952e-06));
    h.add_keyword(Keyword::real("A_1_1", -5.2562854e-06));
    h.add_keyword(Keyword::real("A_2_0", 8.7112689e-07 * (offset + 1.0)));
    h.add_keyword(Keyword::integer("B_ORDER", 2));
    h.add_keyword(Keyword::real("B_0_2", -7.2458447e-06));
    h.add_keyword(Keyword::real("B_1_1", 6.2138964e-06));
    h.add_keyword(Keyword::real("B_2_0", -1.7529583e-06));
    h.add_keyword(Keyword::string("SIPNAME", SIPNAME));
    for axis in 1..=2 {
        h.add_keyword(Keyword::string(format!("CPDIS{axis}"), "Lookup"));
        h.add_keyword(Keyword::integer(
            format!("DP{axis}.EXTVER"),
            i64::from(table_extver(ver, axis)),
        ));
        h.add_keyword(Keyword::integer(format!("DP{axis}.NAXES"), 2));
        h.add_keyword(Keyword::integer(format!("DP{axis}.AXIS.1"), 1));
        h.add_keyword(Keyword::integer(format!("DP{axis}.AXIS.2"), 2));
    }
    h.add_keyword(Keyword::string("NPOLEXT", NPOLEXT));
    h.add_keyword(Keyword::string("D2IMDIS1", "Lookup"));
    h.add_keyword(Keyword::integer("D2IM1.EXTVER", i64::from(table_extver(ver, 1))));
    h.add_keyword(Keyword::string("D2IMEXT", D2IMEXT));
    h.add_keyword(Keyword::integer("AXISCORR", 1));
    h.add_keyword(Keyword::real("EXPTIME", 500.0));
    hdu
}

/// Two-chip observation in the state an update run leaves it: original
/// solution under `O`, current solution also archived under `A`.
pub fn updated_two_chip() -> HduList {
    let mut primary = Hdu::primary();
    let h = &mut primary.header;
    h.add_keyword(Keyword::string("ROOTNAME", ROOTNAME));
    h.add_keyword(Keyword::string("INSTRUME", "ACS"));
    h.add_keyword(Keyword::string("DETECTOR", "WFC"));
    h.add_keyword(Keyword::string("IDCTAB", "jref$qbu1641sj_idc.fits"));
    h.add_keyword(Keyword::string("NPOLFILE", "jref$v971826mj_npl.fits"));
    h.add_keyword(Keyword::string("D2IMFILE", "jref$v971826aj_d2i.fits"));

    let mut hdul = HduList::from_hdus(vec![primary]);
    for ver in 1..=2 {
        let mut sci = science(ver);
        let crval1 = 5.6 + f64::from(ver) * 0.001;
        for keyword in [
            Keyword::integer("WCSAXESO", 2),
            Keyword::real("CRPIX1O", 2048.0),
            Keyword::real("CRPIX2O", 1024.0),
            Keyword::real("CRVAL1O", crval1),
            Keyword::real("CRVAL2O", -72.05),
            Keyword::string("CTYPE1O", "RA---TAN"),
            Keyword::string("CTYPE2O", "DEC--TAN"),
            Keyword::real("CD1_1O", 1.29e-05),
            Keyword::real("CD1_2O", 5.95e-06),
            Keyword::real("CD2_1O", 5.02e-06),
            Keyword::real("CD2_2O", -1.26e-05),
            Keyword::string("WCSNAMEO", "OPUS"),
        ] {
            sci.header.add_keyword(keyword);
        }
        let current = WcsRecord::read(&sci.header, WcsKey::PRIMARY).unwrap();
        current.write(&mut sci.header, WcsKey::new('A').unwrap());
        hdul.push(sci);
        hdul.push(Hdu::extension("ERR", ver));
        hdul.push(Hdu::extension("DQ", ver));
    }
    for ver in 1..=2 {
        for axis in 1..=2 {
            let extver = table_extver(ver, axis);
            hdul.push(table("WCSDVARR", extver, 0.01 * extver as f32));
        }
        hdul.push(table("D2IMARR", table_extver(ver, 1), 0.1));
    }
    hdul
}

/// Single-extension file with a plain linear WCS in the primary header.
pub fn simple() -> HduList {
    let mut primary = Hdu::primary();
    let h = &mut primary.header;
    h.add_keyword(Keyword::real("CRPIX1", 256.0));
    h.add_keyword(Keyword::real("CRPIX2", 256.0));
    h.add_keyword(Keyword::real("CRVAL1", 83.8221));
    h.add_keyword(Keyword::real("CRVAL2", -5.3911));
    h.add_keyword(Keyword::string("CTYPE1", "RA---TAN"));
    h.add_keyword(Keyword::string("CTYPE2", "DEC--TAN"));
    h.add_keyword(Keyword::real("CDELT1", -2.7778e-4));
    h.add_keyword(Keyword::real("CDELT2", 2.7778e-4));
    h.add_keyword(Keyword::string("WCSNAME", "LINEAR"));
    HduList::from_hdus(vec![primary])
}

pub fn write(dir: &Path, name: &str, hdul: &HduList) -> PathBuf {
    let path = dir.join(name);
    hdul.write_to(&path).unwrap();
    path
}
