mod common;

use celestial_headers::{ExtensionId, HduData, HduList, ImageData, OpenMode};
use celestial_wcs::headerlet::{HDRLET, NO_MODEL, SIPWCS};
use celestial_wcs::{
    attached_headerlets, extract_headerlet, is_identical, list_keys, CreateOptions, DiffOptions, DistortionKind,
    Headerlet, KeywordProvider, WcsError, WcsKey,
};
use tempfile::TempDir;

fn sci(ver: u32) -> ExtensionId {
    ExtensionId::named("SCI", ver)
}

fn sipwcs(ver: u32) -> ExtensionId {
    ExtensionId::named(SIPWCS, ver)
}

fn assert_matches_headerlet(target: &HduList, headerlet: &Headerlet, options: &DiffOptions) {
    let (identical, report) = is_identical(
        target,
        &[sci(1), sci(2)],
        headerlet.hdu_list(),
        &[sipwcs(1), sipwcs(2)],
        options,
    )
    .unwrap();
    assert!(identical, "{report}");
}

/// A package computed from a slightly different solution than the fixture's.
fn shifted_headerlet(hdrname: &str) -> Headerlet {
    Headerlet::create(&shifted_source(), &CreateOptions::named(hdrname)).unwrap()
}

fn shifted_source() -> HduList {
    let mut source = common::updated_two_chip();
    for ver in 1..=2 {
        let header = &mut source.get_mut(&sci(ver)).unwrap().header;
        let crval1 = header.get_float("CRVAL1").unwrap();
        header.set("CRVAL1", crval1 + 1.0e-4);
        header.set("CRPIX2", 1030.5);
        header.set("WCSNAME", "SHIFTED");
    }
    source
}

// --- Creation ---

#[test]
fn test_create_from_all_science_extensions() {
    let hdul = common::updated_two_chip();
    let headerlet = Headerlet::create(&hdul, &CreateOptions::named("hdr1")).unwrap();

    assert_eq!(headerlet.name(), "hdr1");
    assert_eq!(headerlet.wcsname(), Some(common::WCSNAME));
    assert_eq!(headerlet.destim(), Some(common::ROOTNAME));
    assert_eq!(
        headerlet.distname(),
        Some("j94f05bgq_qbu1641sj-v971826mj_npl.fits-v971826aj_d2i.fits")
    );
    assert_eq!(headerlet.model(DistortionKind::Lookup).as_deref(), Some(common::NPOLEXT));
    assert_matches_headerlet(&hdul, &headerlet, &DiffOptions::default());

    let package = headerlet.hdu_list();
    let target = &package.get(&sipwcs(2)).unwrap().header;
    assert_eq!(target.get_string("TG_ENAME").as_deref(), Some("SCI"));
    assert_eq!(target.get_int("TG_EVER"), Some(2));
}

#[test]
fn test_create_embeds_and_renumbers_tables() {
    let hdul = common::updated_two_chip();
    let headerlet = Headerlet::create(&hdul, &CreateOptions::named("hdr1")).unwrap();
    let package = headerlet.hdu_list();

    assert_eq!(package.indices_named("WCSDVARR").len(), 4);
    assert_eq!(package.indices_named("D2IMARR").len(), 2);

    let second = &package.get(&sipwcs(2)).unwrap().header;
    assert_eq!(second.get_int("DP1.EXTVER"), Some(3));
    assert_eq!(second.get_int("DP2.EXTVER"), Some(4));
    assert_eq!(second.get_int("D2IM1.EXTVER"), Some(2));

    let embedded = package.get(&ExtensionId::named("D2IMARR", 2)).unwrap().image();
    let original = hdul.get(&ExtensionId::named("D2IMARR", 3)).unwrap().image();
    assert_eq!(embedded, original);
}

#[test]
fn test_create_from_explicit_lists() {
    let hdul = common::updated_two_chip();

    let by_name = Headerlet::create(&hdul, &CreateOptions::named("hdr2").extensions(vec![sci(1), sci(2)])).unwrap();
    assert_matches_headerlet(&hdul, &by_name, &DiffOptions::default());

    let by_index = Headerlet::create(&hdul, &CreateOptions::named("hdr3").extensions(vec![1_usize, 4])).unwrap();
    assert_matches_headerlet(&hdul, &by_index, &DiffOptions::default());
}

#[test]
fn test_create_from_single_extension() {
    let hdul = common::updated_two_chip();
    let headerlet = Headerlet::create(&hdul, &CreateOptions::named("hdr4").extensions(("SCI", 2))).unwrap();

    assert_eq!(headerlet.hdu_list().indices_named(SIPWCS).len(), 1);
    let (identical, report) = is_identical(
        &hdul,
        &[sci(2)],
        headerlet.hdu_list(),
        &[sipwcs(1)],
        &DiffOptions::default(),
    )
    .unwrap();
    assert!(identical, "{report}");
}

#[test]
fn test_create_from_simple_file() {
    let hdul = common::simple();
    let headerlet = Headerlet::create(&hdul, &CreateOptions::default()).unwrap();

    // named after the solution when no name is given
    assert_eq!(headerlet.name(), "LINEAR");
    assert_eq!(headerlet.model(DistortionKind::Sip), None);
    let package = headerlet.hdu_list();
    assert_eq!(
        package.get(&sipwcs(1)).unwrap().header.get_string("TG_ENAME").as_deref(),
        Some("PRIMARY")
    );
    assert_eq!(package.primary().unwrap().header.get_string("SIPNAME").as_deref(), Some(NO_MODEL));

    let (identical, report) = is_identical(
        &hdul,
        &[ExtensionId::Index(0)],
        package,
        &[sipwcs(1)],
        &DiffOptions::default(),
    )
    .unwrap();
    assert!(identical, "{report}");
}

#[test]
fn test_create_from_alternate_key() {
    let hdul = common::updated_two_chip();
    let options = CreateOptions {
        key: Some(WcsKey::ORIGINAL),
        ..CreateOptions::named("opus")
    };
    let headerlet = Headerlet::create(&hdul, &options).unwrap();
    assert_eq!(headerlet.wcsname(), Some("OPUS"));

    let diff = DiffOptions {
        key_a: WcsKey::ORIGINAL,
        ..DiffOptions::default()
    };
    assert_matches_headerlet(&hdul, &headerlet, &diff);
}

#[test]
fn test_create_without_any_name() {
    let mut hdul = common::updated_two_chip();
    hdul.get_mut(&sci(1)).unwrap().header.remove("WCSNAME");

    let err = Headerlet::create(&hdul, &CreateOptions::default()).unwrap_err();
    assert!(matches!(err, WcsError::MissingName { .. }));

    // an explicit name is enough
    assert!(Headerlet::create(&hdul, &CreateOptions::named("given")).is_ok());
}

#[test]
fn test_create_needs_a_name_on_every_extension() {
    let mut hdul = common::updated_two_chip();
    hdul.get_mut(&sci(2)).unwrap().header.remove("WCSNAME");

    let err = Headerlet::create(&hdul, &CreateOptions::default()).unwrap_err();
    match err {
        WcsError::MissingName { extension } => assert_eq!(extension, "('SCI', 2)"),
        other => panic!("Expected MissingName, got {other}"),
    }

    // HDRNAME alone is enough for the second chip
    hdul.get_mut(&sci(2)).unwrap().header.set("HDRNAME", "chip2_hlet");
    let headerlet = Headerlet::create(&hdul, &CreateOptions::default()).unwrap();
    assert_eq!(headerlet.name(), common::WCSNAME);
}

// --- Distortion model checks ---

#[test]
fn test_wrong_models_are_rejected() {
    let hdul = common::updated_two_chip();
    let wrong = [
        CreateOptions {
            sipname: Some("WRONG".into()),
            ..CreateOptions::named("bad_sip")
        },
        CreateOptions {
            npolfile: Some("jref$wrong_npl.fits".into()),
            ..CreateOptions::named("bad_npol")
        },
        CreateOptions {
            d2imfile: Some("wrong_d2i.fits".into()),
            ..CreateOptions::named("bad_d2im")
        },
        CreateOptions {
            npolfile: Some(NO_MODEL.into()),
            ..CreateOptions::named("no_npol")
        },
    ];

    for options in &wrong {
        let headerlet = Headerlet::create(&hdul, options).unwrap();
        let mut target = common::updated_two_chip();
        let before = target.clone();

        let err = headerlet.apply_as_primary(&mut target, true, true).unwrap_err();
        assert!(matches!(err, WcsError::ModelMismatch { .. }), "{}: {err}", headerlet.name());
        let err = headerlet.apply_as_alternate(&mut target, Some("K"), None, true).unwrap_err();
        assert!(matches!(err, WcsError::ModelMismatch { .. }), "{}: {err}", headerlet.name());
        assert_eq!(target, before);
    }
}

#[test]
fn test_model_named_without_correction_is_rejected() {
    let mut source = common::updated_two_chip();
    let mut target = source.clone();
    for ver in 1..=2 {
        let header = &mut source.get_mut(&sci(ver)).unwrap().header;
        header.retain(|keyword| DistortionKind::of(&keyword.name) != Some(DistortionKind::Lookup));
    }
    let options = CreateOptions {
        npolfile: Some(common::NPOLEXT.into()),
        ..CreateOptions::named("claims_npol")
    };
    let headerlet = Headerlet::create(&source, &options).unwrap();

    let err = headerlet.apply_as_primary(&mut target, false, false).unwrap_err();
    assert!(matches!(err, WcsError::ModelMismatch { .. }));
}

#[test]
fn test_legacy_target_accepts_any_model() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();
    for ver in 1..=2 {
        let header = &mut target.get_mut(&sci(ver)).unwrap().header;
        for keyword in ["SIPNAME", "NPOLEXT", "D2IMEXT"] {
            header.remove(keyword);
        }
    }

    headerlet.apply_as_primary(&mut target, false, false).unwrap();
    assert_matches_headerlet(&target, &headerlet, &DiffOptions::default());
}

// --- Applying ---

#[test]
fn test_apply_as_primary() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();
    let original = common::updated_two_chip();

    headerlet.apply_as_primary(&mut target, true, false).unwrap();
    assert_matches_headerlet(&target, &headerlet, &DiffOptions::default());

    for ver in 1..=2 {
        let header = &target.get(&sci(ver)).unwrap().header;
        assert_eq!(header.get_string("HDRNAME").as_deref(), Some("shifted"));
        // the solution it replaced was already archived under A
        assert_eq!(
            list_keys(header),
            vec![WcsKey::PRIMARY, WcsKey::new('A').unwrap(), WcsKey::ORIGINAL]
        );
    }
    for (name, ver) in [("WCSDVARR", 1), ("WCSDVARR", 4), ("D2IMARR", 1), ("D2IMARR", 3)] {
        let id = ExtensionId::named(name, ver);
        assert_eq!(target.get(&id).unwrap().image(), original.get(&id).unwrap().image());
    }
    assert!(target.find("D2IMARR", 2).is_none());
    assert!(attached_headerlets(&target).unwrap().is_empty());
}

#[test]
fn test_apply_as_primary_archives_unknown_solution() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();
    for ver in 1..=2 {
        target.get_mut(&sci(ver)).unwrap().header.set("WCSNAME", "HAND_TWEAKED");
    }

    headerlet.apply_as_primary(&mut target, true, false).unwrap();
    let header = &target.get(&sci(1)).unwrap().header;
    assert_eq!(header.get_string("WCSNAMEB").as_deref(), Some("HAND_TWEAKED"));
    assert_eq!(header.get_string("WCSNAME").as_deref(), Some("SHIFTED"));
}

#[test]
fn test_apply_as_primary_twice_is_a_no_op() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();

    headerlet.apply_as_primary(&mut target, true, true).unwrap();
    let once = target.clone();
    headerlet.apply_as_primary(&mut target, true, true).unwrap();
    assert_eq!(target, once);
}

#[test]
fn test_reapply_picks_up_changed_distortion() {
    let mut target = common::updated_two_chip();
    shifted_headerlet("shifted").apply_as_primary(&mut target, false, false).unwrap();

    let mut source = shifted_source();
    source.get_mut(&sci(1)).unwrap().header.set("A_0_2", 3.0e-06);
    let refit = Headerlet::create(&source, &CreateOptions::named("shifted")).unwrap();
    refit.apply_as_primary(&mut target, false, false).unwrap();
    let header = &target.get(&sci(1)).unwrap().header;
    assert_eq!(header.get_float("A_0_2"), Some(3.0e-06));

    let table = ExtensionId::named("WCSDVARR", 1);
    let grid = ImageData::new(vec![4, 3], vec![0.5; 12]).unwrap();
    source.get_mut(&table).unwrap().data = HduData::Image(grid.clone());
    let retabled = Headerlet::create(&source, &CreateOptions::named("shifted")).unwrap();
    retabled.apply_as_primary(&mut target, false, false).unwrap();
    assert_eq!(target.get(&table).unwrap().image(), Some(&grid));

    let settled = target.clone();
    retabled.apply_as_primary(&mut target, false, false).unwrap();
    assert_eq!(target, settled);
}

#[test]
fn test_apply_as_alternate_with_key() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();
    let primary_before = common::updated_two_chip();

    let key = headerlet.apply_as_alternate(&mut target, Some("K"), Some("KK"), false).unwrap();
    assert_eq!(key, WcsKey::new('K').unwrap());

    let header = &target.get(&sci(2)).unwrap().header;
    assert_eq!(header.get_string("WCSNAMEK").as_deref(), Some("KK"));
    let diff = DiffOptions {
        key_a: key,
        ..DiffOptions::default()
    };
    assert_matches_headerlet(&target, &headerlet, &diff);

    // the primary solution is untouched
    let ids = [sci(1), sci(2)];
    let (identical, report) = is_identical(&target, &ids, &primary_before, &ids, &DiffOptions::default()).unwrap();
    assert!(identical, "{report}");
}

#[test]
fn test_apply_as_alternate_auto_key() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();

    let key = headerlet.apply_as_alternate(&mut target, None, None, false).unwrap();
    assert_eq!(key, WcsKey::new('B').unwrap());
    let header = &target.get(&sci(1)).unwrap().header;
    assert_eq!(header.get_string("WCSNAMEB").as_deref(), Some("SHIFTED"));
}

#[test]
fn test_apply_as_alternate_rejects_used_and_reserved_keys() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();

    let err = headerlet.apply_as_alternate(&mut target, Some("A"), None, false).unwrap_err();
    assert!(matches!(err, WcsError::KeyCollision { key: 'A', .. }));
    for key in ["O", " "] {
        let err = headerlet.apply_as_alternate(&mut target, Some(key), None, false).unwrap_err();
        assert!(matches!(err, WcsError::Argument { .. }), "{key:?}");
    }
}

#[test]
fn test_apply_as_alternate_rejects_reserved_name() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();
    let before = target.clone();

    let err = headerlet.apply_as_alternate(&mut target, Some("K"), Some("OPUS"), true).unwrap_err();
    assert!(matches!(err, WcsError::Argument { .. }), "{err}");
    assert_eq!(target, before);

    // a package made from the original solution cannot take its name either
    let options = CreateOptions {
        key: Some(WcsKey::ORIGINAL),
        ..CreateOptions::named("opus")
    };
    let original = Headerlet::create(&common::updated_two_chip(), &options).unwrap();
    let err = original.apply_as_alternate(&mut target, None, None, false).unwrap_err();
    assert!(matches!(err, WcsError::Argument { .. }), "{err}");
    assert!(original.apply_as_alternate(&mut target, None, Some("OPUS_COPY"), false).is_ok());
}

#[test]
fn test_apply_to_file_without_matching_extensions() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::simple();
    let err = headerlet.apply_as_primary(&mut target, false, false).unwrap_err();
    assert!(matches!(err, WcsError::Header(_)));
}

// --- Attach and extract ---

#[test]
fn test_attach_and_extract() {
    let headerlet = shifted_headerlet("shifted");
    let mut target = common::updated_two_chip();

    headerlet.apply_as_primary(&mut target, false, true).unwrap();
    assert_eq!(target.indices_named(HDRLET).len(), 1);
    assert!(!headerlet.attach_to(&mut target).unwrap());

    let other = Headerlet::create(&common::updated_two_chip(), &CreateOptions::named("current")).unwrap();
    assert!(other.attach_to(&mut target).unwrap());

    let attached = attached_headerlets(&target).unwrap();
    let names: Vec<&str> = attached.iter().map(Headerlet::name).collect();
    assert_eq!(names, vec!["shifted", "current"]);

    let hdrlet = &target.hdus()[target.indices_named(HDRLET)[0]];
    assert_eq!(hdrlet.header.get_string("DISTNAME").as_deref(), headerlet.distname());

    assert_eq!(extract_headerlet(&target, "current").unwrap(), other);
    let err = extract_headerlet(&target, "missing").unwrap_err();
    assert!(matches!(err, WcsError::Argument { .. }));
}

// --- Files ---

#[test]
fn test_headerlet_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let source = common::write(dir.path(), "j94f05bgq_flt.json", &common::updated_two_chip());

    let headerlet = Headerlet::create_from_file(&source, &CreateOptions::named("hdr1")).unwrap();
    let hlet_path = dir.path().join("hdr1_hlt.json");
    headerlet.write_to(&hlet_path).unwrap();
    assert_eq!(Headerlet::open(&hlet_path).unwrap(), headerlet);
}

#[test]
fn test_apply_to_file() {
    let dir = TempDir::new().unwrap();
    let path = common::write(dir.path(), "j94f05bgq_flt.json", &common::updated_two_chip());
    let headerlet = shifted_headerlet("shifted");

    headerlet.apply_as_primary_file(&path, true, true).unwrap();
    let key = headerlet.apply_as_alternate_file(&path, None, Some("AGAIN"), false).unwrap();
    assert_eq!(key, WcsKey::new('B').unwrap());

    let target = HduList::open(&path, OpenMode::ReadOnly).unwrap();
    assert_matches_headerlet(&target, &headerlet, &DiffOptions::default());
    assert_eq!(attached_headerlets(&target).unwrap().len(), 1);
    let header = &target.get(&sci(1)).unwrap().header;
    assert_eq!(header.get_string("WCSNAMEB").as_deref(), Some("AGAIN"));
}

#[test]
fn test_not_a_headerlet() {
    let err = Headerlet::from_hdu_list(common::updated_two_chip()).unwrap_err();
    assert!(matches!(err, WcsError::MissingKeyword { .. }));
}
