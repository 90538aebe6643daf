//! Headerlets: portable snapshots of the active WCS of a file.
//!
//! A headerlet is itself an extension list. Its primary header names the
//! solution (`HDRNAME`) and the distortion model it was computed with; each
//! `SIPWCS` extension carries the record and distortion payload of one science
//! extension together with the identity of that extension (`TG_ENAME`,
//! `TG_EVER`). Lookup tables the payloads refer to travel along as
//! `WCSDVARR`/`D2IMARR` extensions.
//!
//! Applying a headerlet checks the distortion model against the target first;
//! nothing in the target changes when the check fails.

use std::collections::HashMap;
use std::path::Path;

use celestial_headers::{ExtensionId, Hdu, HduData, HduList, Header, Keyword, OpenMode};

use crate::altwcs::{next_key, ORIGINAL_NAME};
use crate::error::{WcsError, WcsResult};
use crate::header::KeywordProvider;
use crate::keys::{KeyIndex, WcsKey};
use crate::record::{DistortionKind, DistortionPayload, WcsRecord};
use crate::select::{extension_label, ExtSelection};
use crate::tables::{install_table, prune_tables, table_extver};

pub const SIPWCS: &str = "SIPWCS";
pub const HDRLET: &str = "HDRLET";
/// Placeholder for a distortion component that is not part of the model.
pub const NO_MODEL: &str = "NOMODEL";
const PRIMARY_TARGET: &str = "PRIMARY";

/// Reference file name without any `prefix$` or directory part.
pub fn model_basename(name: &str) -> &str {
    let name = name.rsplit('$').next().unwrap_or(name);
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Same keywords and values, in any order.
fn same_cards(a: &DistortionPayload, b: &DistortionPayload) -> bool {
    a.keywords().len() == b.keywords().len()
        && a.keywords().iter().all(|card| {
            b.keywords()
                .iter()
                .any(|other| other.name == card.name && other.value == card.value)
        })
}

/// Treats `N/A`, `NOMODEL` and blank values as "no model".
fn model_value(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("N/A") && v != NO_MODEL)
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub extensions: ExtSelection,
    /// Solution taken from each extension; primary by default.
    pub key: Option<WcsKey>,
    pub hdrname: Option<String>,
    pub destim: Option<String>,
    pub sipname: Option<String>,
    pub npolfile: Option<String>,
    pub d2imfile: Option<String>,
    pub author: Option<String>,
    pub descrip: Option<String>,
}

impl CreateOptions {
    pub fn named(hdrname: impl Into<String>) -> Self {
        Self {
            hdrname: Some(hdrname.into()),
            ..Self::default()
        }
    }

    pub fn extensions(mut self, extensions: impl Into<ExtSelection>) -> Self {
        self.extensions = extensions.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Headerlet {
    hdul: HduList,
}

impl Headerlet {
    pub fn create(source: &HduList, options: &CreateOptions) -> WcsResult<Self> {
        let indexes = options.extensions.resolve(source)?;
        let key = options.key.unwrap_or(WcsKey::PRIMARY);
        let primary = &source.hdu(0)?.header;
        if options.hdrname.is_none() {
            for &index in &indexes {
                let header = &source.hdu(index)?.header;
                let named = ["HDRNAME", "WCSNAME"]
                    .iter()
                    .any(|base| header.get_string(&key.keyword(base)).is_some_and(|v| !v.trim().is_empty()));
                if !named {
                    return Err(WcsError::missing_name(extension_label(source, index)));
                }
            }
        }
        let first_index = indexes[0];
        let first = &source.hdu(first_index)?.header;

        let first_record = WcsRecord::read(first, key)
            .ok_or_else(|| WcsError::key_not_found(key.as_char(), extension_label(source, first_index)))?;
        let hdrname = options
            .hdrname
            .clone()
            .or_else(|| first.get_string(&key.keyword("HDRNAME")))
            .or_else(|| first_record.name().map(str::to_string))
            .ok_or_else(|| WcsError::missing_name(extension_label(source, first_index)))?;

        let first_payload = DistortionPayload::read(first);
        let model = |kind: DistortionKind, given: &Option<String>, file_keyword: &str| -> String {
            if let Some(given) = given {
                return given.clone();
            }
            if !first_payload.has(kind) {
                return NO_MODEL.to_string();
            }
            model_value(first.get_string(kind.identity_keyword()))
                .or_else(|| model_value(primary.get_string(file_keyword)))
                .unwrap_or_else(|| NO_MODEL.to_string())
        };
        let sipname = model(DistortionKind::Sip, &options.sipname, "SIPNAME");
        let npolfile = model(DistortionKind::Lookup, &options.npolfile, "NPOLFILE");
        let d2imfile = model(DistortionKind::Det2Im, &options.d2imfile, "D2IMFILE");
        let distname = format!(
            "{}-{}-{}",
            model_basename(&sipname),
            model_basename(&npolfile),
            model_basename(&d2imfile)
        );
        let destim = options
            .destim
            .clone()
            .or_else(|| primary.get_string("ROOTNAME"))
            .or_else(|| {
                source
                    .path()
                    .and_then(|p| p.file_stem())
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let mut header = Hdu::primary().header;
        header.add_keyword(Keyword::string("HDRNAME", hdrname.as_str()).with_comment("Headerlet name"));
        header.add_keyword(Keyword::string(
            "WCSNAME",
            first_record.name().unwrap_or(hdrname.as_str()),
        ));
        header.add_keyword(Keyword::string("DESTIM", destim).with_comment("Destination observation root name"));
        header.add_keyword(Keyword::string("SIPNAME", sipname));
        header.add_keyword(Keyword::string("NPOLFILE", npolfile));
        header.add_keyword(Keyword::string("D2IMFILE", d2imfile));
        header.add_keyword(Keyword::string("DISTNAME", distname));
        header.add_keyword(Keyword::string(
            "IDCTAB",
            primary.get_string("IDCTAB").unwrap_or_else(|| "N/A".to_string()),
        ));
        header.add_keyword(Keyword::string(
            "UPWCSVER",
            primary
                .get_string("UPWCSVER")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        ));
        header.add_keyword(Keyword::string("AUTHOR", options.author.clone().unwrap_or_default()));
        header.add_keyword(Keyword::string("DESCRIP", options.descrip.clone().unwrap_or_default()));
        header.add_keyword(Keyword::string(
            "DATE",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        ));

        let mut hdul = HduList::from_hdus(vec![Hdu::new(header)]);
        let mut embedded: HashMap<(&'static str, u32), u32> = HashMap::new();

        for (ordinal, &index) in indexes.iter().enumerate() {
            let hdu = source.hdu(index)?;
            let record = WcsRecord::read(&hdu.header, key)
                .ok_or_else(|| WcsError::key_not_found(key.as_char(), extension_label(source, index)))?;
            let mut payload = DistortionPayload::read(&hdu.header);

            for reference in payload.table_refs() {
                let identity = (reference.extname(), reference.extver);
                let extver = match embedded.get(&identity) {
                    Some(&extver) => extver,
                    None => {
                        let table_index = source.find(identity.0, identity.1).ok_or_else(|| {
                            WcsError::model_mismatch(format!(
                                "{} references missing table ('{}', {})",
                                extension_label(source, index),
                                identity.0,
                                identity.1
                            ))
                        })?;
                        let extver = hdul.max_extver(identity.0) + 1;
                        install_table(&mut hdul, identity.0, extver, source.hdu(table_index)?.clone());
                        embedded.insert(identity, extver);
                        extver
                    }
                };
                payload.renumber(reference.kind, reference.axis, extver);
            }

            let mut sipwcs = Hdu::extension(SIPWCS, ordinal as u32 + 1);
            record.write(&mut sipwcs.header, WcsKey::PRIMARY);
            payload.replace(&mut sipwcs.header);
            sipwcs.header.set("TG_ENAME", hdu.extname().unwrap_or(PRIMARY_TARGET));
            sipwcs.header.set("TG_EVER", i64::from(hdu.extver()));
            hdul.push(sipwcs);
        }

        tracing::debug!(hdrname = %hdrname, extensions = indexes.len(), tables = embedded.len(), "created headerlet");
        Ok(Self { hdul })
    }

    pub fn create_from_file<P: AsRef<Path>>(path: P, options: &CreateOptions) -> WcsResult<Self> {
        let source = HduList::open(path, OpenMode::ReadOnly)?;
        Self::create(&source, options)
    }

    /// Wraps an extension list that has the headerlet layout.
    pub fn from_hdu_list(hdul: HduList) -> WcsResult<Self> {
        let primary = &hdul.hdu(0)?.header;
        if primary.get_string("HDRNAME").is_none() {
            return Err(WcsError::missing_keyword("HDRNAME"));
        }
        if hdul.indices_named(SIPWCS).is_empty() {
            return Err(WcsError::argument("headerlet has no SIPWCS extension"));
        }
        Ok(Self { hdul })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> WcsResult<Self> {
        Self::from_hdu_list(HduList::open(path, OpenMode::ReadOnly)?.detached())
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> WcsResult<()> {
        self.hdul.write_to(path)?;
        Ok(())
    }

    pub fn hdu_list(&self) -> &HduList {
        &self.hdul
    }

    pub fn into_hdu_list(self) -> HduList {
        self.hdul
    }

    fn primary_header(&self) -> &Header {
        &self.hdul.hdus()[0].header
    }

    fn primary_string(&self, keyword: &str) -> Option<&str> {
        self.primary_header().get_keyword_value(keyword)?.as_string()
    }

    pub fn name(&self) -> &str {
        self.primary_string("HDRNAME").unwrap_or_default()
    }

    pub fn wcsname(&self) -> Option<&str> {
        self.primary_string("WCSNAME")
    }

    pub fn destim(&self) -> Option<&str> {
        self.primary_string("DESTIM")
    }

    pub fn distname(&self) -> Option<&str> {
        self.primary_string("DISTNAME")
    }

    /// Model identity this headerlet was built for, by payload kind.
    pub fn model(&self, kind: DistortionKind) -> Option<String> {
        let keyword = match kind {
            DistortionKind::Sip => "SIPNAME",
            DistortionKind::Lookup => "NPOLFILE",
            DistortionKind::Det2Im => "D2IMFILE",
        };
        model_value(self.primary_string(keyword).map(str::to_string))
            .map(|v| model_basename(&v).to_string())
    }

    /// Pairs each `SIPWCS` extension with the target extension it describes.
    fn resolve_targets(&self, target: &HduList) -> WcsResult<Vec<(usize, usize)>> {
        let mut pairs = Vec::new();
        for sipwcs in self.hdul.indices_named(SIPWCS) {
            let header = &self.hdul.hdu(sipwcs)?.header;
            let ename = header.get_string("TG_ENAME").unwrap_or_else(|| PRIMARY_TARGET.to_string());
            let ever = header.get_int("TG_EVER").unwrap_or(1);
            let id = if ename == PRIMARY_TARGET {
                ExtensionId::Index(0)
            } else {
                ExtensionId::named(ename, u32::try_from(ever).unwrap_or(1))
            };
            pairs.push((sipwcs, target.index_of(&id)?));
        }
        Ok(pairs)
    }

    /// Rejects a target whose recorded distortion model differs from this one,
    /// or a headerlet that does not carry the tables it names.
    fn check_model(&self, target: &HduList, pairs: &[(usize, usize)]) -> WcsResult<()> {
        for kind in DistortionKind::ALL {
            let ours = self.model(kind);
            for &(_, index) in pairs {
                let header = &target.hdu(index)?.header;
                let theirs = model_value(header.get_string(kind.identity_keyword()))
                    .map(|v| model_basename(&v).to_string());
                match (&theirs, &ours) {
                    (Some(t), Some(o)) if t != o => {}
                    (Some(_), None) => {}
                    _ => continue,
                }
                return Err(WcsError::model_mismatch(format!(
                    "{} of {} is {:?} but headerlet '{}' was built for {:?}",
                    kind.identity_keyword(),
                    extension_label(target, index),
                    theirs.unwrap_or_default(),
                    self.name(),
                    ours.unwrap_or_else(|| NO_MODEL.to_string())
                )));
            }

            if kind.table_extname().is_some() && ours.is_some() {
                let embeds = pairs.iter().any(|&(sipwcs, _)| {
                    self.hdul
                        .hdu(sipwcs)
                        .map(|hdu| DistortionPayload::read(&hdu.header).has(kind))
                        .unwrap_or(false)
                });
                if !embeds {
                    return Err(WcsError::model_mismatch(format!(
                        "headerlet '{}' names {:?} but carries no such correction",
                        self.name(),
                        ours.unwrap_or_default()
                    )));
                }
            }
        }

        for &(sipwcs, _) in pairs {
            for reference in DistortionPayload::read(&self.hdul.hdu(sipwcs)?.header).table_refs() {
                if self.hdul.find(reference.extname(), reference.extver).is_none() {
                    return Err(WcsError::model_mismatch(format!(
                        "headerlet '{}' does not embed table ('{}', {})",
                        self.name(),
                        reference.extname(),
                        reference.extver
                    )));
                }
            }
        }
        Ok(())
    }

    fn record(&self, sipwcs: usize) -> WcsResult<WcsRecord> {
        WcsRecord::read(&self.hdul.hdu(sipwcs)?.header, WcsKey::PRIMARY)
            .ok_or_else(|| WcsError::key_not_found(' ', extension_label(&self.hdul, sipwcs)))
    }

    fn warn_on_destination(&self, target: &HduList) {
        let rootname = target.primary().and_then(|hdu| hdu.header.get_string("ROOTNAME"));
        if let (Some(destim), Some(rootname)) = (self.destim(), rootname) {
            if destim != rootname {
                tracing::warn!(hdrname = self.name(), destim, rootname = %rootname, "headerlet was made for a different observation");
            }
        }
    }

    /// Makes this headerlet the primary solution of `target`.
    pub fn apply_as_primary(&self, target: &mut HduList, archive_old: bool, attach: bool) -> WcsResult<()> {
        if !target.is_writable() {
            return Err(WcsError::argument("file is not open for update"));
        }
        let pairs = self.resolve_targets(target)?;
        self.check_model(target, &pairs)?;

        let mut current = true;
        for &(sipwcs, index) in &pairs {
            current &= self.is_applied(target, sipwcs, index)?;
        }
        if current {
            tracing::info!(hdrname = self.name(), "headerlet already applied");
            return Ok(());
        }
        self.warn_on_destination(target);

        for &(sipwcs, index) in &pairs {
            let record = self.record(sipwcs)?;
            if archive_old {
                self.archive_current(target, index)?;
            }

            let sciver = target.hdu(index)?.extver();
            let mut payload = DistortionPayload::read(&self.hdul.hdu(sipwcs)?.header);
            for reference in payload.table_refs() {
                let table = self
                    .hdul
                    .find(reference.extname(), reference.extver)
                    .map(|i| self.hdul.hdus()[i].clone())
                    .ok_or_else(|| WcsError::model_mismatch("embedded table disappeared"))?;
                let extver = table_extver(sciver, reference.axis);
                install_table(target, reference.extname(), extver, table);
                payload.renumber(reference.kind, reference.axis, extver);
            }

            let header = &mut target.hdu_mut(index)?.header;
            record.replace(header, WcsKey::PRIMARY);
            payload.replace(header);
            header.set("HDRNAME", self.name());
            tracing::debug!(extension = %extension_label(target, index), hdrname = self.name(), "applied headerlet as primary");
        }
        prune_tables(target)?;

        if attach {
            self.attach_to(target)?;
        }
        Ok(())
    }

    /// Whether extension `index` of `target` already carries the solution of
    /// `sipwcs`: same name, record, payload and table contents.
    fn is_applied(&self, target: &HduList, sipwcs: usize, index: usize) -> WcsResult<bool> {
        let hdu = target.hdu(index)?;
        if hdu.header.get_string("HDRNAME").as_deref() != Some(self.name()) {
            return Ok(false);
        }
        let record = self.record(sipwcs)?;
        if !WcsRecord::read(&hdu.header, WcsKey::PRIMARY).is_some_and(|primary| primary.same_values(&record)) {
            return Ok(false);
        }

        let sciver = hdu.extver();
        let packaged = DistortionPayload::read(&self.hdul.hdu(sipwcs)?.header);
        let mut expected = packaged.clone();
        for reference in packaged.table_refs() {
            let extver = table_extver(sciver, reference.axis);
            expected.renumber(reference.kind, reference.axis, extver);

            let embedded = self
                .hdul
                .find(reference.extname(), reference.extver)
                .and_then(|i| self.hdul.hdus()[i].image());
            let installed = target
                .find(reference.extname(), extver)
                .and_then(|i| target.hdus()[i].image());
            if embedded != installed {
                return Ok(false);
            }
        }
        Ok(same_cards(&expected, &DistortionPayload::read(&hdu.header)))
    }

    /// Archives the current primary of `index` under the next free key unless
    /// its name is already archived.
    fn archive_current(&self, target: &mut HduList, index: usize) -> WcsResult<()> {
        let header = &target.hdu(index)?.header;
        let registry = KeyIndex::scan(header);
        let Some(mut current) = registry.get(WcsKey::PRIMARY).cloned() else {
            return Ok(());
        };
        let name = current
            .name()
            .map(str::to_string)
            .or_else(|| header.get_string("HDRNAME"));
        if let Some(name) = &name {
            let archived = registry
                .keys()
                .into_iter()
                .any(|key| !key.is_primary() && registry.name(key) == Some(name.as_str()));
            if archived {
                return Ok(());
            }
            current.set_name(name);
        }
        let key = next_key(target, index)?;
        current.replace(&mut target.hdu_mut(index)?.header, key);
        tracing::debug!(extension = %extension_label(target, index), key = %key, "archived previous primary");
        Ok(())
    }

    /// Writes this headerlet as an alternate solution. Returns the key used.
    pub fn apply_as_alternate(
        &self,
        target: &mut HduList,
        key: Option<&str>,
        name: Option<&str>,
        attach: bool,
    ) -> WcsResult<WcsKey> {
        if !target.is_writable() {
            return Err(WcsError::argument("file is not open for update"));
        }
        let pairs = self.resolve_targets(target)?;
        self.check_model(target, &pairs)?;

        let key = match key {
            Some(key) => {
                let key: WcsKey = key.parse()?;
                if key.is_primary() || key.is_reserved() {
                    return Err(WcsError::argument(format!(
                        "'{key}' cannot hold an alternate headerlet solution"
                    )));
                }
                for &(_, index) in &pairs {
                    if KeyIndex::scan(&target.hdu(index)?.header).contains(key) {
                        return Err(WcsError::key_collision(key.as_char(), extension_label(target, index)));
                    }
                }
                key
            }
            None => {
                let mut registries = Vec::with_capacity(pairs.len());
                for &(_, index) in &pairs {
                    registries.push(KeyIndex::scan(&target.hdu(index)?.header));
                }
                WcsKey::alternates()
                    .find(|key| !key.is_reserved() && registries.iter().all(|r| !r.contains(*key)))
                    .ok_or_else(|| WcsError::key_exhausted(extension_label(target, pairs[0].1)))?
            }
        };
        let name = name
            .map(str::to_string)
            .or_else(|| self.wcsname().map(str::to_string))
            .unwrap_or_else(|| self.name().to_string());
        if name == ORIGINAL_NAME {
            return Err(WcsError::argument(format!(
                "name '{ORIGINAL_NAME}' is reserved for the original solution"
            )));
        }

        for &(sipwcs, index) in &pairs {
            let mut record = self.record(sipwcs)?;
            record.set_name(&name);
            record.replace(&mut target.hdu_mut(index)?.header, key);
            tracing::debug!(extension = %extension_label(target, index), key = %key, name = %name, "applied headerlet as alternate");
        }
        if attach {
            self.attach_to(target)?;
        }
        Ok(key)
    }

    /// Appends this headerlet as an `HDRLET` extension unless one with the
    /// same name is attached already.
    pub fn attach_to(&self, target: &mut HduList) -> WcsResult<bool> {
        let attached = target
            .indices_named(HDRLET)
            .into_iter()
            .any(|index| target.hdus()[index].header.get_string("HDRNAME").as_deref() == Some(self.name()));
        if attached {
            return Ok(false);
        }
        let extver = target.max_extver(HDRLET) + 1;
        let mut hdu = Hdu::extension(HDRLET, extver).with_data(HduData::Nested(Box::new(self.hdul.detached())));
        hdu.header.set("HDRNAME", self.name());
        if let Some(distname) = self.distname() {
            hdu.header.set("DISTNAME", distname);
        }
        target.push(hdu);
        Ok(true)
    }

    pub fn apply_as_primary_file<P: AsRef<Path>>(&self, path: P, archive_old: bool, attach: bool) -> WcsResult<()> {
        HduList::with_update(path, |target| self.apply_as_primary(target, archive_old, attach))
    }

    pub fn apply_as_alternate_file<P: AsRef<Path>>(
        &self,
        path: P,
        key: Option<&str>,
        name: Option<&str>,
        attach: bool,
    ) -> WcsResult<WcsKey> {
        HduList::with_update(path, |target| self.apply_as_alternate(target, key, name, attach))
    }
}

/// Every headerlet attached to `target`, in file order.
pub fn attached_headerlets(target: &HduList) -> WcsResult<Vec<Headerlet>> {
    target
        .indices_named(HDRLET)
        .into_iter()
        .filter_map(|index| target.hdus()[index].nested().cloned())
        .map(Headerlet::from_hdu_list)
        .collect()
}

/// The attached headerlet called `hdrname`.
pub fn extract_headerlet(target: &HduList, hdrname: &str) -> WcsResult<Headerlet> {
    attached_headerlets(target)?
        .into_iter()
        .find(|headerlet| headerlet.name() == hdrname)
        .ok_or_else(|| WcsError::argument(format!("no headerlet named '{hdrname}' is attached")))
}
