//! Lookup-table extensions (`WCSDVARR`, `D2IMARR`) referenced by distortion
//! payloads.
//!
//! Table versions follow the science extension they serve, so installing the
//! same correction twice replaces the existing table instead of adding one.

use std::collections::BTreeSet;

use celestial_headers::{Hdu, HduList};

use crate::error::WcsResult;
use crate::record::{DistortionKind, DistortionPayload, D2IMARR, WCSDVARR};

/// Version of the table for (`sciver`, `axis`): two per science extension.
pub fn table_extver(sciver: u32, axis: u32) -> u32 {
    2 * sciver.saturating_sub(1) + axis
}

/// Installs `table` as `extname` version `extver`, replacing an existing table
/// with that identity. Returns its index.
pub fn install_table(hdul: &mut HduList, extname: &str, extver: u32, mut table: Hdu) -> usize {
    table.header.set("EXTNAME", extname);
    table.header.set("EXTVER", i64::from(extver));
    hdul.replace_or_push(table)
}

/// Every (`EXTNAME`, `EXTVER`) referenced by any extension's payload.
pub fn referenced_tables(hdul: &HduList) -> BTreeSet<(&'static str, u32)> {
    hdul.iter()
        .flat_map(|hdu| DistortionPayload::read(&hdu.header).table_refs())
        .map(|reference| (reference.extname(), reference.extver))
        .collect()
}

/// Removes table extensions no payload refers to. Returns how many went.
pub fn prune_tables(hdul: &mut HduList) -> WcsResult<usize> {
    let referenced = referenced_tables(hdul);
    let orphans: Vec<usize> = hdul
        .iter()
        .enumerate()
        .filter(|(_, hdu)| {
            [WCSDVARR, D2IMARR].into_iter().any(|name| {
                hdu.is_named(name) && !referenced.contains(&(name, hdu.extver()))
            })
        })
        .map(|(index, _)| index)
        .collect();
    for &index in orphans.iter().rev() {
        hdul.remove(index)?;
        tracing::debug!(index, "removed unreferenced distortion table");
    }
    Ok(orphans.len())
}

/// Strips the payload of `kind` from the given extensions and drops the tables
/// it leaves unreferenced.
pub fn remove_distortion(hdul: &mut HduList, indexes: &[usize], kind: DistortionKind) -> WcsResult<usize> {
    let mut removed = 0;
    for &index in indexes {
        removed += DistortionPayload::strip(&mut hdul.hdu_mut(index)?.header, kind);
    }
    if kind.table_extname().is_some() {
        prune_tables(hdul)?;
    }
    Ok(removed)
}
