//! Catalog snapshots: which peer advertises which filenames

use crate::proto::{CatalogEntry, CatalogResponse};
use crate::{PeerAddr, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable snapshot of the Edge's catalog, ordered by peer address
pub type Catalog = BTreeMap<PeerAddr, Vec<String>>;

/// Group name used for files without an extension
pub const NO_EXTENSION: &str = "NO_EXTENSION";

const GROUP_SEPARATOR: &str = "---------------------------";

pub fn to_proto(catalog: &Catalog) -> Vec<CatalogEntry> {
    catalog
        .iter()
        .map(|(addr, filenames)| CatalogEntry {
            address: Some(addr.to_proto()),
            filenames: filenames.clone(),
        })
        .collect()
}

pub fn from_proto(response: CatalogResponse) -> Result<Catalog> {
    let mut catalog = Catalog::new();
    for entry in response.entries {
        let address = entry
            .address
            .as_ref()
            .ok_or_else(|| crate::Error::Protocol("catalog entry without address".to_string()))?;
        catalog.insert(PeerAddr::from_proto(address)?, entry.filenames);
    }
    Ok(catalog)
}

/// Every peer advertising `filename`, lowest address first
pub fn owners_of(catalog: &Catalog, filename: &str) -> Vec<PeerAddr> {
    catalog
        .iter()
        .filter(|(_, filenames)| filenames.iter().any(|f| f == filename))
        .map(|(addr, _)| addr.clone())
        .collect()
}

/// Upper-cased extension of a filename, or [`NO_EXTENSION`]
pub fn extension_group(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_uppercase(),
        _ => NO_EXTENSION.to_string(),
    }
}

/// Render the unique filenames of a catalog grouped by extension
pub fn render_by_extension(catalog: &Catalog) -> String {
    let mut groups: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for filenames in catalog.values() {
        for name in filenames {
            groups
                .entry(extension_group(name))
                .or_default()
                .insert(name.as_str());
        }
    }

    let mut out = String::new();
    for (group, names) in &groups {
        out.push_str(GROUP_SEPARATOR);
        out.push('\n');
        out.push_str(group);
        out.push_str("\n\n");
        for name in names {
            out.push_str(name);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}
