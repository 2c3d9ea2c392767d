//! Turns a classification mapping into a concrete plan: a list of copies for
//! flat mode, or a set of bundles (one output archive each) for bundle mode.
//!
//! Bundle depth counts segments of the canonical relative path: with depth 2,
//! `A/B/c.dcm` and `A/B/d.dcm` share the bundle `A_B`, `A/C/e.dcm` does not.

use crate::archive::ArchiveFormat;
use crate::classify::MappingEntry;
use crate::error::Error;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOp {
    pub source: PathBuf,
    pub target: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BundleSpec {
    pub depth: usize,
    pub separator: String,
    pub format: ArchiveFormat,
}

impl BundleSpec {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            separator: "_".to_string(),
            format: ArchiveFormat::Tar,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub key: String,
    pub archive_path: PathBuf,
    pub members: Vec<MappingEntry>,
}

/// Flat mode: one copy per entry, `output_dir/<relative path>`.
///
/// When several sources map to the same target the last one seen wins.
pub fn plan_copies(mapping: &[MappingEntry], output_dir: &Path) -> Vec<CopyOp> {
    let mut by_target: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

    for entry in mapping {
        let target = output_dir.join(entry.relative.to_path_buf());
        if let Some(previous) = by_target.insert(target.clone(), entry.source.clone()) {
            debug!(
                "{} replaces {} as source of {}",
                entry.source.display(),
                previous.display(),
                target.display()
            );
        }
    }

    by_target
        .into_iter()
        .map(|(target, source)| CopyOp { source, target })
        .collect()
}

/// Bundle mode: group entries by their first `spec.depth` path segments.
///
/// Entries sharing a relative path are all kept. Bundles are ordered by key,
/// members by internal name.
pub fn plan_bundles(
    mapping: &[MappingEntry],
    output_dir: &Path,
    spec: &BundleSpec,
) -> Result<Vec<Bundle>, Error> {
    if spec.depth == 0 {
        return Err(Error::InvalidDepth(spec.depth));
    }

    let mut groups: BTreeMap<String, Vec<MappingEntry>> = BTreeMap::new();
    for entry in mapping {
        let key = entry.relative.prefix(spec.depth).join(spec.separator.as_str());
        groups.entry(key).or_default().push(entry.clone());
    }

    let bundles = groups
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by(|a, b| a.relative.cmp(&b.relative));
            Bundle {
                archive_path: output_dir.join(format!("{}{}", key, spec.format.suffix())),
                key,
                members,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        "Planned {} bundles for {} entries at depth {}",
        bundles.len(),
        mapping.len(),
        spec.depth
    );
    Ok(bundles)
}

/// Distinct `output_dir/<first segment>` directories, in first-seen order.
pub fn top_level_dirs(mapping: &[MappingEntry], output_dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in mapping {
        if let Some(first) = entry.relative.segments().first() {
            let dir = output_dir.join(first);
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}
