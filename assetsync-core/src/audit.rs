use crate::hash::ObjectHash;
use crate::store::LocalStore;
use anyhow::Result;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub ok: u64,
    /// Objects whose content does not hash to their name.
    pub corrupt: Vec<PathBuf>,
    /// Files that are not `<shard>/<hash>` objects at all.
    pub stray: Vec<PathBuf>,
}

enum Verdict {
    Ok,
    Corrupt,
    Stray,
}

fn object_name(path: &Path) -> Option<ObjectHash> {
    let name = path.file_name()?.to_str()?;
    let shard = path.parent()?.file_name()?.to_str()?;
    let hash = ObjectHash::parse(name).ok()?;
    (hash.shard() == shard).then_some(hash)
}

/// Walk `<root>/objects` and recompute every object's digest. Read-only.
pub fn audit_store(store: &LocalStore) -> Result<AuditReport> {
    let dir = store.objects_dir();
    if !dir.exists() {
        return Ok(AuditReport::default());
    }
    let mut files = Vec::new();
    for ent in WalkDir::new(&dir).min_depth(1) {
        let ent = ent?;
        if ent.file_type().is_file() {
            files.push(ent.into_path());
        }
    }

    let verdicts: Vec<(PathBuf, Verdict)> = files
        .into_par_iter()
        .map(|p| {
            let v = match object_name(&p) {
                None => Verdict::Stray,
                Some(h) => match ObjectHash::of_file(&p) {
                    Ok(actual) if actual == h => Verdict::Ok,
                    _ => Verdict::Corrupt,
                },
            };
            (p, v)
        })
        .collect();

    let mut rep = AuditReport::default();
    for (p, v) in verdicts {
        match v {
            Verdict::Ok => rep.ok += 1,
            Verdict::Corrupt => rep.corrupt.push(p),
            Verdict::Stray => rep.stray.push(p),
        }
    }
    rep.corrupt.sort();
    rep.stray.sort();
    Ok(rep)
}
