use crate::logical_path::LogicalPath;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default)]
pub struct PathPolicy {
    pub follow_symlinks: bool,
}

/// Resolve `rel` under the destination `root`, refusing to write through symlinks.
///
/// `LogicalPath` already rules out absolute paths and `..`. Without
/// `follow_symlinks` any existing symlink on the way (ancestors or the target
/// itself) is an error; with it, whatever exists of the path must still
/// canonicalize to somewhere under root.
pub fn validate_dest(root: &Path, rel: &LogicalPath, policy: PathPolicy) -> Result<PathBuf> {
    let candidate = rel.to_fs_path(root);
    if !policy.follow_symlinks {
        let mut cur = root.to_path_buf();
        for seg in rel.segments() {
            cur.push(seg);
            match std::fs::symlink_metadata(&cur) {
                Ok(m) if m.file_type().is_symlink() => {
                    bail!("symlink in path (not following): {:?}", cur);
                }
                Ok(_) => {}
                // nothing below a missing component can be a symlink
                Err(_) => break,
            }
        }
        return Ok(candidate);
    }

    let root_can = std::fs::canonicalize(root)?;
    // deepest existing ancestor decides containment
    let mut probe = candidate.clone();
    while !probe.exists() {
        if !probe.pop() {
            break;
        }
    }
    let probe_can = std::fs::canonicalize(&probe)?;
    if !probe_can.starts_with(&root_can) {
        bail!("path escapes root: {:?}", rel);
    }
    Ok(candidate)
}
