use crate::logical_path::LogicalPath;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Include/exclude globs over logical paths. No includes means "everything".
#[derive(Clone, Debug, Default)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

fn build(globs: &[String]) -> Result<Option<GlobSet>, globset::Error> {
    if globs.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for g in globs {
        b.add(Glob::new(g)?);
    }
    Ok(Some(b.build()?))
}

impl PathFilter {
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self, globset::Error> {
        Ok(Self { include: build(includes)?, exclude: build(excludes)? })
    }

    pub fn allows(&self, path: &LogicalPath) -> bool {
        let p = path.as_str();
        self.include.as_ref().map_or(true, |s| s.is_match(p))
            && !self.exclude.as_ref().is_some_and(|s| s.is_match(p))
    }
}
