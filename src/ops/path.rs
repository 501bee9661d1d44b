use crate::consts::InodePointer;
use crate::driver::DeviceDriver;
use crate::ops::directory::Directory;
use crate::structure::Structure;
use crate::util::error::{FsError, Result};

/// Splits an absolute path into its non-empty components.
pub fn components(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(FsError::invalid_argument(format!("path {:?} is not absolute", path)));
    }
    Ok(path.split('/').filter(|component| !component.is_empty()).collect())
}

/// Walks `components` from the root. Every inode passed through must be a
/// directory.
pub fn walk<A: DeviceDriver>(structure: &Structure<A>, components: &[&str]) -> Result<InodePointer> {
    let mut current = structure.root_inode();
    for component in components {
        let directory = Directory::open(structure, current)?;
        current = directory.lookup(structure, component)?;
    }
    Ok(current)
}

pub fn resolve<A: DeviceDriver>(structure: &Structure<A>, path: &str) -> Result<InodePointer> {
    walk(structure, &components(path)?)
}

/// Resolves everything but the last component, which must name a
/// directory. The root has no parent and comes back with no leaf.
pub fn resolve_parent<'p, A: DeviceDriver>(
    structure: &Structure<A>,
    path: &'p str,
) -> Result<(InodePointer, Option<&'p str>)> {
    let components = components(path)?;
    match components.split_last() {
        None => Ok((structure.root_inode(), None)),
        Some((leaf, parents)) => {
            let parent = walk(structure, parents)?;
            Directory::open(structure, parent)?;
            Ok((parent, Some(*leaf)))
        }
    }
}
