//! Path validation
//!
//! Confines untrusted client paths to the shared root. Resolution is lexical
//! first (`.`/`..` collapsed without touching the disk), then the result is
//! canonicalized so symbolic links cannot carry a path outside the root.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// The directory tree exposed to clients.
///
/// Holds the canonical form of the root, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct SharedRoot {
    path: PathBuf,
}

impl SharedRoot {
    /// Canonicalize `path` and make sure it is a directory.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().canonicalize()?;
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", path.display()),
            ));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a client path to an absolute path inside the root.
    ///
    /// An empty request is the root itself. A leading separator does not make
    /// the request absolute; it is still taken relative to the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, PathError> {
        let segments = normalize_segments(requested)?;
        if segments.is_empty() {
            return Ok(self.path.clone());
        }

        let joined = segments
            .iter()
            .fold(self.path.clone(), |acc, segment| acc.join(segment));

        let canonical =
            canonicalize_existing(&joined).map_err(|source| PathError::Canonicalize {
                path: requested.to_string(),
                source,
            })?;

        // Component-wise: `/shared-evil` never matches `/shared`.
        if canonical.starts_with(&self.path) {
            Ok(canonical)
        } else {
            Err(PathError::Traversal(requested.to_string()))
        }
    }

    /// Client-facing form of a resolved path: relative, `/`-separated,
    /// empty for the root.
    pub fn client_path(&self, resolved: &Path) -> Option<String> {
        let relative = resolved.strip_prefix(&self.path).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

/// Split a client path into plain segments, collapsing `.` and `..`.
///
/// Both `/` and `\` act as separators. Climbing above the root is rejected
/// here, before anything is joined.
pub fn normalize_segments(requested: &str) -> Result<Vec<String>, PathError> {
    if requested.contains('\0') {
        return Err(PathError::Malformed(requested.replace('\0', "\\0")));
    }

    let unified = requested.trim().replace('\\', "/");
    let mut segments: Vec<String> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Traversal(requested.to_string()));
                }
            }
            name => {
                // Drive prefixes and the like must not survive as a segment.
                let mut components = Path::new(name).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => segments.push(name.to_string()),
                    _ => return Err(PathError::Malformed(requested.to_string())),
                }
            }
        }
    }

    Ok(segments)
}

/// Canonicalize the deepest existing ancestor of `path` and re-attach the
/// missing tail, so targets that do not exist yet can still be checked.
fn canonicalize_existing(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut tail: Vec<OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                return Ok(tail
                    .iter()
                    .rev()
                    .fold(canonical, |acc, name| acc.join(name)));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if existing.symlink_metadata().is_ok() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("dangling symbolic link: {}", existing.display()),
                    ));
                }
                let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
                    return Err(e);
                };
                tail.push(name.to_os_string());
                existing = parent;
            }
            Err(e) => return Err(e),
        }
    }
}
