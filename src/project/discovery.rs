use std::path::{Path, PathBuf};

use super::ProjectError;

/// Manifest names probed in each directory, in priority order.
pub const DEFAULT_FILENAMES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yml",
    "docker-compose.yaml",
];

/// Find the project manifest in `start` or the nearest ancestor that has one.
///
/// Returns the manifest followed by its `*.override.*` sibling when present.
pub fn find_config_files(start: &Path) -> Result<Vec<PathBuf>, ProjectError> {
    for dir in start.ancestors() {
        for name in DEFAULT_FILENAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                let mut files = vec![candidate.clone()];
                if let Some(over) = override_for(&candidate).filter(|p| p.is_file()) {
                    files.push(over);
                }
                return Ok(files);
            }
        }
    }
    Err(ProjectError::NoConfigFile {
        dir: start.to_path_buf(),
    })
}

/// `compose.yaml` -> `compose.override.yaml`.
fn override_for(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?;
    Some(path.with_file_name(format!("{stem}.override.{ext}")))
}

/// Resolve user-supplied manifest paths against `base`, failing on missing files.
pub fn resolve_config_paths(base: &Path, paths: &[PathBuf]) -> Result<Vec<PathBuf>, ProjectError> {
    paths
        .iter()
        .map(|p| {
            let absolute = if p.is_absolute() { p.clone() } else { base.join(p) };
            if absolute.is_file() {
                Ok(absolute)
            } else {
                Err(ProjectError::Io {
                    path: absolute,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                })
            }
        })
        .collect()
}
