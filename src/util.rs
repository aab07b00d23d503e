use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path};
use url::Url;

pub fn open(path: &Path, kind: &str) -> Result<File> {
    match File::open(path) {
        Err(e) => Err(anyhow!("Opening {} file `{}`: {}", kind, path.display(), e)),
        Ok(file) => Ok(file),
    }
}

/// Appends `segments` to the path of `base`, which is treated as a directory.
/// Each segment is percent-encoded, so characters like `#` and `?` stay part
/// of the path instead of starting a fragment or query.
pub fn join_segments<'a>(
    base: &Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, url::ParseError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Joins a filesystem path relative to some root onto `base`, one URL path
/// segment per normal path component. This keeps URLs independent of where
/// the root lives on disk.
pub fn join_path(base: &Url, relative: &Path) -> Result<Url, url::ParseError> {
    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    join_segments(base, segments.iter().map(String::as_str))
}

/// Writes `contents` to `path` so that readers only ever observe the old file
/// or the complete new one. The temporary file is created next to `path` to
/// keep the final rename on a single filesystem.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::Builder::new()
        .prefix(".pagewright-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Recursively removes `dir`. A directory that doesn't exist is already
/// removed, so [`io::ErrorKind::NotFound`] is not an error.
pub fn rmdir(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
