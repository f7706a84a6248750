use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use shelf_common::api::Document;
use shelf_common::config::SurfaceConfig;

/// Where documents go when the user downloads or previews them.
///
/// A download offers the original bytes under the stored display name, one
/// document per call. A preview hands the bytes to whatever renders PDFs on
/// the host; the library never renders pages itself.
pub trait Surface {
    fn download(&self, doc: &Document) -> Result<()>;
    fn preview(&self, doc: &Document) -> Result<()>;
}

/// Writes downloads into one directory and stages previews in another.
#[derive(Debug, Clone)]
pub struct DirectorySurface {
    download_dir: PathBuf,
    preview_dir: PathBuf,
}

impl DirectorySurface {
    pub fn new(download_dir: impl Into<PathBuf>, preview_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            preview_dir: preview_dir.into(),
        }
    }

    pub fn from_config(cfg: &SurfaceConfig) -> Self {
        Self::new(cfg.download_dir(), cfg.preview_dir())
    }

    /// Write `doc` into the download directory; returns the path written.
    pub fn write_download(&self, doc: &Document) -> Result<PathBuf> {
        let path = write_unique(&self.download_dir, &doc.name, &doc.payload)?;
        info!("downloaded {} to {}", doc.name, path.display());
        Ok(path)
    }

    /// Stage `doc` for an external viewer; returns the path to open.
    pub fn write_preview(&self, doc: &Document) -> Result<PathBuf> {
        // One subdirectory per document keeps the display name intact.
        let dir = self.preview_dir.join(doc.id.as_str());
        let path = dir.join(sanitize_file_name(&doc.name));
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        std::fs::write(&path, &doc.payload[..]).with_context(|| format!("writing {}", path.display()))?;
        info!("preview of {} staged at {}", doc.name, path.display());
        Ok(path)
    }
}

impl Surface for DirectorySurface {
    fn download(&self, doc: &Document) -> Result<()> {
        self.write_download(doc).map(|_| ())
    }

    fn preview(&self, doc: &Document) -> Result<()> {
        self.write_preview(doc).map(|_| ())
    }
}

/// Reduce a display name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = last
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "document.pdf".into()
    } else {
        cleaned.to_string()
    }
}

/// Write `bytes` as `dir/name`, or `dir/stem (n).ext` if that name is taken.
fn write_unique(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let name = sanitize_file_name(name);
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name.as_str(), ""),
    };

    for n in 0u32.. {
        let candidate = if n == 0 {
            dir.join(&name)
        } else {
            dir.join(format!("{stem} ({n}){ext}"))
        };
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => {
                write_or_remove(file, &candidate, bytes)?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).with_context(|| format!("creating {}", candidate.display())),
        }
    }
    bail!("no free file name for {name} in {}", dir.display())
}

/// Write `bytes` to the freshly created `path`; on failure the partial file
/// is deleted so no truncated download is left behind.
fn write_or_remove<W: Write>(mut out: W, path: &Path, bytes: &[u8]) -> Result<()> {
    if let Err(e) = out.write_all(bytes).and_then(|()| out.flush()) {
        drop(out);
        if let Err(rm) = std::fs::remove_file(path) {
            warn!("could not remove partial file {}: {rm}", path.display());
        }
        return Err(e).with_context(|| format!("writing {}", path.display()));
    }
    Ok(())
}
