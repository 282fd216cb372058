use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha1::{Digest, Sha1};

/// Content fingerprint of a module image.
pub fn fingerprint(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Size and modification time, checked every poll before anything is read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl Stamp {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Notices when the image at a path has been rebuilt.
///
/// Polling only stats the file. The image is hashed once its stamp has held
/// still for two polls in a row, so a build that is still writing the file
/// is never reported.
#[derive(Debug)]
pub struct ImageWatcher {
    path: PathBuf,
    settled: Option<Stamp>,
    pending: Option<Stamp>,
    last: Option<String>,
}

impl ImageWatcher {
    /// Starts watching from the image's current content.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settled = Stamp::of(&path).ok();
        let last = settled.as_ref().and_then(|_| fingerprint(&path).ok());
        Self {
            path,
            settled,
            pending: None,
            last,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once per content change. A missing image, or one whose
    /// size or mtime moved since the previous poll, is not a change yet.
    pub fn poll(&mut self) -> bool {
        let Ok(stamp) = Stamp::of(&self.path) else {
            self.pending = None;
            return false;
        };
        if self.settled.as_ref() == Some(&stamp) {
            self.pending = None;
            return false;
        }
        if self.pending.as_ref() != Some(&stamp) {
            self.pending = Some(stamp);
            return false;
        }

        self.pending = None;
        let Ok(current) = fingerprint(&self.path) else {
            return false;
        };
        self.settled = Some(stamp);
        let changed = self.last.as_ref().is_some_and(|last| *last != current);
        self.last = Some(current);
        changed
    }
}
