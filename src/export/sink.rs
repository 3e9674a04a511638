use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::AppResult;

/// Destination for generated files.
pub trait ExportSink: Send + Sync {
    fn save(&self, file_name: &str, bytes: &[u8]) -> AppResult<PathBuf>;
}

/// Writes exports into a directory, replacing files with the same name.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DirectorySink {
    fn save(&self, file_name: &str, bytes: &[u8]) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, bytes)?;
        debug!(
            target: "export",
            path = %path.display(),
            bytes = bytes.len(),
            "export written"
        );
        Ok(path)
    }
}
