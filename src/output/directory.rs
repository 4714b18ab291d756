//! Directory-backed page sink

use crate::output::traits::{PageSink, SinkError, SinkResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes each page to `<directory>/<name>`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    /// Creates the sink, creating `directory` if it does not exist
    pub fn new(directory: impl Into<PathBuf>) -> SinkResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl PageSink for DirectorySink {
    fn store(&self, name: &str, body: &str) -> SinkResult<()> {
        // Names are flat; anything that could escape the directory is refused
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name == "."
            || name == ".."
        {
            return Err(SinkError::InvalidName(name.to_string()));
        }

        let path = self.directory.join(name);
        fs::write(&path, body).map_err(|source| SinkError::Write {
            name: name.to_string(),
            source,
        })?;

        tracing::debug!("Saved {} ({} bytes)", path.display(), body.len());
        Ok(())
    }
}
