//! Artifact persistence.
//!
//! Workflows hand finished buffers to an [`ArtifactSink`] by name; where they
//! end up is the sink's business.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait ArtifactSink {
    /// Store raw bytes under `name` and return the location written.
    fn write_bytes(&mut self, name: &str, bytes: &[u8]) -> io::Result<PathBuf>;

    /// Store UTF-8 text under `name` and return the location written.
    fn write_text(&mut self, name: &str, text: &str) -> io::Result<PathBuf> {
        self.write_bytes(name, text.as_bytes())
    }
}

impl<S: ArtifactSink + ?Sized> ArtifactSink for &mut S {
    fn write_bytes(&mut self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        (**self).write_bytes(name, bytes)
    }

    fn write_text(&mut self, name: &str, text: &str) -> io::Result<PathBuf> {
        (**self).write_text(name, text)
    }
}

/// Writes artifacts as files into one directory, created on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSink for DirectorySink {
    fn write_bytes(&mut self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }
        let path = self.root.join(name);
        fs::write(&path, bytes)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved artifact");
        Ok(path)
    }
}

/// Keeps artifacts in memory. Names registered with [`MemorySink::fail_on`]
/// fail with a permission error instead.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    artifacts: BTreeMap<String, Vec<u8>>,
    failing: BTreeSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.artifacts.get(name).map(Vec::as_slice)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn names(&self) -> Vec<&str> {
        self.artifacts.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactSink for MemorySink {
    fn write_bytes(&mut self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        if self.failing.contains(name) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("refusing to write {}", name),
            ));
        }
        self.artifacts.insert(name.to_string(), bytes.to_vec());
        Ok(PathBuf::from(name))
    }
}
