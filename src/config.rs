use std::path::PathBuf;

/// Configuration for the log index engine.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory holding the index files.
    pub dir: PathBuf,

    /// Compression level for finalized runs, 0-9 (default: 6).
    pub compression_level: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logdex"),
            compression_level: 6,
        }
    }
}

impl IndexConfig {
    /// Create a new config with the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the compression level for finalized runs
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }
}
