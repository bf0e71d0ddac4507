//! Per-run scratch directory.
//!
//! Each diagnostic run owns one scratch directory used to materialize
//! intermediate artifacts for the external tools. The directory is created
//! before the first stage runs, is never reused across runs, and is removed
//! when the owning guard drops at run end.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Name of the Markdown file materialized for the converter.
pub const INPUT_MARKDOWN: &str = "input.md";

/// Name of the TeX file the converter writes.
pub const GENERATED_TEX: &str = "input.tex";

/// Owning guard for one run's scratch directory.
pub struct RunScratch {
    dir: TempDir,
}

impl RunScratch {
    /// Creates a fresh scratch directory for this run.
    pub fn create() -> io::Result<Self> {
        let dir = TempDir::with_prefix("md-triage-")?;
        Ok(Self { dir })
    }

    /// The scratch directory path, shareable with stage processes.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Path of the materialized input Markdown under a scratch directory.
pub fn input_markdown_path(base: &Path) -> PathBuf {
    base.join(INPUT_MARKDOWN)
}

/// Path of the generated TeX under a scratch directory.
pub fn generated_tex_path(base: &Path) -> PathBuf {
    base.join(GENERATED_TEX)
}
