//! RAII fixtures for test isolation.
//!
//! `ScopedTempDir` wraps an auto-cleaned temporary directory,
//! `ScopedEnvVar` restores environment variables on drop, and
//! `ProjectFixture` lays out a complete project tree (`Procedures/`,
//! `Context/`, a primary-context document) for retrieval tests.

use std::path::{Path, PathBuf};

use crate::error::TestError;

// ── ScopedTempDir ───────────────────────────────────────────────────

/// RAII temporary directory that is automatically deleted on drop.
pub struct ScopedTempDir {
    inner: tempfile::TempDir,
}

impl ScopedTempDir {
    /// Create a new temporary directory with the given prefix.
    pub fn new(prefix: &str) -> Result<Self, TestError> {
        let inner = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| TestError::Fixture(format!("failed to create temp dir: {e}")))?;
        Ok(Self { inner })
    }

    /// Path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a subdirectory within the temp directory.
    pub fn create_subdir(&self, name: &str) -> Result<PathBuf, TestError> {
        let path = self.inner.path().join(name);
        std::fs::create_dir_all(&path)
            .map_err(|e| TestError::Fixture(format!("failed to create subdir '{name}': {e}")))?;
        Ok(path)
    }

    /// Write a file within the temp directory, creating parent directories.
    pub fn write_file(&self, relative_path: &str, content: &str) -> Result<PathBuf, TestError> {
        let path = self.inner.path().join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TestError::Fixture(format!("failed to create parents for '{relative_path}': {e}"))
            })?;
        }
        std::fs::write(&path, content).map_err(|e| {
            TestError::Fixture(format!("failed to write file '{relative_path}': {e}"))
        })?;
        Ok(path)
    }
}

// ── ScopedEnvVar ────────────────────────────────────────────────────

/// RAII guard that sets an environment variable and restores the previous
/// value (or removes the variable) when dropped.
pub struct ScopedEnvVar {
    key: String,
    previous: Option<String>,
}

impl ScopedEnvVar {
    /// Set an environment variable until the guard drops.
    pub fn set(key: &str, value: &str) -> Self {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self { key: key.to_string(), previous }
    }

    /// Remove an environment variable until the guard drops.
    pub fn remove(key: &str) -> Self {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        Self { key: key.to_string(), previous }
    }
}

impl Drop for ScopedEnvVar {
    fn drop(&mut self) {
        match &self.previous {
            Some(val) => std::env::set_var(&self.key, val),
            None => std::env::remove_var(&self.key),
        }
    }
}

// ── ProjectFixture ──────────────────────────────────────────────────

/// Default primary-context text used by [`ProjectFixture::new`].
pub const DEFAULT_PRIMARY_CONTEXT: &str =
    "You are a regulatory documentation writer. Follow company procedures \
     and cite sources for every claim.";

/// A complete throwaway project tree for retrieval tests.
///
/// Creates `Procedures/`, `Context/` (with `Prompt/`), and a
/// `primary-context.md` at the root. Everything is deleted on drop.
pub struct ProjectFixture {
    dir: ScopedTempDir,
}

impl ProjectFixture {
    pub fn new() -> Result<Self, TestError> {
        let dir = ScopedTempDir::new("phasergun_project")?;
        dir.create_subdir("Procedures")?;
        dir.create_subdir("Context")?;
        dir.create_subdir("Context/Prompt")?;
        dir.write_file("primary-context.md", DEFAULT_PRIMARY_CONTEXT)?;
        Ok(Self { dir })
    }

    /// Project root directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path to the primary-context document.
    pub fn primary_context(&self) -> PathBuf {
        self.dir.path().join("primary-context.md")
    }

    /// Replace the primary-context document text.
    pub fn write_primary_context(&self, text: &str) -> Result<PathBuf, TestError> {
        self.dir.write_file("primary-context.md", text)
    }

    /// Add an SOP under `Procedures/`.
    pub fn add_procedure(&self, name: &str, text: &str) -> Result<PathBuf, TestError> {
        self.dir.write_file(&format!("Procedures/{name}"), text)
    }

    /// Add a context document, optionally inside a subfolder.
    pub fn add_context(
        &self,
        folder: Option<&str>,
        name: &str,
        text: &str,
    ) -> Result<PathBuf, TestError> {
        let rel = match folder {
            Some(folder) => format!("Context/{folder}/{name}"),
            None => format!("Context/{name}"),
        };
        self.dir.write_file(&rel, text)
    }

    /// Add a file under the excluded `Context/Prompt/` folder.
    pub fn add_prompt_file(&self, name: &str, text: &str) -> Result<PathBuf, TestError> {
        self.dir.write_file(&format!("Context/Prompt/{name}"), text)
    }

    /// Set a file's mtime to an absolute unix time, leaving content alone.
    pub fn set_mtime(&self, relative_path: &str, unix_secs: i64) -> Result<(), TestError> {
        let path = self.dir.path().join(relative_path);
        let mtime = filetime::FileTime::from_unix_time(unix_secs, 0);
        filetime::set_file_mtime(&path, mtime)
            .map_err(|e| TestError::Fixture(format!("failed to set mtime: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_is_cleaned_on_drop() {
        let path;
        {
            let dir = ScopedTempDir::new("fixture_cleanup").unwrap();
            path = dir.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn write_file_creates_parents() {
        let dir = ScopedTempDir::new("fixture_parents").unwrap();
        let path = dir.write_file("a/b/c.txt", "nested").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "nested");
    }

    #[test]
    fn env_var_restored_after_drop() {
        let key = "PHASERGUN_TEST_ENV_RESTORE";
        std::env::set_var(key, "original");
        {
            let _guard = ScopedEnvVar::set(key, "overridden");
            assert_eq!(std::env::var(key).unwrap(), "overridden");
        }
        assert_eq!(std::env::var(key).unwrap(), "original");
        std::env::remove_var(key);
    }

    #[test]
    fn project_fixture_lays_out_the_tree() {
        let project = ProjectFixture::new().unwrap();
        assert!(project.root().join("Procedures").is_dir());
        assert!(project.root().join("Context/Prompt").is_dir());
        assert!(project.primary_context().is_file());

        project.add_procedure("SOP-001.md", "# Purpose").unwrap();
        project.add_context(Some("Predicates"), "K123.md", "predicate").unwrap();
        project.add_context(None, "loose.md", "loose").unwrap();
        assert!(project.root().join("Procedures/SOP-001.md").is_file());
        assert!(project.root().join("Context/Predicates/K123.md").is_file());
        assert!(project.root().join("Context/loose.md").is_file());
    }

    #[test]
    fn set_mtime_changes_modification_time() {
        let project = ProjectFixture::new().unwrap();
        project.add_procedure("SOP-001.md", "text").unwrap();
        project.set_mtime("Procedures/SOP-001.md", 1_600_000_000).unwrap();

        let meta = std::fs::metadata(project.root().join("Procedures/SOP-001.md")).unwrap();
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_600_000_000);
    }
}
