//! Working directories for terraform runs
//!
//! Scenarios that run side by side must not share `.terraform/` or local
//! state, so a root module can be copied into a private temp directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{HarnessError, HarnessResult};

/// Directory a scenario runs terraform in
pub struct WorkDir {
    path: PathBuf,
    // keeps the copy alive until the scenario is torn down
    temp: Option<TempDir>,
}

impl WorkDir {
    /// Use the module directory as-is
    pub fn in_place(dir: &Path) -> HarnessResult<Self> {
        if !dir.is_dir() {
            return Err(HarnessError::Config(format!(
                "terraform directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(Self {
            path: dir.to_path_buf(),
            temp: None,
        })
    }

    /// Copy the module into a fresh temp directory
    pub fn isolated(dir: &Path) -> HarnessResult<Self> {
        if !dir.is_dir() {
            return Err(HarnessError::Config(format!(
                "terraform directory does not exist: {}",
                dir.display()
            )));
        }

        let temp = tempfile::Builder::new().prefix("terracheck-").tempdir()?;
        let dest = temp.path().join("module");
        copy_module(dir, &dest)?;

        debug!("Copied {} to {}", dir.display(), dest.display());
        Ok(Self {
            path: dest,
            temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_isolated(&self) -> bool {
        self.temp.is_some()
    }

    /// Stop the copy from being removed on drop and return its path
    ///
    /// A module run in place is never removed, so this only matters for
    /// isolated copies, whose local state is the only record of what
    /// was applied.
    pub fn persist(&mut self) -> PathBuf {
        if let Some(temp) = self.temp.take() {
            #[allow(deprecated)]
            let root = temp.into_path();
            debug!("Keeping {}", root.display());
        }
        self.path.clone()
    }
}

fn copy_module(src: &Path, dest: &Path) -> HarnessResult<()> {
    fs::create_dir_all(dest)?;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(should_copy);

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| HarnessError::Engine(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Skip hidden entries and local state, but keep the provider lock file
fn should_copy(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name == ".terraform.lock.hcl" || name == ".terraform-version" {
        return true;
    }
    if name.starts_with('.') {
        return false;
    }
    !(name.ends_with(".tfstate") || name.ends_with(".tfstate.backup"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_copy_skips_state_and_hidden() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("main.tf"), "resource \"x\" \"y\" {}").unwrap();
        fs::write(src.path().join(".terraform.lock.hcl"), "# lock").unwrap();
        fs::write(src.path().join("terraform.tfstate"), "{}").unwrap();
        fs::write(src.path().join("terraform.tfstate.backup"), "{}").unwrap();
        fs::create_dir_all(src.path().join(".terraform/providers")).unwrap();
        fs::write(src.path().join(".terraform/providers/blob"), "bin").unwrap();
        fs::create_dir_all(src.path().join("modules/net")).unwrap();
        fs::write(src.path().join("modules/net/main.tf"), "").unwrap();

        let work = WorkDir::isolated(src.path()).unwrap();
        assert!(work.is_isolated());
        assert_ne!(work.path(), src.path());

        assert!(work.path().join("main.tf").exists());
        assert!(work.path().join(".terraform.lock.hcl").exists());
        assert!(work.path().join("modules/net/main.tf").exists());
        assert!(!work.path().join("terraform.tfstate").exists());
        assert!(!work.path().join("terraform.tfstate.backup").exists());
        assert!(!work.path().join(".terraform").exists());
    }

    #[test]
    fn test_copy_is_removed_on_drop() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("main.tf"), "").unwrap();

        let work = WorkDir::isolated(src.path()).unwrap();
        let copied = work.path().to_path_buf();
        assert!(copied.exists());
        drop(work);
        assert!(!copied.exists());
    }

    #[test]
    fn test_persisted_copy_outlives_drop() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("main.tf"), "").unwrap();

        let mut work = WorkDir::isolated(src.path()).unwrap();
        fs::write(work.path().join("terraform.tfstate"), "{}").unwrap();
        let kept = work.persist();
        assert_eq!(kept, work.path());
        assert!(!work.is_isolated());
        drop(work);

        assert!(kept.join("terraform.tfstate").exists());
        fs::remove_dir_all(kept.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_persist_in_place_is_the_module_dir() {
        let src = tempfile::tempdir().unwrap();
        let mut work = WorkDir::in_place(src.path()).unwrap();
        assert_eq!(work.persist(), src.path());
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let err = WorkDir::in_place(Path::new("/definitely/not/here")).err().unwrap();
        assert!(matches!(err, HarnessError::Config(_)));
    }
}
