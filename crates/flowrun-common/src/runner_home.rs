// Resolution of the runner's on-disk layout: the root directory plus the
// well-known directories hanging under it.

use crate::constants::{path, WellKnownDirectory};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// The runner's directory layout.
///
/// By default the root is the directory containing the running executable;
/// a work-folder override relocates only the work tree (the teacher for the
/// `.runner` `workFolder` setting). All well-known directories are created
/// lazily by `ensure`.
#[derive(Debug, Clone)]
pub struct RunnerHome {
    root: PathBuf,
    work: PathBuf,
}

impl RunnerHome {
    /// Resolve the layout from the current executable location.
    pub fn from_current_exe() -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate the current executable")?;
        let root = exe
            .parent()
            .map(Path::to_path_buf)
            .context("Executable has no parent directory")?;
        Ok(Self::new(root))
    }

    /// Build the layout rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let work = root.join(path::WORK_DIRECTORY);
        Self { root, work }
    }

    /// Override the work folder. Relative paths are resolved against the root.
    pub fn with_work_folder(mut self, work_folder: impl AsRef<Path>) -> Self {
        let work_folder = work_folder.as_ref();
        self.work = if work_folder.is_absolute() {
            work_folder.to_path_buf()
        } else {
            self.root.join(work_folder)
        };
        self
    }

    /// Resolve a well-known directory.
    pub fn directory(&self, dir: WellKnownDirectory) -> PathBuf {
        match dir {
            WellKnownDirectory::Root => self.root.clone(),
            WellKnownDirectory::Diag => self.root.join(path::DIAG_DIRECTORY),
            WellKnownDirectory::Temp => self.work.join(path::TEMP_DIRECTORY),
            WellKnownDirectory::Tools => self.work.join(path::TOOL_DIRECTORY),
            WellKnownDirectory::Work => self.work.clone(),
        }
    }

    /// The directory where per-run job logs are written.
    pub fn logs_directory(&self) -> PathBuf {
        self.work.join(path::LOGS_DIRECTORY)
    }

    /// Create a well-known directory if it does not exist and return its path.
    pub fn ensure(&self, dir: WellKnownDirectory) -> Result<PathBuf> {
        let path = self.directory(dir);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {} directory at {}", dir, path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_hangs_off_root() {
        let home = RunnerHome::new("/opt/flowrun");
        assert_eq!(
            home.directory(WellKnownDirectory::Work),
            PathBuf::from("/opt/flowrun/_work")
        );
        assert_eq!(
            home.directory(WellKnownDirectory::Temp),
            PathBuf::from("/opt/flowrun/_work/_temp")
        );
        assert_eq!(
            home.directory(WellKnownDirectory::Tools),
            PathBuf::from("/opt/flowrun/_work/_tool")
        );
        assert_eq!(
            home.directory(WellKnownDirectory::Diag),
            PathBuf::from("/opt/flowrun/_diag")
        );
        assert_eq!(home.logs_directory(), PathBuf::from("/opt/flowrun/_work/_logs"));
    }

    #[test]
    fn relative_work_folder_resolves_against_root() {
        let home = RunnerHome::new("/opt/flowrun").with_work_folder("jobs");
        assert_eq!(
            home.directory(WellKnownDirectory::Work),
            PathBuf::from("/opt/flowrun/jobs")
        );
        assert_eq!(
            home.directory(WellKnownDirectory::Temp),
            PathBuf::from("/opt/flowrun/jobs/_temp")
        );
    }

    #[test]
    fn absolute_work_folder_wins() {
        let home = RunnerHome::new("/opt/flowrun").with_work_folder("/var/lib/flowrun-work");
        assert_eq!(
            home.directory(WellKnownDirectory::Work),
            PathBuf::from("/var/lib/flowrun-work")
        );
        // Diag stays anchored at the root.
        assert_eq!(
            home.directory(WellKnownDirectory::Diag),
            PathBuf::from("/opt/flowrun/_diag")
        );
    }

    #[test]
    fn ensure_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let home = RunnerHome::new(tmp.path());
        let work = home.ensure(WellKnownDirectory::Work).unwrap();
        assert!(work.is_dir());
        let tools = home.ensure(WellKnownDirectory::Tools).unwrap();
        assert!(tools.is_dir());
    }
}
