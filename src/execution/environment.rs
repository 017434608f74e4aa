//! Ephemeral job environments and repository snapshots

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directories at the snapshot root that are never checked out
const CHECKOUT_EXCLUDES: &[&str] = &["target"];

/// Error types for environment setup
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Failed to create job workspace: {0}")]
    Create(#[source] io::Error),

    #[error("Repository snapshot {0} is not a directory")]
    MissingSnapshot(PathBuf),

    #[error("Failed to copy {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read repository snapshot: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Repository contents at the time of the event
#[derive(Debug, Clone)]
pub struct RepositorySnapshot {
    root: PathBuf,

    /// Paths inside the repository that belong to the runner (e.g. the workspace base)
    excluded: Vec<PathBuf>,
}

impl RepositorySnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, EnvironmentError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(EnvironmentError::MissingSnapshot(root));
        }
        Ok(Self {
            root,
            excluded: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Never check out `path` or anything below it
    pub fn excluding(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    /// Excluded paths that live under the root, relative to it.
    ///
    /// Compared canonically so `./.ci-work` and an absolute path agree.
    fn excluded_relative(&self, dest: &Path) -> Vec<PathBuf> {
        let Ok(root) = fs::canonicalize(&self.root) else {
            return Vec::new();
        };

        self.excluded
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(dest))
            .filter_map(|path| fs::canonicalize(path).ok())
            .filter_map(|path| path.strip_prefix(&root).ok().map(Path::to_path_buf))
            .filter(|relative| !relative.as_os_str().is_empty())
            .collect()
    }

    /// Copy the snapshot into `dest`, returning the number of files copied.
    ///
    /// Blocking; call from `spawn_blocking` in async code.
    pub fn copy_into(&self, dest: &Path) -> Result<usize, EnvironmentError> {
        let mut copied = 0;
        let excluded = self.excluded_relative(dest);
        if !excluded.is_empty() {
            debug!("Skipping runner paths during checkout: {:?}", excluded);
        }

        let entries = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let build_dir = e.depth() == 1
                    && e.file_type().is_dir()
                    && CHECKOUT_EXCLUDES.iter().any(|ex| e.file_name() == *ex);
                let runner_path = e
                    .path()
                    .strip_prefix(&self.root)
                    .map(|relative| excluded.iter().any(|ex| relative.starts_with(ex)))
                    .unwrap_or(false);
                !(build_dir || runner_path)
            });

        for entry in entries {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| EnvironmentError::Copy {
                    path: entry.path().to_path_buf(),
                    source: io::Error::other(e),
                })?;
            let target = dest.join(relative);

            let copy_err = |source: io::Error| EnvironmentError::Copy {
                path: entry.path().to_path_buf(),
                source,
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                fs::create_dir_all(&target).map_err(copy_err)?;
            } else if file_type.is_file() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(copy_err)?;
                }
                fs::copy(entry.path(), &target).map_err(copy_err)?;
                copied += 1;
            } else if file_type.is_symlink() {
                copy_symlink(entry.path(), &target).map_err(copy_err)?;
            }
        }

        debug!("Checked out {} files from {}", copied, self.root.display());
        Ok(copied)
    }
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    let link = fs::read_link(source)?;
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, _target: &Path) -> io::Result<()> {
    debug!("Skipping symlink {}", source.display());
    Ok(())
}

/// An isolated, exclusively owned workspace for one job.
///
/// The backing directory is removed by `release`, or on drop if the job
/// never gets that far.
#[derive(Debug)]
pub struct JobEnvironment {
    job_id: String,
    dir: TempDir,
    workspace: PathBuf,
}

impl JobEnvironment {
    /// Create a fresh workspace under `base` (system temp dir when `None`)
    pub fn acquire(job_id: &str, base: Option<&Path>) -> Result<Self, EnvironmentError> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("ci-{}-", job_id);
        builder.prefix(&prefix);

        let dir = match base {
            Some(base) => {
                fs::create_dir_all(base).map_err(EnvironmentError::Create)?;
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .map_err(EnvironmentError::Create)?;

        let workspace = dir.path().join("workspace");
        fs::create_dir(&workspace).map_err(EnvironmentError::Create)?;

        debug!("Acquired environment for job {} at {}", job_id, dir.path().display());

        Ok(Self {
            job_id: job_id.to_string(),
            dir,
            workspace,
        })
    }

    /// Directory steps run in
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Root of the environment (workspace plus runner scratch space)
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Tear the environment down
    pub fn release(self) {
        let root = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Released environment for job {}", self.job_id),
            Err(e) => warn!(
                "Failed to remove environment for job {} at {}: {}",
                self.job_id,
                root.display(),
                e
            ),
        }
    }
}
