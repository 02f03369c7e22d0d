//! # File I/O Module
//!
//! Project file operations:
//! - **Atomic saves**: write to `.tmp`, fsync, rename over the target
//! - **File locking**: one writer per project, with a visible `.lock` file
//! - **Version validation**: refuse files written by an incompatible schema
//!
//! ## File Format
//!
//! Projects are saved as `.tko` files containing JSON. Lock files sit next
//! to them as `.tko.lock` and record who holds the lock.
//!
//! ## Example
//!
//! ```rust,no_run
//! use takeoff_core::file_io::{save_project, load_project, FileLock};
//! use takeoff_core::project::Project;
//! use std::path::Path;
//!
//! let project = Project::new("Estimator", "25-001", "Client");
//! let path = Path::new("myproject.tko");
//!
//! let lock = FileLock::acquire(path, "qs@company.com").unwrap();
//! save_project(&project, path).unwrap();
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};
use crate::project::{Project, SCHEMA_VERSION};

/// Metadata stored in `.tko.lock` files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// User identifier (email or username)
    pub user_id: String,
    pub machine: String,
    pub pid: u32,
    pub locked_at: DateTime<Utc>,
}

impl LockInfo {
    /// Lock info for the current process
    pub fn new(user_id: impl Into<String>) -> Self {
        LockInfo {
            user_id: user_id.into(),
            machine: hostname().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            locked_at: Utc::now(),
        }
    }
}

fn hostname() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::env::var("HOST").ok())
    }
}

/// Exclusive project lock, released on drop.
///
/// Holds an OS-level lock (fs2) on the `.lock` file and writes [`LockInfo`]
/// into it so other users can see who is editing.
pub struct FileLock {
    project_path: PathBuf,
    lock_path: PathBuf,
    _lock_file: File,
    pub info: LockInfo,
}

impl FileLock {
    /// Acquire an exclusive lock on a project file.
    ///
    /// Fails with [`CalcError::FileLocked`] when another live process holds it.
    /// Locks left behind by dead processes, or older than 24 hours, are taken over.
    pub fn acquire(path: &Path, user_id: impl Into<String>) -> CalcResult<Self> {
        let lock_path = lock_path_for(path);
        let info = LockInfo::new(user_id);

        if let Some(existing) = read_lock_info(&lock_path).filter(|i| !is_lock_stale(i)) {
            return Err(CalcError::file_locked(
                path.display().to_string(),
                format!("{} ({})", existing.user_id, existing.machine),
                existing.locked_at.to_rfc3339(),
            ));
        }

        let mut lock_file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| CalcError::file_error("create lock", lock_path.display().to_string(), e.to_string()))?;

        FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
            CalcError::file_locked(path.display().to_string(), "another process", "unknown")
        })?;

        let lock_json = serde_json::to_string_pretty(&info)?;
        lock_file
            .write_all(lock_json.as_bytes())
            .and_then(|_| lock_file.sync_all())
            .map_err(|e| CalcError::file_error("write lock", lock_path.display().to_string(), e.to_string()))?;

        Ok(FileLock {
            project_path: path.to_path_buf(),
            lock_path,
            _lock_file: lock_file,
            info,
        })
    }

    /// Who holds the lock on `path`, if anyone.
    pub fn check(path: &Path) -> Option<LockInfo> {
        read_lock_info(&lock_path_for(path)).filter(|info| !is_lock_stale(info))
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn lock_path_for(project_path: &Path) -> PathBuf {
    sibling_with_suffix(project_path, "lock")
}

fn tmp_path_for(project_path: &Path) -> PathBuf {
    sibling_with_suffix(project_path, "tmp")
}

/// `project.tko` -> `project.tko.<suffix>`
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut out = path.to_path_buf();
    let extension = out
        .extension()
        .map(|e| format!("{}.{}", e.to_string_lossy(), suffix))
        .unwrap_or_else(|| suffix.to_string());
    out.set_extension(extension);
    out
}

fn read_lock_info(lock_path: &Path) -> Option<LockInfo> {
    let contents = fs::read_to_string(lock_path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// A lock is stale when its process is gone (same machine) or it is over a day old.
fn is_lock_stale(info: &LockInfo) -> bool {
    if hostname().as_deref() == Some(info.machine.as_str()) {
        #[cfg(unix)]
        {
            if fs::metadata(format!("/proc/{}", info.pid)).is_err() {
                return true;
            }
        }
    }
    (Utc::now() - info.locked_at).num_hours() > 24
}

/// Save a project with atomic write semantics.
///
/// Serializes to a `.tmp` sibling, syncs it to disk, then renames it over
/// `path`. An interrupted save leaves the previous file intact.
pub fn save_project(project: &Project, path: &Path) -> CalcResult<()> {
    let json = serde_json::to_string_pretty(project)?;
    let tmp_path = tmp_path_for(path);

    let write_tmp = || -> std::io::Result<()> {
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()
    };
    write_tmp().map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CalcError::file_error("write temp file", tmp_path.display().to_string(), e.to_string())
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CalcError::file_error("rename to final", path.display().to_string(), e.to_string())
    })?;

    tracing::debug!(path = %path.display(), bytes = json.len(), "project saved");
    Ok(())
}

/// Load a project and check its schema version.
///
/// # Returns
///
/// * `Err(CalcError::VersionMismatch)` - written by an incompatible schema
/// * `Err(CalcError::SerializationError)` - not a valid project file
/// * `Err(CalcError::FileError)` - I/O error
pub fn load_project(path: &Path) -> CalcResult<Project> {
    let contents = fs::read_to_string(path)
        .map_err(|e| CalcError::file_error("read", path.display().to_string(), e.to_string()))?;

    let project: Project = serde_json::from_str(&contents)
        .map_err(|e| CalcError::serialization(format!("Invalid JSON in {}: {}", path.display(), e)))?;

    validate_version(&project.meta.version)?;
    Ok(project)
}

/// Load a project along with the lock held on it, if any.
pub fn load_project_with_lock_check(path: &Path) -> CalcResult<(Project, Option<LockInfo>)> {
    let project = load_project(path)?;
    Ok((project, FileLock::check(path)))
}

/// Files must share the major version; on 0.x the file's minor may not be newer than ours.
fn validate_version(file_version: &str) -> CalcResult<()> {
    let mismatch = || CalcError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };

    let file = Version::parse(file_version.trim()).map_err(|_| mismatch())?;
    let current = Version::parse(SCHEMA_VERSION).map_err(|e| CalcError::internal(e.to_string()))?;

    if file.major != current.major {
        return Err(mismatch());
    }
    if current.major == 0 && file.minor > current.minor {
        return Err(mismatch());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn test_sibling_paths() {
        let project_path = Path::new("/path/to/project.tko");
        assert_eq!(lock_path_for(project_path), Path::new("/path/to/project.tko.lock"));
        assert_eq!(tmp_path_for(project_path), Path::new("/path/to/project.tko.tmp"));
        assert_eq!(lock_path_for(Path::new("bare")), Path::new("bare.lock"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.tko");

        let mut project = Project::new("Test Estimator", "TEST-001", "Test Client");
        let id = project.add_element(Element::new("Slab").with_parameter("area", 42.0));
        save_project(&project, &path).unwrap();

        let loaded = load_project(&path).unwrap();
        assert_eq!(loaded.meta.estimator, "Test Estimator");
        assert_eq!(loaded.get_element(&id).unwrap().parameters["area"].as_number(), Some(42.0));
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn test_file_lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.tko");
        File::create(&path).unwrap();

        let lock = FileLock::acquire(&path, "test@example.com").unwrap();
        assert_eq!(lock.info.user_id, "test@example.com");
        assert_eq!(lock.project_path(), path.as_path());
        assert!(lock_path_for(&path).exists());
        assert_eq!(FileLock::check(&path).unwrap().user_id, "test@example.com");

        drop(lock);
        assert!(!lock_path_for(&path).exists());
        assert!(FileLock::check(&path).is_none());
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.tko");
        let mut old = LockInfo::new("someone@else.com");
        old.locked_at = Utc::now() - chrono::Duration::hours(48);
        fs::write(lock_path_for(&path), serde_json::to_string(&old).unwrap()).unwrap();

        let lock = FileLock::acquire(&path, "me@example.com").unwrap();
        assert_eq!(lock.info.user_id, "me@example.com");
    }

    #[test]
    fn test_version_validation() {
        assert!(validate_version(SCHEMA_VERSION).is_ok());
        assert!(validate_version("0.1.5").is_ok());
        assert!(validate_version("0.0.9").is_ok());
        assert!(validate_version("1.0.0").is_err());
        assert!(validate_version("0.2.0").is_err());
        assert!(validate_version("not-a-version").is_err());
    }

    #[test]
    fn test_load_rejects_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.tko");
        let mut project = Project::new("A", "B", "C");
        project.meta.version = "0.9.0".into();
        save_project(&project, &path).unwrap();
        assert_eq!(load_project(&path).unwrap_err().error_code(), "VERSION_MISMATCH");
    }

    #[test]
    fn test_load_with_lock_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.tko");
        save_project(&Project::new("Test", "TEST", "Client"), &path).unwrap();

        let (loaded, lock_info) = load_project_with_lock_check(&path).unwrap();
        assert_eq!(loaded.meta.job_id, "TEST");
        assert!(lock_info.is_none());
    }
}
