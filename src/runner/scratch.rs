//! Scratch space: the directory the launcher runs in and fills with logs
//!
//! The launcher always writes its logs to fixed relative directories, so only
//! one run may use a given working directory at a time. Ownership is taken by
//! creating a lock file with create-new semantics and released when the
//! [`ScratchLease`] is dropped. A lock whose recorded pid no longer exists
//! was left by a crashed run and is taken over.

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the lock file inside the working directory
pub const LOCK_FILE: &str = ".mvbench.lock";

/// A working directory plus the scratch directories the launcher populates
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    workdir: PathBuf,
    dirs: Vec<String>,
    /// Isolated spaces are created per run and removed on release
    isolated: bool,
}

impl ScratchSpace {
    /// The configured launcher working directory, reused by every run
    pub fn shared(workdir: impl Into<PathBuf>, dirs: &[String]) -> Self {
        Self {
            workdir: workdir.into(),
            dirs: dirs.to_vec(),
            isolated: false,
        }
    }

    /// A fresh working directory `<arena>/<name>-<token>` for one run
    pub fn isolated(arena: &Path, name: &str, token: i64, dirs: &[String]) -> Self {
        Self {
            workdir: arena.join(format!("{}-{}", name, token)),
            dirs: dirs.to_vec(),
            isolated: true,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Take exclusive ownership and clear the scratch directories
    pub fn acquire(&self) -> Result<ScratchLease> {
        if self.isolated {
            std::fs::create_dir_all(&self.workdir).with_context(|| {
                format!("Failed to create working directory: {}", self.workdir.display())
            })?;
        } else if !self.workdir.is_dir() {
            bail!("Launcher working directory not found: {}", self.workdir.display());
        }

        let lock_path = self.workdir.join(LOCK_FILE);
        let mut lock = self.take_lock(&lock_path)?;
        let _ = writeln!(lock, "{}", std::process::id());

        let lease = ScratchLease {
            space: self.clone(),
            lock_path,
        };
        lease.clear()?;
        Ok(lease)
    }

    fn take_lock(&self, lock_path: &Path) -> Result<File> {
        let mut reclaimed = false;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(lock_path) {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let holder = std::fs::read_to_string(lock_path).unwrap_or_default();
                    let holder = holder.trim();
                    match holder.parse::<i32>() {
                        Ok(pid) if !reclaimed && pid > 0 && !process_exists(pid) => {
                            warn!(pid, "Removing stale lock in {}", self.workdir.display());
                            match std::fs::remove_file(lock_path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                                Err(e) => {
                                    return Err(e).with_context(|| {
                                        format!("Failed to remove stale lock: {}", lock_path.display())
                                    })
                                }
                            }
                            reclaimed = true;
                        }
                        _ => bail!(
                            "Scratch space {} is busy (lock held by pid {})",
                            self.workdir.display(),
                            holder
                        ),
                    }
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to create lock file: {}", lock_path.display())
                    })
                }
            }
        }
    }
}

/// Signal 0 only checks for existence; EPERM still means the process is there
fn process_exists(pid: i32) -> bool {
    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

/// Exclusive use of a scratch space; released on drop
#[derive(Debug)]
pub struct ScratchLease {
    space: ScratchSpace,
    lock_path: PathBuf,
}

impl ScratchLease {
    pub fn workdir(&self) -> &Path {
        &self.space.workdir
    }

    /// Remove and recreate every scratch directory
    fn clear(&self) -> Result<()> {
        for name in &self.space.dirs {
            let path = self.space.workdir.join(name);
            if path.exists() {
                std::fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to clear {}", path.display()))?;
            }
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
        }
        Ok(())
    }

    /// Move every scratch directory into `dest`, replacing existing copies
    ///
    /// A scratch directory that does not exist is skipped. Returns the
    /// directories that were moved.
    pub fn relocate_into(&self, dest: &Path) -> Result<Vec<PathBuf>> {
        let mut moved = Vec::new();
        for name in &self.space.dirs {
            let src = self.space.workdir.join(name);
            if !src.exists() {
                debug!("Scratch directory {} absent, nothing to relocate", src.display());
                continue;
            }
            let dst = dest.join(name);
            if dst.exists() {
                std::fs::remove_dir_all(&dst)
                    .with_context(|| format!("Failed to replace {}", dst.display()))?;
            }
            move_dir(&src, &dst)?;
            moved.push(dst);
        }
        Ok(moved)
    }
}

impl Drop for ScratchLease {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            warn!("Failed to release lock {}: {}", self.lock_path.display(), e);
        }
        if self.space.isolated {
            if let Err(e) = std::fs::remove_dir_all(&self.space.workdir) {
                warn!(
                    "Failed to remove working directory {}: {}",
                    self.space.workdir.display(),
                    e
                );
            }
        }
    }
}

/// Rename, falling back to copy and remove across filesystems
fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_dir_recursive(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    std::fs::remove_dir_all(src).with_context(|| format!("Failed to remove {}", src.display()))
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
