// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent per-user state files: exclusive-lock load, atomic replace,
//! removal.
//!
//! The lock is advisory (`flock`) and held by a guard object for as long as
//! the caller owns the loaded state; dropping the guard releases it. A
//! store never happens in place: the new contents go to a temporary sibling
//! that atomically replaces the target, so no other process can observe a
//! torn file.

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::PathBuf;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::unistd::{Gid, Uid, User};
use tracing::{debug, warn};

use crate::config::{DbKind, PolicyConfig};
use crate::error::AgentError;
use crate::state::PppState;

/// Exclusive advisory lock on a user's state file.
///
/// Owning a `StateLock` is the permission to store; it unlocks on drop.
pub struct StateLock {
    flock: Flock<File>,
}

impl std::fmt::Debug for StateLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateLock").finish_non_exhaustive()
    }
}

/// Result of [`StateStore::load`].
pub struct Loaded {
    pub state: PppState,
    pub lock: Option<StateLock>,
    /// State loaded fine but has no passcodes left; informational for
    /// upper layers.
    pub numspace: bool,
}

/// Resolves, loads, stores and removes per-user state files.
pub struct StateStore {
    db: DbKind,
    state_dir: PathBuf,
    user_db_file: String,
}

impl StateStore {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            db: policy.db,
            state_dir: policy.state_dir.clone(),
            user_db_file: policy.user_db_file.clone(),
        }
    }

    /// Resolve the state file path for a user.
    pub fn path_for(&self, username: &str) -> Result<PathBuf, AgentError> {
        match self.db {
            DbKind::Global => Ok(self.state_dir.join(username)),
            DbKind::User => {
                let user = User::from_name(username)
                    .map_err(|_| AgentError::IoError)?
                    .ok_or(AgentError::NoState)?;
                Ok(user.dir.join(&self.user_db_file))
            }
            DbKind::Mysql | DbKind::Ldap => Err(AgentError::Internal),
        }
    }

    /// Load a user's state, optionally taking the exclusive lock.
    ///
    /// Contention reports `Locked` without blocking; a missing file is
    /// `NoState`.
    pub fn load(&self, username: &str, lock: bool) -> Result<Loaded, AgentError> {
        let path = self.path_for(username)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AgentError::NoState);
            }
            Err(_) => return Err(AgentError::IoError),
        };

        let mut contents = Vec::new();
        let held = if lock {
            let flock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(flock) => flock,
                Err((_, Errno::EWOULDBLOCK)) => return Err(AgentError::Locked),
                Err((_, errno)) => {
                    warn!(user = username, %errno, "flock failed");
                    return Err(AgentError::IoError);
                }
            };
            (&*flock)
                .read_to_end(&mut contents)
                .map_err(|_| AgentError::IoError)?;
            Some(flock)
        } else {
            let mut file = file;
            file.read_to_end(&mut contents)
                .map_err(|_| AgentError::IoError)?;
            None
        };

        let state = PppState::from_bytes(&contents, username)?;
        let numspace = state.out_of_codes();
        if numspace {
            debug!(user = username, "state loaded with exhausted counter space");
        }
        Ok(Loaded {
            state,
            lock: held.map(|flock| StateLock { flock }),
            numspace,
        })
    }

    /// Take the exclusive lock on an existing state file without reading
    /// it. Used when a freshly assembled state replaces one on disk (the
    /// old contents do not matter, so no deserialization happens).
    ///
    /// `Ok(None)` when there is nothing to lock.
    pub fn lock_existing(&self, username: &str) -> Result<Option<StateLock>, AgentError> {
        let path = self.path_for(username)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(_) => return Err(AgentError::IoError),
        };
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(StateLock { flock })),
            Err((_, Errno::EWOULDBLOCK)) => Err(AgentError::Locked),
            Err((_, errno)) => {
                warn!(user = username, %errno, "flock failed");
                Err(AgentError::IoError)
            }
        }
    }

    /// Atomically replace (or create) the user's state file.
    ///
    /// Replacing an existing file requires the caller to hold its lock;
    /// creating a fresh one does not, since there is nothing to contend on.
    pub fn store(&self, state: &PppState, lock: Option<&StateLock>) -> Result<(), AgentError> {
        let path = self.path_for(state.username())?;
        let existing = match std::fs::metadata(&path) {
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(_) => return Err(AgentError::IoError),
        };
        if existing.is_some() && lock.is_none() {
            return Err(AgentError::Locked);
        }

        let parent = path.parent().ok_or(AgentError::IoError)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|_| AgentError::IoError)?;
        tmp.write_all(&state.to_bytes()?)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|_| AgentError::IoError)?;

        let mode = existing.as_ref().map_or(0o600, |meta| meta.mode() & 0o777);
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))
            .map_err(|_| AgentError::IoError)?;

        // Only root may (and must) hand the file to its owner; everyone
        // else is already the owner.
        if Uid::effective().is_root() {
            let (uid, gid) = match &existing {
                Some(meta) => (Uid::from_raw(meta.uid()), Gid::from_raw(meta.gid())),
                None => {
                    let user = User::from_name(state.username())
                        .map_err(|_| AgentError::IoError)?
                        .ok_or(AgentError::IoError)?;
                    (user.uid, user.gid)
                }
            };
            nix::unistd::fchown(tmp.as_file(), Some(uid), Some(gid))
                .map_err(|_| AgentError::IoError)?;
        }

        tmp.persist(&path).map_err(|_| AgentError::IoError)?;
        debug!(user = state.username(), path = %path.display(), "state stored");
        Ok(())
    }

    /// Unlink the user's state file. The caller must hold the lock; it is
    /// consumed and released after the unlink.
    pub fn remove(&self, username: &str, lock: StateLock) -> Result<(), AgentError> {
        let path = self.path_for(username)?;
        std::fs::remove_file(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => AgentError::NoState,
            _ => AgentError::IoError,
        })?;
        drop(lock);
        debug!(user = username, "state removed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
