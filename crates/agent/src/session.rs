// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state lifecycle: the explicit init/fini discipline and the
//! atomical load-lock-mutate-store-release wrapper.
//!
//! Exactly one state may be bound to a session at a time. A state created
//! from scratch (`new_state`) is never reloaded by the atomical wrapper;
//! the caller will store it explicitly once it is complete.

use tracing::{debug, warn};

use crate::config::PolicyConfig;
use crate::error::AgentError;
use crate::state::PppState;
use crate::store::{StateLock, StateStore};

/// How a state gets bound to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    /// Build a fresh in-memory state; nothing is read or locked.
    Fresh,
    /// Load from disk without the lock (read-only access).
    Load,
    /// Load from disk holding the exclusive lock.
    LoadLock,
}

/// How a bound state gets released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiniMode {
    /// Release without writing anything.
    Drop,
    /// Persist, then release.
    Store,
    /// Unlink the state file (requires the lock).
    Remove,
}

struct BoundState {
    state: PppState,
    lock: Option<StateLock>,
    new_state: bool,
}

/// One dispatcher's session: target user, optional bound state, caller
/// privilege.
pub struct Session {
    username: String,
    privileged: bool,
    bound: Option<BoundState>,
}

impl Session {
    pub fn new(username: String, privileged: bool) -> Self {
        Self {
            username,
            privileged,
            bound: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Rebind the session target. The caller must have released any bound
    /// state first.
    pub fn set_username(&mut self, username: String) {
        debug_assert!(self.bound.is_none());
        self.username = username;
    }

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    /// Policy reference for state setters: `None` means the caller is
    /// privileged and bypasses policy checking.
    pub fn policy_for_setters<'a>(&self, policy: &'a PolicyConfig) -> Option<&'a PolicyConfig> {
        if self.privileged {
            None
        } else {
            Some(policy)
        }
    }

    pub fn has_state(&self) -> bool {
        self.bound.is_some()
    }

    pub fn is_new_state(&self) -> bool {
        self.bound.as_ref().is_some_and(|b| b.new_state)
    }

    /// Whether the session currently holds the state file lock. Must be
    /// false whenever a frame crosses the channel.
    pub fn is_locked(&self) -> bool {
        self.bound.as_ref().is_some_and(|b| b.lock.is_some())
    }

    pub fn state(&self) -> Result<&PppState, AgentError> {
        self.bound
            .as_ref()
            .map(|b| &b.state)
            .ok_or(AgentError::NoState)
    }

    pub fn state_mut(&mut self) -> Result<&mut PppState, AgentError> {
        self.bound
            .as_mut()
            .map(|b| &mut b.state)
            .ok_or(AgentError::NoState)
    }

    /// Bind a state to the session.
    ///
    /// A state loaded with an exhausted counter space is still usable for
    /// informational access, so `NumSpace` is not an error here.
    pub fn state_init(
        &mut self,
        store: &StateStore,
        policy: &PolicyConfig,
        mode: InitMode,
    ) -> Result<(), AgentError> {
        if self.bound.is_some() {
            return Err(AgentError::MustDropState);
        }
        let bound = match mode {
            InitMode::Fresh => BoundState {
                state: PppState::new(&self.username, policy),
                lock: None,
                new_state: true,
            },
            InitMode::Load | InitMode::LoadLock => {
                let loaded = store.load(&self.username, mode == InitMode::LoadLock)?;
                BoundState {
                    state: loaded.state,
                    lock: loaded.lock,
                    new_state: false,
                }
            }
        };
        self.bound = Some(bound);
        debug!(user = %self.username, ?mode, "state bound");
        Ok(())
    }

    /// Release the bound state. `keep` retains the in-memory object (the
    /// lock is released either way).
    pub fn state_fini(
        &mut self,
        store: &StateStore,
        mode: FiniMode,
        keep: bool,
    ) -> Result<(), AgentError> {
        if matches!(mode, FiniMode::Remove) {
            let Some(bound) = self.bound.take() else {
                return Err(AgentError::NoState);
            };
            let lock = bound.lock.ok_or(AgentError::Locked)?;
            let username = bound.state.username().to_owned();
            return store.remove(&username, lock);
        }

        // A freshly assembled state may be replacing a file it never
        // loaded; take the lock for the replacement window.
        if matches!(mode, FiniMode::Store) && self.is_new_state() && !self.is_locked() {
            match store.lock_existing(&self.username) {
                Ok(lock) => {
                    if let Some(bound) = self.bound.as_mut() {
                        bound.lock = lock;
                    }
                }
                Err(err) => {
                    self.bound = None;
                    return Err(err);
                }
            }
        }

        let Some(bound) = self.bound.as_mut() else {
            return Err(AgentError::NoState);
        };

        let result = match mode {
            FiniMode::Drop | FiniMode::Remove => Ok(()),
            FiniMode::Store => store.store(&bound.state, bound.lock.as_ref()),
        };
        if let Err(err) = result {
            warn!(user = %self.username, %err, "error while saving state; state not changed");
        }

        if keep {
            bound.lock = None;
            bound.new_state = false;
        } else {
            self.bound = None;
        }
        result
    }

    /// Enter an atomical mutation: load-with-lock, unless a new state is
    /// being assembled (then the wrapper is a no-op). A previously bound
    /// lockless state is silently released first.
    pub fn atomic_begin(
        &mut self,
        store: &StateStore,
        policy: &PolicyConfig,
    ) -> Result<(), AgentError> {
        if let Some(bound) = &self.bound {
            if bound.new_state {
                return Ok(());
            }
            self.state_fini(store, FiniMode::Drop, false)?;
        }
        self.state_init(store, policy, InitMode::LoadLock)
    }

    /// Leave an atomical mutation. On success the state is stored and kept
    /// in memory (lock released); on error it is released without storing,
    /// preserving the previous persistent value.
    pub fn atomic_end(
        &mut self,
        store: &StateStore,
        prev: Result<(), AgentError>,
    ) -> Result<(), AgentError> {
        if self.bound.is_none() {
            return Err(AgentError::Internal);
        }
        if self.is_new_state() {
            return prev;
        }
        match prev {
            Ok(()) => self.state_fini(store, FiniMode::Store, true),
            Err(err) => {
                if let Err(fini_err) = self.state_fini(store, FiniMode::Drop, true) {
                    warn!(%err, %fini_err, "error while finalizing atomical state after previous error");
                }
                Err(err)
            }
        }
    }

    /// Release everything without storing; used at session end.
    pub fn release_all(&mut self) {
        self.bound = None;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
