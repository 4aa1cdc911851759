// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's request loop: receive a frame, consult the policy gate,
//! execute against the session state, reply.
//!
//! The outbound frame is a long-lived buffer (mirroring the inbound one on
//! the client side); replies that carried raw key material scrub it the
//! moment the reply is on the wire.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::channel::FramedChannel;
use crate::config::PolicyConfig;
use crate::error::AgentError;
use crate::frame::{Frame, RequestKind, PROTOCOL_VERSION};
use crate::policy::{self, GateContext};
use crate::security;
use crate::session::{FiniMode, InitMode, Session};
use crate::state::{FieldId, PppState};
use crate::store::StateStore;

enum Control {
    Continue,
    Terminate,
}

/// Single-threaded request dispatcher; one per agent process.
pub struct Dispatcher<R, W> {
    channel: FramedChannel<R, W>,
    session: Session,
    store: StateStore,
    policy: PolicyConfig,
    reply: Frame,
}

impl<R, W> Dispatcher<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(channel: FramedChannel<R, W>, policy: PolicyConfig, session: Session) -> Self {
        let store = StateStore::new(&policy);
        Self {
            channel,
            session,
            store,
            policy,
            reply: Frame::new(RequestKind::Reply),
        }
    }

    /// Emit the Init frame reporting agent startup status.
    pub async fn send_init(&mut self, status: Result<(), AgentError>) -> Result<(), AgentError> {
        self.reply.reset(0);
        self.reply.kind = RequestKind::Init.code();
        self.reply.status = match status {
            Ok(()) => 0,
            Err(err) => err.code(),
        };
        self.channel.send(&self.reply).await
    }

    /// Serve requests until the session ends. A clean disconnect (explicit
    /// or EOF) is `Ok`; protocol violations surface as errors. In-memory
    /// state is always released without storing on the way out.
    pub async fn run(mut self) -> Result<(), AgentError> {
        let result = self.run_loop().await;
        self.session.release_all();
        result
    }

    async fn run_loop(&mut self) -> Result<(), AgentError> {
        loop {
            let frame = match self.channel.recv().await {
                Ok(frame) => frame,
                Err(AgentError::Disconnected) => {
                    info!("client disconnected while waiting for request");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            match self.handle(frame).await? {
                Control::Continue => {}
                Control::Terminate => return Ok(()),
            }
        }
    }

    async fn handle(&mut self, frame: Frame) -> Result<Control, AgentError> {
        let Some(kind) = frame.request() else {
            warn!(kind = frame.kind, "unrecognized request type");
            return Err(AgentError::BadRequest);
        };
        debug!(?kind, "request received");
        self.reply.reset(0);

        let ctx = GateContext {
            privileged: self.session.privileged(),
            has_state: self.session.has_state(),
            policy: &self.policy,
        };
        let store = &self.store;
        let username = self.session.username().to_owned();
        let peek_flags = move || -> Result<Option<u32>, AgentError> {
            // The gate inspects persisted state it is about to replace; any
            // load failure counts as "nothing usable on disk".
            match store.load(&username, false) {
                Ok(loaded) => Ok(Some(loaded.state.get_int(FieldId::Flags).unwrap_or(0))),
                Err(_) => Ok(None),
            }
        };
        if let Err(err) = policy::verify(kind, frame.int_arg, &ctx, peek_flags) {
            if err.is_policy() {
                info!(?kind, %err, "request denied by policy");
            } else {
                warn!(?kind, %err, "request rejected");
            }
            self.send_reply(Err(err)).await?;
            return Ok(Control::Continue);
        }

        self.execute(kind, &frame).await
    }

    async fn execute(&mut self, kind: RequestKind, frame: &Frame) -> Result<Control, AgentError> {
        match kind {
            RequestKind::Disconnect => {
                if self.session.has_state() {
                    if let Err(err) = self.session.state_fini(&self.store, FiniMode::Drop, false) {
                        warn!(%err, "error finalizing state during disconnect");
                    }
                }
                self.send_reply(Ok(())).await?;
                Ok(Control::Terminate)
            }

            RequestKind::UserSet => {
                let status = match frame.str_arg().and_then(security::parse_user) {
                    Ok(username) => {
                        if self.session.has_state() {
                            self.session.state_fini(&self.store, FiniMode::Drop, false).ok();
                        }
                        self.session.set_username(username);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::StateNew => {
                let status = if self.session.has_state() {
                    Err(AgentError::MustDropState)
                } else {
                    self.session.state_init(&self.store, &self.policy, InitMode::Fresh)
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::StateLoad => {
                let status = if self.session.has_state() {
                    Err(AgentError::MustDropState)
                } else {
                    // Without the lock; a later store will have to relock.
                    self.session.state_init(&self.store, &self.policy, InitMode::Load)
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::StateStore => {
                let status = self.session.state_fini(&self.store, FiniMode::Store, false);
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::StateDrop => {
                let status = if self.session.has_state() {
                    self.session.state_fini(&self.store, FiniMode::Drop, false)
                } else {
                    Err(AgentError::NoState)
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::KeyGenerate => {
                let status = match self.session.state_mut() {
                    Ok(state) => {
                        state.generate_key();
                        Ok(())
                    }
                    Err(_) => Err(AgentError::MustCreateState),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::KeyRemove => {
                let status = if self.session.has_state() {
                    Err(AgentError::MustDropState)
                } else {
                    self.session
                        .state_init(&self.store, &self.policy, InitMode::LoadLock)
                        .and_then(|()| {
                            self.session.state_fini(&self.store, FiniMode::Remove, false)
                        })
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::FlagAdd | RequestKind::FlagClear => {
                let mask = frame.int_arg as u32;
                let add = kind == RequestKind::FlagAdd;
                let status = self.with_atomic(|state, policy| {
                    let current = state.get_int(FieldId::Flags)?;
                    let updated = if add { current | mask } else { current & !mask };
                    state.set_int(FieldId::Flags, updated, policy)
                });
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::FlagGet => {
                let status = self.session.state().and_then(|state| {
                    state.get_int(FieldId::Flags)
                });
                let status = match status {
                    Ok(value) => {
                        self.reply.set_int(value as i32, 0);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::GetNum => {
                let field = FieldId::from_code(frame.int_arg);
                let status = self.session.state().and_then(|state| {
                    field
                        .ok_or(AgentError::BadArg)
                        .and_then(|field| state.get_num(field))
                });
                let status = match status {
                    Ok(value) => {
                        self.reply.set_num(value);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::GetInt => {
                let field = FieldId::from_code(frame.int_arg);
                let status = self.session.state().and_then(|state| {
                    field
                        .ok_or(AgentError::BadArg)
                        .and_then(|field| state.get_int(field))
                });
                let status = match status {
                    Ok(value) => {
                        self.reply.set_int(value as i32, 0);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::GetStr => {
                let field = FieldId::from_code(frame.int_arg);
                let status = match (self.session.state(), field) {
                    (Err(err), _) => Err(err),
                    (Ok(_), None) => Err(AgentError::BadArg),
                    (Ok(state), Some(FieldId::Key)) => {
                        // Raw key bytes travel as a fixed-length binary blob.
                        let key = *state.key();
                        self.reply.set_bin(&key)
                    }
                    (Ok(state), Some(field)) => state
                        .get_str(field)
                        .and_then(|value| self.reply.set_str(&value)),
                };
                let sent = self.send_reply(status).await;
                if field == Some(FieldId::Key) {
                    // No key bytes may linger in the outbound buffer,
                    // whether or not the reply made it out.
                    self.reply.sanitize();
                }
                sent?;
                Ok(Control::Continue)
            }

            RequestKind::GetPasscode => {
                let status = self.session.state().and_then(|state| {
                    state.passcode_at(frame.num_arg, &self.policy)
                });
                let status = match status {
                    Ok(code) => self.reply.set_str(&code),
                    Err(err) => Err(err),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::GetPrompt => {
                let status = self
                    .session
                    .state()
                    .map(|state| state.prompt_at(frame.num_arg));
                let status = match status {
                    Ok(prompt) => self.reply.set_str(&prompt),
                    Err(err) => Err(err),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::GetWarnings => {
                let status = self.session.state().map(|state| {
                    let conditions = state.warning_conditions(&self.policy);
                    let failures = state.get_int(FieldId::RecentFailures).unwrap_or(0);
                    (conditions, failures)
                });
                let status = match status {
                    Ok((conditions, failures)) => {
                        self.reply.set_int(conditions as i32, failures as i32);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::GetAlphabet => {
                let status = crate::alphabet::get(frame.int_arg as u32, &self.policy)
                    .map(str::to_owned)
                    .and_then(|chars| self.reply.set_str(&chars));
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::UpdateLatest => {
                let proposed = frame.num_arg;
                // Cheap rejection against an already-bound state before
                // taking the lock; re-validated on the fresh copy below.
                if self.session.has_state() {
                    let state = self.session.state()?;
                    if let Err(err) = check_latest_update(state, proposed) {
                        self.send_reply(Err(err)).await?;
                        return Ok(Control::Continue);
                    }
                }
                let status = self.with_atomic(|state, policy| {
                    check_latest_update(state, proposed)?;
                    state.set_num(FieldId::LatestCard, proposed, policy)
                });
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::Skip => {
                let status = if self.session.has_state() {
                    let target = frame.num_arg;
                    self.with_atomic(|state, policy| state.skip_to(target, policy))
                } else {
                    Err(AgentError::NoState)
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::Authenticate => {
                let status = self.authenticate(frame);
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::SetInt => {
                let field = FieldId::from_code(frame.int_arg);
                let value = frame.int_arg2 as u32;
                let status = match field {
                    Some(field) => {
                        self.with_atomic(|state, policy| state.set_int(field, value, policy))
                    }
                    None => Err(AgentError::BadArg),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::SetStr => {
                let field = FieldId::from_code(frame.int_arg);
                let status = match (field, frame.str_arg()) {
                    (Some(field), Ok(value)) => {
                        self.with_atomic(|state, policy| state.set_str(field, value, policy))
                    }
                    (None, _) => Err(AgentError::BadArg),
                    (_, Err(err)) => Err(err),
                };
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::SetNum => {
                // Reserved on the wire; no numeric field takes direct writes.
                self.send_reply(Err(AgentError::BadRequest)).await?;
                Ok(Control::Continue)
            }

            RequestKind::SetSpass => {
                let status = self.set_spass(frame);
                self.send_reply(status).await?;
                Ok(Control::Continue)
            }

            RequestKind::Init | RequestKind::Reply => {
                // The gate already rejected these.
                self.send_reply(Err(AgentError::BadRequest)).await?;
                Ok(Control::Continue)
            }
        }
    }

    /// Burn a passcode, then verify the candidate against it. The counter
    /// increment is persisted before verification, so a crashed or
    /// malicious client can never replay a seen passcode.
    fn authenticate(&mut self, frame: &Frame) -> Result<(), AgentError> {
        let candidate = frame.str_arg()?.to_owned();
        if !self.session.has_state() {
            return Err(AgentError::NoState);
        }

        let mut burned = 0u128;
        self.with_atomic(|state, _| {
            burned = state.get_num(FieldId::Counter)?;
            state.increment()
        })?;

        let verdict = self
            .session
            .state()?
            .verify_passcode(burned, &candidate, &self.policy);

        let bookkeeping = match &verdict {
            Ok(()) => self.with_atomic(|state, _| {
                state.clear_failures();
                Ok(())
            }),
            Err(AgentError::AuthFailed) => self.with_atomic(|state, _| {
                state.register_failure();
                Ok(())
            }),
            Err(_) => Ok(()),
        };
        if let Err(err) = bookkeeping {
            warn!(%err, "failed to update failure counter");
        }
        verdict
    }

    /// Set or remove the static password. Both outcomes are reported via
    /// the informational status codes; the mutation itself is stored.
    fn set_spass(&mut self, frame: &Frame) -> Result<(), AgentError> {
        let unset = frame.int_arg != 0;
        let spass = if unset {
            None
        } else {
            Some(frame.str_arg()?.to_owned())
        };

        let mut outcome = None;
        self.with_atomic(|state, policy| {
            state
                .set_spass(spass.as_deref(), policy)
                .map(|result| outcome = Some(result))
        })?;

        match outcome {
            Some(crate::state::SpassOutcome::Set) => Err(AgentError::SpassSet),
            Some(crate::state::SpassOutcome::Unset) => Err(AgentError::SpassUnset),
            None => Err(AgentError::Internal),
        }
    }

    /// Run one mutation inside the atomical discipline.
    fn with_atomic<F>(&mut self, mutate: F) -> Result<(), AgentError>
    where
        F: FnOnce(&mut PppState, Option<&PolicyConfig>) -> Result<(), AgentError>,
    {
        self.session.atomic_begin(&self.store, &self.policy)?;
        let policy = self.session.policy_for_setters(&self.policy);
        let result = match self.session.state_mut() {
            Ok(state) => mutate(state, policy),
            Err(err) => Err(err),
        };
        self.session.atomic_end(&self.store, result)
    }

    async fn send_reply(&mut self, status: Result<(), AgentError>) -> Result<(), AgentError> {
        self.reply.protocol_version = PROTOCOL_VERSION;
        self.reply.kind = RequestKind::Reply.code();
        self.reply.status = match status {
            Ok(()) => 0,
            Err(err) => err.code(),
        };
        // An operation never holds the state lock across a protocol wait;
        // the peer could otherwise deadlock every other agent on this user.
        debug_assert!(!self.session.is_locked());
        if self.session.is_locked() {
            return Err(AgentError::Internal);
        }
        self.channel.send(&self.reply).await
    }
}

/// `latest_card` may only move to a value adjacent to the current card or
/// to the previously printed card, and never backwards.
fn check_latest_update(state: &PppState, proposed: u128) -> Result<(), AgentError> {
    let latest = state.get_num(FieldId::LatestCard)?;
    let current = state.get_num(FieldId::CurrentCard)?;
    if latest > proposed {
        return Err(AgentError::BadArg);
    }
    if proposed != latest + 1 && proposed != current + 1 {
        return Err(AgentError::BadArg);
    }
    Ok(())
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
