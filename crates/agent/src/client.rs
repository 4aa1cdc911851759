// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed client over the agent channel: one method per request kind.
//!
//! Status codes translate to user-facing text through the single
//! [`AgentError::message`] function. Any channel failure marks the client
//! broken; further calls fail fast with `Disconnected`.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::channel::FramedChannel;
use crate::error::AgentError;
use crate::frame::{Frame, RequestKind};
use crate::state::{FieldId, SpassOutcome};

pub struct AgentClient<R, W> {
    channel: FramedChannel<R, W>,
    broken: bool,
}

impl<R, W> AgentClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(channel: FramedChannel<R, W>) -> Self {
        Self {
            channel,
            broken: false,
        }
    }

    /// One request/reply exchange. Strictly one outstanding request at a
    /// time; the reply frame is returned with its status still unchecked.
    async fn query(&mut self, frame: Frame) -> Result<Frame, AgentError> {
        if self.broken {
            return Err(AgentError::Disconnected);
        }
        if let Err(err) = self.channel.send(&frame).await {
            self.broken = true;
            return Err(err);
        }
        let reply = match self.channel.recv().await {
            Ok(reply) => reply,
            Err(err) => {
                self.broken = true;
                return Err(err);
            }
        };
        if reply.request() != Some(RequestKind::Reply) {
            self.broken = true;
            return Err(AgentError::BadRequest);
        }
        Ok(reply)
    }

    async fn simple(&mut self, frame: Frame) -> Result<(), AgentError> {
        let reply = self.query(frame).await?;
        AgentError::from_status(reply.status)
    }

    // --- session ----------------------------------------------------------

    /// Bind the session to another user (privileged callers only).
    pub async fn user_set(&mut self, username: &str) -> Result<(), AgentError> {
        let mut frame = Frame::new(RequestKind::UserSet);
        frame.set_str(username)?;
        self.simple(frame).await
    }

    /// Tell the agent to shut the session down and consume the client.
    pub async fn disconnect(mut self) -> Result<(), AgentError> {
        self.simple(Frame::new(RequestKind::Disconnect)).await
    }

    // --- state lifecycle --------------------------------------------------

    pub async fn state_new(&mut self) -> Result<(), AgentError> {
        self.simple(Frame::new(RequestKind::StateNew)).await
    }

    pub async fn state_load(&mut self) -> Result<(), AgentError> {
        self.simple(Frame::new(RequestKind::StateLoad)).await
    }

    pub async fn state_store(&mut self) -> Result<(), AgentError> {
        self.simple(Frame::new(RequestKind::StateStore)).await
    }

    pub async fn state_drop(&mut self) -> Result<(), AgentError> {
        self.simple(Frame::new(RequestKind::StateDrop)).await
    }

    // --- key --------------------------------------------------------------

    pub async fn key_generate(&mut self) -> Result<(), AgentError> {
        self.simple(Frame::new(RequestKind::KeyGenerate)).await
    }

    pub async fn key_remove(&mut self) -> Result<(), AgentError> {
        self.simple(Frame::new(RequestKind::KeyRemove)).await
    }

    /// Raw 256-bit sequence key. The caller owns scrubbing its copy.
    pub async fn get_key(&mut self) -> Result<[u8; 32], AgentError> {
        let mut frame = Frame::new(RequestKind::GetStr);
        frame.int_arg = FieldId::Key.code();
        let reply = self.query(frame).await?;
        AgentError::from_status(reply.status)?;
        let mut key = [0u8; 32];
        key.copy_from_slice(reply.bin_arg(32)?);
        Ok(key)
    }

    // --- flags ------------------------------------------------------------

    pub async fn flag_add(&mut self, mask: u32) -> Result<(), AgentError> {
        let mut frame = Frame::new(RequestKind::FlagAdd);
        frame.int_arg = mask as i32;
        self.simple(frame).await
    }

    pub async fn flag_clear(&mut self, mask: u32) -> Result<(), AgentError> {
        let mut frame = Frame::new(RequestKind::FlagClear);
        frame.int_arg = mask as i32;
        self.simple(frame).await
    }

    pub async fn flag_get(&mut self) -> Result<u32, AgentError> {
        let reply = self.query(Frame::new(RequestKind::FlagGet)).await?;
        AgentError::from_status(reply.status)?;
        Ok(reply.int_arg as u32)
    }

    // --- field projection -------------------------------------------------

    pub async fn get_num(&mut self, field: FieldId) -> Result<u128, AgentError> {
        let mut frame = Frame::new(RequestKind::GetNum);
        frame.int_arg = field.code();
        let reply = self.query(frame).await?;
        AgentError::from_status(reply.status)?;
        Ok(reply.num_arg)
    }

    pub async fn get_int(&mut self, field: FieldId) -> Result<u32, AgentError> {
        let mut frame = Frame::new(RequestKind::GetInt);
        frame.int_arg = field.code();
        let reply = self.query(frame).await?;
        AgentError::from_status(reply.status)?;
        Ok(reply.int_arg as u32)
    }

    pub async fn get_str(&mut self, field: FieldId) -> Result<String, AgentError> {
        let mut frame = Frame::new(RequestKind::GetStr);
        frame.int_arg = field.code();
        let reply = self.query(frame).await?;
        AgentError::from_status(reply.status)?;
        Ok(reply.str_arg()?.to_owned())
    }

    pub async fn set_int(&mut self, field: FieldId, value: u32) -> Result<(), AgentError> {
        let mut frame = Frame::new(RequestKind::SetInt);
        frame.set_int(field.code(), value as i32);
        self.simple(frame).await
    }

    pub async fn set_str(&mut self, field: FieldId, value: &str) -> Result<(), AgentError> {
        let mut frame = Frame::new(RequestKind::SetStr);
        frame.int_arg = field.code();
        frame.set_str(value)?;
        self.simple(frame).await
    }

    // --- passcodes --------------------------------------------------------

    pub async fn get_passcode(&mut self, counter: u128) -> Result<String, AgentError> {
        let mut frame = Frame::new(RequestKind::GetPasscode);
        frame.set_num(counter);
        let reply = self.query(frame).await?;
        AgentError::from_status(reply.status)?;
        Ok(reply.str_arg()?.to_owned())
    }

    pub async fn get_prompt(&mut self, counter: u128) -> Result<String, AgentError> {
        let mut frame = Frame::new(RequestKind::GetPrompt);
        frame.set_num(counter);
        let reply = self.query(frame).await?;
        AgentError::from_status(reply.status)?;
        Ok(reply.str_arg()?.to_owned())
    }

    /// Warning bitset plus the recent-failure count.
    pub async fn get_warnings(&mut self) -> Result<(u32, u32), AgentError> {
        let reply = self.query(Frame::new(RequestKind::GetWarnings)).await?;
        AgentError::from_status(reply.status)?;
        Ok((reply.int_arg as u32, reply.int_arg2 as u32))
    }

    pub async fn get_alphabet(&mut self, id: u32) -> Result<String, AgentError> {
        let mut frame = Frame::new(RequestKind::GetAlphabet);
        frame.int_arg = id as i32;
        let reply = self.query(frame).await?;
        AgentError::from_status(reply.status)?;
        Ok(reply.str_arg()?.to_owned())
    }

    pub async fn update_latest(&mut self, card: u128) -> Result<(), AgentError> {
        let mut frame = Frame::new(RequestKind::UpdateLatest);
        frame.set_num(card);
        self.simple(frame).await
    }

    pub async fn skip(&mut self, target: u128) -> Result<(), AgentError> {
        let mut frame = Frame::new(RequestKind::Skip);
        frame.set_num(target);
        self.simple(frame).await
    }

    pub async fn authenticate(&mut self, passcode: &str) -> Result<(), AgentError> {
        let mut frame = Frame::new(RequestKind::Authenticate);
        frame.set_str(passcode)?;
        self.simple(frame).await
    }

    /// Set (`Some`) or remove (`None`) the static password. The agent
    /// reports both outcomes through informational status codes.
    pub async fn set_spass(&mut self, spass: Option<&str>) -> Result<SpassOutcome, AgentError> {
        let mut frame = Frame::new(RequestKind::SetSpass);
        if let Some(spass) = spass {
            frame.set_str(spass)?;
        } else {
            frame.int_arg = 1;
        }
        match self.simple(frame).await {
            Err(AgentError::SpassSet) => Ok(SpassOutcome::Set),
            Err(AgentError::SpassUnset) => Ok(SpassOutcome::Unset),
            Err(err) => Err(err),
            // The agent always answers with an informational code here.
            Ok(()) => Err(AgentError::Internal),
        }
    }
}
