// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-layout request/reply frame shared by both ends of the agent pipe.
//!
//! Parent and agent are always the same binary on the same host, so fields
//! travel in native byte order. Any layout change must bump
//! [`PROTOCOL_VERSION`].

use bytes::{Buf, BufMut, BytesMut};

use crate::error::AgentError;

pub const PROTOCOL_VERSION: u32 = 0x0003_0001;

/// Usable bytes in `str_arg`; one extra slot keeps text payloads
/// NUL-terminated on the wire.
pub const STR_ARG_MAX: usize = 255;
pub const STR_ARG_SIZE: usize = STR_ARG_MAX + 1;

/// Total encoded frame size: five 32-bit fields, one 128-bit field and the
/// string buffer.
pub const FRAME_LEN: usize = 5 * 4 + 16 + STR_ARG_SIZE;

/// Request type codes. The numbers are wire protocol, fixed forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Init = 1,
    Reply = 2,
    Disconnect = 3,
    UserSet = 4,
    StateNew = 5,
    StateLoad = 6,
    StateStore = 7,
    StateDrop = 8,
    KeyGenerate = 9,
    KeyRemove = 10,
    FlagAdd = 11,
    FlagClear = 12,
    FlagGet = 13,
    GetNum = 14,
    GetInt = 15,
    GetStr = 16,
    GetPasscode = 17,
    GetPrompt = 18,
    GetWarnings = 19,
    GetAlphabet = 20,
    UpdateLatest = 21,
    Skip = 22,
    Authenticate = 23,
    SetNum = 24,
    SetInt = 25,
    SetStr = 26,
    SetSpass = 27,
}

impl RequestKind {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Init,
            2 => Self::Reply,
            3 => Self::Disconnect,
            4 => Self::UserSet,
            5 => Self::StateNew,
            6 => Self::StateLoad,
            7 => Self::StateStore,
            8 => Self::StateDrop,
            9 => Self::KeyGenerate,
            10 => Self::KeyRemove,
            11 => Self::FlagAdd,
            12 => Self::FlagClear,
            13 => Self::FlagGet,
            14 => Self::GetNum,
            15 => Self::GetInt,
            16 => Self::GetStr,
            17 => Self::GetPasscode,
            18 => Self::GetPrompt,
            19 => Self::GetWarnings,
            20 => Self::GetAlphabet,
            21 => Self::UpdateLatest,
            22 => Self::Skip,
            23 => Self::Authenticate,
            24 => Self::SetNum,
            25 => Self::SetInt,
            26 => Self::SetStr,
            27 => Self::SetSpass,
            _ => return None,
        })
    }
}

/// One request or reply. Every send transmits the whole record; unused
/// regions are zero.
#[derive(Clone)]
pub struct Frame {
    pub protocol_version: u32,
    pub kind: i32,
    pub status: i32,
    pub int_arg: i32,
    pub int_arg2: i32,
    pub num_arg: u128,
    pub str_arg: [u8; STR_ARG_SIZE],
}

impl Frame {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            kind: kind.code(),
            status: 0,
            int_arg: 0,
            int_arg2: 0,
            num_arg: 0,
            str_arg: [0u8; STR_ARG_SIZE],
        }
    }

    pub fn request(&self) -> Option<RequestKind> {
        RequestKind::from_code(self.kind)
    }

    /// Reset payload fields, keeping the frame reusable for the next reply.
    pub fn reset(&mut self, status: i32) {
        self.protocol_version = PROTOCOL_VERSION;
        self.status = status;
        self.int_arg = 0;
        self.int_arg2 = 0;
        self.num_arg = 0;
        self.str_arg = [0u8; STR_ARG_SIZE];
    }

    /// Scrub everything that could hold key material.
    pub fn sanitize(&mut self) {
        self.reset(0);
    }

    pub fn set_int(&mut self, int_arg: i32, int_arg2: i32) {
        self.int_arg = int_arg;
        self.int_arg2 = int_arg2;
    }

    pub fn set_num(&mut self, num_arg: u128) {
        self.num_arg = num_arg;
    }

    /// Store a text payload. Fails with `TooLong` when it cannot be
    /// NUL-terminated inside the buffer.
    pub fn set_str(&mut self, text: &str) -> Result<(), AgentError> {
        let bytes = text.as_bytes();
        if bytes.len() > STR_ARG_MAX {
            return Err(AgentError::TooLong);
        }
        self.str_arg = [0u8; STR_ARG_SIZE];
        self.str_arg[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Store a fixed-length binary payload (raw key material).
    pub fn set_bin(&mut self, data: &[u8]) -> Result<(), AgentError> {
        if data.len() > STR_ARG_MAX {
            return Err(AgentError::TooLong);
        }
        self.str_arg = [0u8; STR_ARG_SIZE];
        self.str_arg[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read `str_arg` as NUL-terminated UTF-8 text.
    pub fn str_arg(&self) -> Result<&str, AgentError> {
        let end = self
            .str_arg
            .iter()
            .position(|b| *b == 0)
            .ok_or(AgentError::BadArg)?;
        std::str::from_utf8(&self.str_arg[..end]).map_err(|_| AgentError::IllegalChar)
    }

    /// Read the first `len` bytes of `str_arg` as a binary payload.
    pub fn bin_arg(&self, len: usize) -> Result<&[u8], AgentError> {
        if len > STR_ARG_MAX {
            return Err(AgentError::BadArg);
        }
        Ok(&self.str_arg[..len])
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_LEN);
        buf.put_u32_ne(self.protocol_version);
        buf.put_i32_ne(self.kind);
        buf.put_i32_ne(self.status);
        buf.put_i32_ne(self.int_arg);
        buf.put_i32_ne(self.int_arg2);
        buf.put_u128_ne(self.num_arg);
        buf.put_slice(&self.str_arg);
        buf
    }

    /// Decode a whole frame. The caller guarantees `buf` holds exactly
    /// [`FRAME_LEN`] bytes; version checking happens at the channel layer.
    pub fn decode(buf: &[u8]) -> Result<Self, AgentError> {
        if buf.len() != FRAME_LEN {
            return Err(AgentError::BadRequest);
        }
        let mut buf = buf;
        let protocol_version = buf.get_u32_ne();
        let kind = buf.get_i32_ne();
        let status = buf.get_i32_ne();
        let int_arg = buf.get_i32_ne();
        let int_arg2 = buf.get_i32_ne();
        let num_arg = buf.get_u128_ne();
        let mut str_arg = [0u8; STR_ARG_SIZE];
        buf.copy_to_slice(&mut str_arg);
        Ok(Self {
            protocol_version,
            kind,
            status,
            int_arg,
            int_arg2,
            num_arg,
            str_arg,
        })
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // str_arg may carry key material; never log its contents.
        f.debug_struct("Frame")
            .field("protocol_version", &format_args!("{:#010x}", self.protocol_version))
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("int_arg", &self.int_arg)
            .field("int_arg2", &self.int_arg2)
            .field("num_arg", &self.num_arg)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
