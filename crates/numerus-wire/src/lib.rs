// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! numerus-wire: the daemon/CLI IPC protocol (`spec.md` §6 CLI surface).
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. See
//! [`framing`] for the length-prefixed `AsyncRead`/`AsyncWrite` helpers and
//! [`Request`]/[`Response`] for the message shapes themselves.

pub mod error;
pub mod framing;
pub mod request;
pub mod response;

pub use error::ProtocolError;
pub use framing::{decode, encode, read_json, read_message, write_json, write_message, MAX_MESSAGE_LEN};
pub use request::Request;
pub use response::Response;
