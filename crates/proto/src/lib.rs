//! Protocol implementations for the Skiff security stack.
//!
//! This crate provides the SSH v2 transport core: binary packet
//! framing, packet-level cryptography, streaming compression and the
//! phase-filtered dispatch of incoming packets.
//!
//! # Features
//!
//! - `ssh` (default) - SSH transport core
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh::{Session, SessionConfig};
//!
//! let mut session = Session::new(SessionConfig::default());
//!
//! // Stage an SSH_MSG_IGNORE payload and packetize it.
//! session.stage(&[2, 0, 0, 0, 0]);
//! session.send().unwrap();
//! let wire = session.take_output();
//! assert!(!wire.is_empty());
//! ```
//!
//! # Security
//!
//! - All cryptographic operations use vetted libraries (RustCrypto)
//! - Constant-time MAC comparison via `subtle`
//! - Secure memory handling with `zeroize`
//! - No `unsafe` code
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;
