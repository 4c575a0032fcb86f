//! SSH transport core (RFC 4253).
//!
//! This module implements the secure byte-stream half of an SSH v2
//! session: binary packet framing, packet-level cryptographic
//! processing, streaming compression and the state-filtered dispatch
//! of incoming packets.
//!
//! # Architecture
//!
//! Components, leaves first:
//!
//! 1. **Wire Codec** ([`crypto`]) - cipher and MAC capabilities:
//!    length decryption, MAC verify/compute, cipher apply
//! 2. **Compression Pipe** ([`compress`]) - streaming zlib with partial
//!    flush, bounded against decompression bombs
//! 3. **Packet Reassembler / Packetizer** ([`packet`]) - the
//!    three-state automaton turning byte-stream fragments into
//!    dispatched payloads and the inverse outbound path
//! 4. **Incoming Filter** ([`filter`]) - classifies each packet type
//!    against the session phases
//! 5. **Dispatcher** ([`dispatch`]) - priority-ordered handler bundles
//! 6. **Session State** ([`session`]) - phases, sequence numbers,
//!    cipher suites, channels, counters
//!
//! Key management, signature verification, channel semantics and
//! socket I/O live outside this crate; the core is driven by a single
//! "bytes received" entry point ([`Session::feed`]) and produces
//! outbound buffers the host writes to the transport.
//!
//! # Security Considerations
//!
//! - **Input validation**: declared packet lengths are capped (256 KiB)
//!   before any allocation
//! - **Constant-time operations**: MAC comparison via [`subtle`]
//! - **Memory safety**: MAC keys are zeroized on drop; no `unsafe`
//! - **DoS guards**: inbound decompression is bounded by the packet cap
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh::{Session, SessionConfig};
//! use skiff_proto::ssh::session::Role;
//!
//! let mut session = Session::new(SessionConfig::new(Role::Client));
//!
//! // Stage and packetize an outbound payload.
//! session.stage(&[2, 0, 0, 0, 0]); // SSH_MSG_IGNORE
//! session.send().unwrap();
//! let wire = session.take_output();
//! assert!(wire.len() % 8 == 0);
//! ```
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4419](https://datatracker.ietf.org/doc/html/rfc4419) - DH Group Exchange
//! - [RFC 8308](https://datatracker.ietf.org/doc/html/rfc8308) - Extension Negotiation

pub mod buffer;
pub mod compress;
pub mod crypto;
pub mod dispatch;
pub mod filter;
pub mod message;
pub mod packet;
pub mod session;

// Re-export main types
pub use buffer::PacketBuffer;
pub use compress::{DeflateStream, InflateStream};
pub use crypto::{
    Aes128CtrCipher, Aes256CtrCipher, CipherSuite, HmacSha256, HmacSha512, NoneCipher,
    PacketCipher, PacketMac,
};
pub use dispatch::{default_bundle, Dispatcher, HandlerBundle, HandlerOutcome, PacketHandler};
pub use filter::{incoming_filter, FilterVerdict};
pub use message::MessageType;
pub use packet::Session;
pub use session::{
    AuthPhase, AuthServicePhase, CaptureDirection, CaptureSink, Channel, GlobalRequestPhase,
    IncomingPacket, KexPhase, ReassemblyState, Role, SessionConfig, SessionPhase, SessionState,
    TrafficCounters, MAX_PACKET_LEN,
};
