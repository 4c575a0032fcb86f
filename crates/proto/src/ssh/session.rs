//! Session state for the SSH transport core.
//!
//! A session is the long-lived entity all packet-layer components
//! share: the phase machines that gate which packet types are accepted,
//! the negotiated cipher suites, the sequence numbers, the reassembly
//! and staging buffers, the channel list and the traffic counters.
//!
//! # Phase machines
//!
//! The session phase advances monotonically through
//! `InitialKex -> Dh -> Authenticating -> Authenticated`, with one
//! permitted backward revisit (`Authenticated -> Dh -> Authenticated`)
//! for re-keying, and `Error` reachable from anywhere. The key-exchange
//! phase runs `Init -> InitSent -> NewkeysSent -> Finished` and returns
//! to `Init` on re-key. The authentication, authentication-service and
//! global-request sub-phases are owned by the respective protocol
//! layers and are plain setters here.
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh::session::{Role, SessionConfig, SessionPhase, SessionState};
//!
//! let state = SessionState::new(SessionConfig::new(Role::Client));
//! assert!(matches!(state.session_phase(), SessionPhase::InitialKex));
//! ```

use skiff_platform::{SkiffError, SkiffResult};
use tracing::warn;

use crate::ssh::buffer::PacketBuffer;
use crate::ssh::crypto::CipherSuite;

/// Maximum accepted packet length in bytes (256 KiB).
///
/// A decrypted length above this aborts reassembly before any further
/// allocation, and inbound decompression is bounded by the same cap.
pub const MAX_PACKET_LEN: usize = 256 * 1024;

/// Session role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting side.
    Client,
    /// Accepting side.
    Server,
}

/// Top-level session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Initial key exchange has not completed.
    InitialKex,
    /// Diffie-Hellman exchange in progress (initial or re-key).
    Dh,
    /// Transport established, user not yet authenticated.
    Authenticating,
    /// User authenticated; connection layer active.
    Authenticated,
    /// Fatal condition; the session is dead.
    Error,
}

/// Key-exchange phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexPhase {
    /// No exchange message sent yet.
    Init,
    /// Our exchange init is on the wire.
    InitSent,
    /// NEWKEYS sent, waiting for the peer's.
    NewkeysSent,
    /// Keys installed; exchange complete.
    Finished,
}

/// Authentication sub-phase, owned by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// No authentication attempted yet.
    None,
    /// "none" method sent.
    NoneSent,
    /// Public key offered (without signature).
    PubkeyOfferSent,
    /// Signed public key request sent.
    PubkeyAuthSent,
    /// Password request sent.
    PasswordAuthSent,
    /// Keyboard-interactive request sent.
    KbdintSent,
    /// Keyboard-interactive info exchange in progress.
    Info,
    /// GSSAPI request sent.
    GssapiRequestSent,
    /// GSSAPI token exchange in progress.
    GssapiToken,
    /// GSSAPI MIC sent.
    GssapiMicSent,
    /// Authentication succeeded.
    Success,
    /// Partial success; more methods required.
    Partial,
    /// Authentication failed.
    Failed,
    /// Authentication errored.
    Error,
}

/// Authentication service request phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthServicePhase {
    /// No service requested.
    None,
    /// "ssh-userauth" service request sent.
    Sent,
    /// Service accepted by the peer.
    Accepted,
}

/// Global-request phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalRequestPhase {
    /// No request outstanding.
    None,
    /// Request sent, reply pending.
    Pending,
    /// Peer accepted.
    Accepted,
    /// Peer denied.
    Denied,
}

/// Reassembly automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// No bytes of the next packet are held.
    Init,
    /// The length-field block is decrypted; the declared length is known.
    SizeRead,
    /// Packet callbacks are running; nested feeds must not consume.
    Processing,
}

/// Metadata of the packet currently being reassembled.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncomingPacket {
    /// Message type byte, valid once `valid` is set.
    pub ty: u8,
    /// Declared packet length.
    pub len: u32,
    /// Whether the type byte has been parsed.
    pub valid: bool,
}

/// Raw traffic counters (payload bytes and packet counts).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    /// Payload bytes received.
    pub in_bytes: u64,
    /// Payload bytes sent.
    pub out_bytes: u64,
    /// Packets received.
    pub in_packets: u64,
    /// Packets sent.
    pub out_packets: u64,
}

/// Direction tag for captured packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDirection {
    /// Packet received from the peer.
    Inbound,
    /// Packet sent to the peer.
    Outbound,
}

/// Observer receiving each cleartext packet (pcap-style hook).
///
/// Outbound packets are captured before encryption, inbound packets
/// after decryption and decompression.
pub trait CaptureSink: Send {
    /// Called once per packet with its direction and cleartext bytes.
    fn capture(&mut self, direction: CaptureDirection, data: &[u8]);
}

/// One multiplexed channel registered on the session.
///
/// Channel semantics (window management, data routing) live in the
/// connection layer; the session only tracks the registered set so the
/// flow-control fan-out can reach every channel.
pub struct Channel {
    local_id: u32,
    remote_id: u32,
    remote_window: u32,
    write_wontblock: Option<Box<dyn FnMut(u32) + Send>>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .field("remote_window", &self.remote_window)
            .finish()
    }
}

impl Channel {
    /// Creates a channel record.
    pub fn new(local_id: u32, remote_id: u32, remote_window: u32) -> Self {
        Self {
            local_id,
            remote_id,
            remote_window,
            write_wontblock: None,
        }
    }

    /// Local channel number.
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Peer channel number.
    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    /// Current remote window.
    pub fn remote_window(&self) -> u32 {
        self.remote_window
    }

    /// Updates the remote window.
    pub fn set_remote_window(&mut self, window: u32) {
        self.remote_window = window;
    }

    /// Registers the "channel may write" callback, invoked with the
    /// current remote window when the transport becomes writable.
    pub fn on_write_wontblock<F>(&mut self, callback: F)
    where
        F: FnMut(u32) + Send + 'static,
    {
        self.write_wontblock = Some(Box::new(callback));
    }

    pub(crate) fn notify_write_wontblock(&mut self) {
        let window = self.remote_window;
        if let Some(cb) = self.write_wontblock.as_mut() {
            cb(window);
        }
    }
}

/// Session configuration, constructed by the host.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether this side is the client or the server.
    pub role: Role,
    /// Outbound zlib compression level (1-9).
    pub compression_level: u32,
    /// Maximum accepted packet length.
    pub max_packet_len: usize,
}

impl SessionConfig {
    /// Creates a configuration for the given role with defaults.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            compression_level: 6,
            max_packet_len: MAX_PACKET_LEN,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Role::Client)
    }
}

/// Shared state of one SSH session.
///
/// Owned by a [`Session`](crate::ssh::packet::Session) and handed to
/// packet handlers during dispatch. All mutation happens on well-defined
/// transitions driven by the packet layer and the protocol sub-layers.
pub struct SessionState {
    pub(crate) config: SessionConfig,
    session_phase: SessionPhase,
    kex_phase: KexPhase,
    auth_phase: AuthPhase,
    auth_service: AuthServicePhase,
    global_request: GlobalRequestPhase,
    pub(crate) current_suite: Option<CipherSuite>,
    next_suite: Option<CipherSuite>,
    pub(crate) send_seq: u32,
    pub(crate) recv_seq: u32,
    pub(crate) packet_state: ReassemblyState,
    pub(crate) in_packet: IncomingPacket,
    pub(crate) in_buffer: PacketBuffer,
    pub(crate) out_buffer: PacketBuffer,
    pub(crate) out_wire: Vec<u8>,
    channels: Vec<Channel>,
    counters: TrafficCounters,
    pub(crate) capture: Option<Box<dyn CaptureSink>>,
    last_error: Option<String>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("role", &self.config.role)
            .field("session_phase", &self.session_phase)
            .field("kex_phase", &self.kex_phase)
            .field("auth_phase", &self.auth_phase)
            .field("packet_state", &self.packet_state)
            .field("send_seq", &self.send_seq)
            .field("recv_seq", &self.recv_seq)
            .finish()
    }
}

impl SessionState {
    /// Creates session state in the initial key-exchange phase.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            session_phase: SessionPhase::InitialKex,
            kex_phase: KexPhase::Init,
            auth_phase: AuthPhase::None,
            auth_service: AuthServicePhase::None,
            global_request: GlobalRequestPhase::None,
            current_suite: None,
            next_suite: None,
            send_seq: 0,
            recv_seq: 0,
            packet_state: ReassemblyState::Init,
            in_packet: IncomingPacket::default(),
            in_buffer: PacketBuffer::new(),
            out_buffer: PacketBuffer::new(),
            out_wire: Vec::new(),
            channels: Vec::new(),
            counters: TrafficCounters::default(),
            capture: None,
            last_error: None,
        }
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session role.
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Current session phase.
    pub fn session_phase(&self) -> SessionPhase {
        self.session_phase
    }

    /// Current key-exchange phase.
    pub fn kex_phase(&self) -> KexPhase {
        self.kex_phase
    }

    /// Current authentication sub-phase.
    pub fn auth_phase(&self) -> AuthPhase {
        self.auth_phase
    }

    /// Current authentication service phase.
    pub fn auth_service(&self) -> AuthServicePhase {
        self.auth_service
    }

    /// Current global-request phase.
    pub fn global_request(&self) -> GlobalRequestPhase {
        self.global_request
    }

    /// Returns true once the session hit a fatal condition.
    pub fn is_error(&self) -> bool {
        matches!(self.session_phase, SessionPhase::Error)
    }

    /// Human-readable message of the last fatal condition.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Next outbound sequence number.
    pub fn send_seq(&self) -> u32 {
        self.send_seq
    }

    /// Next expected inbound sequence number.
    pub fn recv_seq(&self) -> u32 {
        self.recv_seq
    }

    /// Traffic counters.
    pub fn counters(&self) -> TrafficCounters {
        self.counters
    }

    /// Metadata of the packet currently in reassembly.
    pub fn in_packet(&self) -> IncomingPacket {
        self.in_packet
    }

    /// The inbound payload, valid only during handler execution.
    pub fn in_payload(&self) -> &[u8] {
        self.in_buffer.as_slice()
    }

    /// The negotiated cipher suite, absent before the first NEWKEYS.
    pub fn current_suite(&self) -> Option<&CipherSuite> {
        self.current_suite.as_ref()
    }

    /// Stages the suite negotiated by a (re-)key exchange.
    pub fn install_next_suite(&mut self, suite: CipherSuite) {
        self.next_suite = Some(suite);
    }

    /// Moves the staged suite into place at NEWKEYS time.
    pub fn activate_next_suite(&mut self) -> SkiffResult<()> {
        match self.next_suite.take() {
            Some(suite) => {
                self.current_suite = Some(suite);
                Ok(())
            }
            None => Err(SkiffError::Protocol(
                "No pending cipher suite to activate".to_string(),
            )),
        }
    }

    /// Transitions the session phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition violates the monotonic
    /// ordering (with the re-key revisit as the only backward edge).
    pub fn set_session_phase(&mut self, next: SessionPhase) -> SkiffResult<()> {
        let valid = match (self.session_phase, next) {
            (s1, s2) if s1 == s2 => true,
            (_, SessionPhase::Error) => true,
            (SessionPhase::InitialKex, SessionPhase::Dh) => true,
            (SessionPhase::Dh, SessionPhase::Authenticating) => true,
            // Re-key completion returns straight to Authenticated.
            (SessionPhase::Dh, SessionPhase::Authenticated) => true,
            (SessionPhase::Authenticating, SessionPhase::Authenticated) => true,
            (SessionPhase::Authenticated, SessionPhase::Dh) => true,
            _ => false,
        };

        if !valid {
            return Err(SkiffError::Protocol(format!(
                "Invalid session phase transition: {:?} -> {:?}",
                self.session_phase, next
            )));
        }

        self.session_phase = next;
        Ok(())
    }

    /// Transitions the key-exchange phase.
    pub fn set_kex_phase(&mut self, next: KexPhase) -> SkiffResult<()> {
        let valid = match (self.kex_phase, next) {
            (s1, s2) if s1 == s2 => true,
            (KexPhase::Init, KexPhase::InitSent) => true,
            (KexPhase::InitSent, KexPhase::NewkeysSent) => true,
            (KexPhase::NewkeysSent, KexPhase::Finished) => true,
            // Re-key starts the exchange over.
            (KexPhase::Finished, KexPhase::Init) => true,
            _ => false,
        };

        if !valid {
            return Err(SkiffError::Protocol(format!(
                "Invalid kex phase transition: {:?} -> {:?}",
                self.kex_phase, next
            )));
        }

        self.kex_phase = next;
        Ok(())
    }

    /// Sets the authentication sub-phase (owned by the auth layer).
    pub fn set_auth_phase(&mut self, phase: AuthPhase) {
        self.auth_phase = phase;
    }

    /// Sets the authentication service phase.
    pub fn set_auth_service(&mut self, phase: AuthServicePhase) {
        self.auth_service = phase;
    }

    /// Sets the global-request phase.
    pub fn set_global_request(&mut self, phase: GlobalRequestPhase) {
        self.global_request = phase;
    }

    /// Installs a capture sink receiving every cleartext packet.
    pub fn set_capture_sink(&mut self, sink: Box<dyn CaptureSink>) {
        self.capture = Some(sink);
    }

    /// Registers a channel.
    pub fn add_channel(&mut self, channel: Channel) {
        self.channels.push(channel);
    }

    /// Removes a channel by local id.
    pub fn remove_channel(&mut self, local_id: u32) {
        self.channels.retain(|c| c.local_id() != local_id);
    }

    /// The registered channels.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// The registered channels, mutable (for dispatched handlers).
    pub fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels
    }

    /// Records a fatal condition: stores the message and moves the
    /// session to the error phase. Subsequent feeds are no-ops.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("session fatal: {}", message);
        self.last_error = Some(message);
        self.session_phase = SessionPhase::Error;
    }

    pub(crate) fn fatal(&mut self, message: String) -> SkiffError {
        self.fail(message.clone());
        SkiffError::Protocol(message)
    }

    pub(crate) fn fatal_security(&mut self, message: String) -> SkiffError {
        self.fail(message.clone());
        SkiffError::Security(message)
    }

    pub(crate) fn bump_recv_seq(&mut self) {
        self.recv_seq = self.recv_seq.wrapping_add(1);
    }

    pub(crate) fn bump_send_seq(&mut self) {
        self.send_seq = self.send_seq.wrapping_add(1);
    }

    pub(crate) fn count_in(&mut self, payload_bytes: usize) {
        self.counters.in_bytes += payload_bytes as u64;
        self.counters.in_packets += 1;
    }

    pub(crate) fn count_out(&mut self, payload_bytes: usize) {
        self.counters.out_bytes += payload_bytes as u64;
        self.counters.out_packets += 1;
    }
}
