//! SSH binary packet processing (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! byte[m]   mac (MAC = Message Authentication Code, may be absent)
//! ```
//!
//! # Reassembly
//!
//! Inbound bytes are consumed through [`Session::feed`], a three-state
//! automaton. In `Init` it decrypts the length-field block and
//! bounds-checks the declared length; in `SizeRead` it waits for the
//! remainder, decrypts it, verifies the MAC, strips padding,
//! decompresses, filters the packet against the session phases and
//! dispatches it; `Processing` rejects nested feeds while handlers run.
//! `feed` returns the number of bytes consumed; unconsumed bytes must
//! be presented again on the next call. Multiple complete packets in
//! one call are processed in a loop with an accumulated count.
//!
//! # Packetizer
//!
//! [`SessionState::send`] is the inverse path for the staged outbound
//! payload: compress, pad to the negotiated block size (minimum 4
//! bytes, cryptographically random once a cipher is active), prepend
//! the length header, MAC over `send_seq || cleartext`, encrypt in
//! place and append the wire bytes to the outbound queue the host
//! drains via [`SessionState::take_output`].
//!
//! # Security
//!
//! - A declared length above the configured maximum aborts reassembly
//!   before any further allocation
//! - The MAC is verified before padding or payload are interpreted
//! - Inbound decompression is bounded by the same maximum
//! - On any fatal condition the session enters the error phase and
//!   subsequent feeds are no-ops

use rand::RngCore;
use tracing::{debug, trace};

use skiff_platform::SkiffResult;

use crate::ssh::compress::{DeflateStream, InflateStream};
use crate::ssh::dispatch::{default_bundle, Dispatcher, HandlerBundle};
use crate::ssh::filter::{incoming_filter, FilterVerdict};
use crate::ssh::message::MessageType;
use crate::ssh::session::{
    CaptureDirection, IncomingPacket, ReassemblyState, SessionConfig, SessionState,
};

/// Outcome of one reassembly step.
enum Reassembly {
    /// Not enough input; wait for more bytes.
    Wait,
    /// A complete packet was reassembled and its type parsed.
    Ready {
        /// Wire bytes consumed by this packet.
        wire_len: usize,
    },
}

/// One SSH session: shared state plus the packet dispatcher.
///
/// The session is driven by [`feed`](Self::feed) when bytes arrive and
/// produces outbound wire bytes through the staging buffer. All
/// operations are serialised; one session is owned by exactly one
/// execution context at a time.
pub struct Session {
    state: SessionState,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("state", &self.state).finish()
    }
}

impl Session {
    /// Creates a session with the default handler bundle registered.
    pub fn new(config: SessionConfig) -> Self {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(default_bundle());
        Self {
            state: SessionState::new(config),
            dispatcher,
        }
    }

    /// Read access to the shared session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Mutable access to the shared session state.
    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    /// Registers a handler bundle for a protocol sub-layer.
    pub fn register_handlers(&mut self, bundle: HandlerBundle) {
        self.dispatcher.register(bundle);
    }

    /// Stages payload bytes for the next outbound packet.
    pub fn stage(&mut self, payload: &[u8]) {
        self.state.stage(payload);
    }

    /// Packetizes and queues the staged payload.
    pub fn send(&mut self) -> SkiffResult<()> {
        self.state.send()
    }

    /// Drains the queued outbound wire bytes.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.state.take_output()
    }

    /// Forwards a "transport writable" notification to every channel.
    pub fn on_writable(&mut self) {
        self.state.on_writable();
    }

    /// Consumes received bytes and dispatches every complete packet.
    ///
    /// May be called with any fragment of the byte stream, down to a
    /// single byte. Returns the number of bytes consumed; the caller
    /// must present unconsumed bytes again once more data arrives.
    ///
    /// After a fatal condition the session is in the error phase and
    /// further calls return `Ok(0)` without processing.
    ///
    /// # Errors
    ///
    /// Any FATAL condition (oversize packet, MAC failure, decryption or
    /// decompression failure, invalid padding, filter rejection) moves
    /// the session to the error phase, records a message retrievable
    /// via [`SessionState::last_error`] and surfaces the error.
    pub fn feed(&mut self, data: &[u8]) -> SkiffResult<usize> {
        if self.state.is_error() {
            return Ok(0);
        }

        let mut processed = 0usize;
        loop {
            match self.state.reassemble(&data[processed..])? {
                Reassembly::Wait => return Ok(processed),
                Reassembly::Ready { wire_len } => {
                    let ty = self.state.in_packet().ty;
                    match incoming_filter(&self.state) {
                        FilterVerdict::Allowed => {
                            let payload = self.state.in_payload().to_vec();
                            self.dispatcher.dispatch(&mut self.state, ty, &payload)?;
                        }
                        FilterVerdict::Denied => {
                            return Err(self.state.fatal(format!(
                                "Packet type {} rejected by the incoming filter",
                                ty
                            )));
                        }
                        FilterVerdict::Unknown => {
                            let seq = self.state.recv_seq().wrapping_sub(1);
                            self.state.send_unimplemented(seq)?;
                        }
                    }

                    self.state.packet_state = ReassemblyState::Init;
                    processed += wire_len;

                    // A handler may have torn the session down
                    // (e.g. DISCONNECT); leftover bytes are dead.
                    if self.state.is_error() {
                        return Ok(processed);
                    }
                    if processed >= data.len() {
                        return Ok(processed);
                    }
                    trace!(
                        "processing {} bytes left in input buffer",
                        data.len() - processed
                    );
                }
            }
        }
    }
}

impl SessionState {
    /// Stages payload bytes for the next outbound packet.
    pub fn stage(&mut self, payload: &[u8]) {
        self.out_buffer.append(payload);
    }

    /// Drains the queued outbound wire bytes.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_wire)
    }

    /// Queued outbound wire bytes, without draining them.
    pub fn pending_output(&self) -> &[u8] {
        &self.out_wire
    }

    /// Forwards a "transport writable" notification to every channel.
    pub fn on_writable(&mut self) {
        trace!("sending channel_write_wontblock notification");
        for channel in self.channels_mut() {
            channel.notify_write_wontblock();
        }
    }

    /// Sends an UNIMPLEMENTED reply echoing the sequence number of an
    /// unhandled inbound packet.
    pub fn send_unimplemented(&mut self, sequence: u32) -> SkiffResult<()> {
        let mut payload = Vec::with_capacity(5);
        payload.push(MessageType::Unimplemented as u8);
        payload.extend_from_slice(&sequence.to_be_bytes());
        self.stage(&payload);
        self.send()
    }

    /// Packetizes the staged payload and appends the wire bytes to the
    /// outbound queue.
    ///
    /// In order: optional compression, padding so that
    /// `(total - lenfield_block) mod block == 0` with at least 4
    /// padding bytes, length header, MAC over `send_seq || cleartext`,
    /// in-place encryption. The send sequence number and traffic
    /// counters advance once per packet.
    pub fn send(&mut self) -> SkiffResult<()> {
        let blocksize = self.current_suite.as_ref().map_or(8, |s| s.out_block_size());
        let lenfield = self
            .current_suite
            .as_ref()
            .map_or(0, |s| s.out_lenfield_block_size());
        let payloadsize = self.out_buffer.len();

        let compress = self
            .current_suite
            .as_ref()
            .is_some_and(|s| s.compress_out())
            && payloadsize > 0;
        if compress {
            let level = self.config.compression_level;
            let compressed = match self.current_suite.as_mut() {
                Some(suite) => {
                    let deflate = suite
                        .deflate
                        .get_or_insert_with(|| DeflateStream::new(level));
                    deflate.compress(self.out_buffer.as_slice())
                }
                None => Ok(Vec::new()),
            };
            match compressed {
                Ok(data) => self.out_buffer.replace(&data),
                Err(e) => return Err(self.fatal(format!("Compression error: {}", e))),
            }
        }
        let currentlen = self.out_buffer.len();
        let compsize = currentlen;

        // totallen - lenfield_block must be 0 (mod blocksize).
        let rem = (blocksize as isize - lenfield as isize + currentlen as isize + 5)
            .rem_euclid(blocksize as isize) as usize;
        let mut padding = blocksize - rem;
        if padding < 4 {
            padding += blocksize;
        }

        let mut padstring = vec![0u8; padding];
        if self.current_suite.is_some() {
            rand::thread_rng().fill_bytes(&mut padstring);
        }

        let finallen = (currentlen + padding + 1) as u32;
        let mut header = [0u8; 5];
        header[..4].copy_from_slice(&finallen.to_be_bytes());
        header[4] = padding as u8;
        self.out_buffer.prepend(&header);
        self.out_buffer.append(&padstring);

        if let Some(sink) = self.capture.as_mut() {
            sink.capture(CaptureDirection::Outbound, self.out_buffer.as_slice());
        }

        let sequence = self.send_seq;
        let tag = {
            let result = match self.current_suite.as_mut() {
                Some(suite) => suite.protect(self.out_buffer.as_mut_slice(), sequence),
                None => Ok(None),
            };
            match result {
                Ok(tag) => tag,
                Err(_) => return Err(self.fatal_security("Encryption error".to_string())),
            }
        };

        self.out_wire.extend_from_slice(self.out_buffer.as_slice());
        if let Some(tag) = tag {
            self.out_wire.extend_from_slice(&tag);
        }

        self.bump_send_seq();
        self.count_out(payloadsize);
        debug!(
            "packet: wrote [len={},padding={},comp={},payload={}]",
            finallen, padding, compsize, payloadsize
        );
        self.out_buffer.clear();
        Ok(())
    }

    /// One reassembly step over `data`.
    ///
    /// `data` starts at the first unconsumed wire byte. Returns `Wait`
    /// when more input is needed (nothing consumed) or `Ready` with the
    /// number of wire bytes the completed packet occupied.
    fn reassemble(&mut self, data: &[u8]) -> SkiffResult<Reassembly> {
        let blocksize = self.current_suite.as_ref().map_or(8, |s| s.in_block_size());
        let mut lenfield = self
            .current_suite
            .as_ref()
            .map_or(8, |s| s.in_lenfield_block_size());
        if lenfield == 0 {
            lenfield = blocksize;
        }
        let macsize = self.current_suite.as_ref().map_or(0, |s| s.in_mac_len());

        match self.packet_state {
            ReassemblyState::Processing => {
                trace!("nested packet processing, delaying");
                return Ok(Reassembly::Wait);
            }
            ReassemblyState::Init => {
                if data.len() < lenfield {
                    trace!("waiting for more data ({} < {})", data.len(), lenfield);
                    return Ok(Reassembly::Wait);
                }

                self.in_packet = IncomingPacket::default();
                self.in_buffer.clear();

                let decrypted = {
                    let dst = self.in_buffer.allocate(lenfield);
                    match self.current_suite.as_mut() {
                        Some(suite) => suite.decrypt_length(dst, data),
                        None => {
                            dst.copy_from_slice(&data[..lenfield]);
                            Ok(u32::from_be_bytes([dst[0], dst[1], dst[2], dst[3]]))
                        }
                    }
                };
                let packet_len = match decrypted {
                    Ok(len) => len,
                    Err(_) => return Err(self.fatal("Decryption error".to_string())),
                };

                if packet_len as usize > self.config.max_packet_len {
                    return Err(self.fatal(format!(
                        "Packet len too high ({} {:#06x})",
                        packet_len, packet_len
                    )));
                }
                if (packet_len as usize) + 4 < lenfield {
                    return Err(self.fatal(format!(
                        "Given numbers of bytes left to be read < 0 ({})",
                        packet_len
                    )));
                }

                self.in_packet.len = packet_len;
                self.packet_state = ReassemblyState::SizeRead;
            }
            ReassemblyState::SizeRead => {}
        }

        let packet_len = self.in_packet.len as usize;
        let to_be_read = packet_len + 4 + macsize;
        if data.len() < to_be_read {
            debug!(
                "packet: partial packet (read len) [len={}, have={}, to_be_read={}]",
                packet_len,
                data.len(),
                to_be_read
            );
            return Ok(Reassembly::Wait);
        }

        // Encrypted bytes after the length-field block, MAC excluded.
        let packet_remaining = packet_len + 4 - lenfield;
        let decrypted = {
            let dst = self.in_buffer.allocate(packet_remaining);
            match self.current_suite.as_mut() {
                Some(suite) if packet_remaining > 0 => {
                    suite.decrypt_remaining(dst, &data[lenfield..lenfield + packet_remaining])
                }
                Some(_) => Ok(()),
                None => {
                    dst.copy_from_slice(&data[lenfield..lenfield + packet_remaining]);
                    Ok(())
                }
            }
        };
        if decrypted.is_err() {
            return Err(self.fatal("Decryption error".to_string()));
        }

        if let Some(suite) = self.current_suite.as_ref() {
            let tag = &data[lenfield + packet_remaining..to_be_read];
            if suite
                .verify_mac(self.recv_seq, self.in_buffer.as_slice(), tag)
                .is_err()
            {
                return Err(self.fatal_security("HMAC error".to_string()));
            }
        }

        // The length field has been processed already.
        self.in_buffer.pass_bytes(4);

        let padding = match self.in_buffer.get_u8() {
            Some(padding) => padding,
            None => return Err(self.fatal("Packet too short to read padding".to_string())),
        };
        if padding as usize > self.in_buffer.len() {
            return Err(self.fatal(format!(
                "Invalid padding: {} ({} left)",
                padding,
                self.in_buffer.len()
            )));
        }
        self.in_buffer.pass_bytes_end(padding as usize);
        let compsize = self.in_buffer.len();

        let decompress = self
            .current_suite
            .as_ref()
            .is_some_and(|s| s.compress_in())
            && !self.in_buffer.is_empty();
        if decompress {
            let maxlen = self.config.max_packet_len;
            let inflated = match self.current_suite.as_mut() {
                Some(suite) => {
                    let inflate = suite.inflate.get_or_insert_with(InflateStream::new);
                    inflate.decompress(self.in_buffer.as_slice(), maxlen)
                }
                None => Ok(Vec::new()),
            };
            match inflated {
                Ok(payload) => self.in_buffer.replace(&payload),
                Err(e) => return Err(self.fatal(format!("Decompression error: {}", e))),
            }
        }

        let payloadsize = self.in_buffer.len();
        self.bump_recv_seq();
        self.count_in(payloadsize);
        if let Some(sink) = self.capture.as_mut() {
            sink.capture(CaptureDirection::Inbound, self.in_buffer.as_slice());
        }

        // No new packet may be reassembled while callbacks execute.
        self.packet_state = ReassemblyState::Processing;

        let ty = match self.in_buffer.get_u8() {
            Some(ty) => ty,
            None => return Err(self.fatal("Packet too short to read type".to_string())),
        };
        self.in_packet.ty = ty;
        self.in_packet.valid = true;
        debug!(
            "packet: read type {} [len={},padding={},comp={},payload={}]",
            ty, packet_len, padding, compsize, payloadsize
        );

        Ok(Reassembly::Ready {
            wire_len: to_be_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::dispatch::HandlerOutcome;
    use crate::ssh::session::{KexPhase, Role, SessionPhase};
    use std::sync::{Arc, Mutex};

    /// Server session ready to accept SERVICE_REQUEST (type 5).
    fn authenticating_server() -> Session {
        let mut session = Session::new(SessionConfig::new(Role::Server));
        let state = session.state_mut();
        state.set_session_phase(SessionPhase::Dh).unwrap();
        state.set_session_phase(SessionPhase::Authenticating).unwrap();
        state.set_kex_phase(KexPhase::InitSent).unwrap();
        state.set_kex_phase(KexPhase::NewkeysSent).unwrap();
        state.set_kex_phase(KexPhase::Finished).unwrap();
        session
    }

    fn authenticated_client() -> Session {
        let mut session = Session::new(SessionConfig::new(Role::Client));
        let state = session.state_mut();
        state.set_session_phase(SessionPhase::Dh).unwrap();
        state.set_session_phase(SessionPhase::Authenticating).unwrap();
        state.set_session_phase(SessionPhase::Authenticated).unwrap();
        state.set_kex_phase(KexPhase::InitSent).unwrap();
        state.set_kex_phase(KexPhase::NewkeysSent).unwrap();
        state.set_kex_phase(KexPhase::Finished).unwrap();
        session
    }

    /// Records every dispatched (type, payload) pair.
    fn recording_bundle(seen: Arc<Mutex<Vec<(u8, Vec<u8>)>>>) -> HandlerBundle {
        let mut bundle = HandlerBundle::new(5, 1);
        bundle.set_handler(5, move |_state, ty, payload| {
            seen.lock().unwrap().push((ty, payload.to_vec()));
            HandlerOutcome::Used
        });
        bundle
    }

    #[test]
    fn test_plaintext_round_trip_wire_format() {
        let mut session = authenticating_server();
        let seen = Arc::new(Mutex::new(Vec::new()));
        session.register_handlers(recording_bundle(Arc::clone(&seen)));

        session.stage(&[0x05]);
        session.send().unwrap();
        let wire = session.take_output();

        // packet_length 12, padding_length 10, one payload byte.
        assert_eq!(wire.len(), 16);
        assert_eq!(&wire[..4], &12u32.to_be_bytes());
        assert_eq!(wire[4], 10);
        assert_eq!(wire[5], 0x05);
        assert_eq!(session.state().send_seq(), 1);

        let consumed = session.feed(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(session.state().recv_seq(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 0x05);
        assert!(seen[0].1.is_empty());
    }

    #[test]
    fn test_fragmented_feed_one_byte_at_a_time() {
        let mut session = authenticating_server();
        let seen = Arc::new(Mutex::new(Vec::new()));
        session.register_handlers(recording_bundle(Arc::clone(&seen)));

        session.stage(&[0x05]);
        session.send().unwrap();
        let wire = session.take_output();

        let mut pending: Vec<u8> = Vec::new();
        for (i, byte) in wire.iter().enumerate() {
            pending.push(*byte);
            let consumed = session.feed(&pending).unwrap();
            if i + 1 < wire.len() {
                assert_eq!(consumed, 0, "dispatched before the final byte");
            } else {
                assert_eq!(consumed, pending.len());
            }
            pending.drain(..consumed);
        }

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(session.state().recv_seq(), 1);
    }

    #[test]
    fn test_two_packets_in_one_feed() {
        let mut session = authenticating_server();
        let seen = Arc::new(Mutex::new(Vec::new()));
        session.register_handlers(recording_bundle(Arc::clone(&seen)));

        session.stage(&[0x05, 0xaa]);
        session.send().unwrap();
        session.stage(&[0x05, 0xbb]);
        session.send().unwrap();
        let wire = session.take_output();

        let consumed = session.feed(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(session.state().recv_seq(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, vec![0xaa]);
        assert_eq!(seen[1].1, vec![0xbb]);
    }

    #[test]
    fn test_filter_reject_moves_session_to_error() {
        // USERAUTH_REQUEST while still in the initial key exchange.
        let mut session = Session::new(SessionConfig::new(Role::Server));

        let mut sender = authenticating_server();
        sender.stage(&[50]);
        sender.send().unwrap();
        let wire = sender.take_output();

        let result = session.feed(&wire);
        assert!(result.is_err());
        assert!(session.state().is_error());
        assert!(session
            .state()
            .last_error()
            .unwrap()
            .contains("rejected by the incoming filter"));

        // Subsequent feeds are no-ops.
        assert_eq!(session.feed(&wire).unwrap(), 0);
    }

    #[test]
    fn test_unknown_type_sends_unimplemented() {
        let mut session = authenticated_client();

        let mut sender = authenticating_server();
        sender.stage(&[200]);
        sender.send().unwrap();
        let wire = sender.take_output();

        let consumed = session.feed(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert!(matches!(
            session.state().session_phase(),
            SessionPhase::Authenticated
        ));
        assert_eq!(session.state().recv_seq(), 1);

        // UNIMPLEMENTED reply echoing sequence number 0.
        let reply = session.take_output();
        assert_eq!(reply[5], MessageType::Unimplemented as u8);
        assert_eq!(&reply[6..10], &0u32.to_be_bytes());
    }

    #[test]
    fn test_oversize_declared_length_is_fatal() {
        let mut session = authenticating_server();

        let oversize = (session.state().config().max_packet_len + 1) as u32;
        let mut wire = Vec::new();
        wire.extend_from_slice(&oversize.to_be_bytes());
        wire.extend_from_slice(&[0u8; 4]);

        let result = session.feed(&wire);
        assert!(result.is_err());
        assert!(session.state().is_error());
        assert!(session.state().last_error().unwrap().contains("Packet len too high"));
    }

    #[test]
    fn test_undersize_declared_length_is_fatal() {
        // The declared length must cover at least the length-field
        // block: with the plaintext block size of 8, packet_len 2 + 4
        // leaves a negative remainder.
        let mut session = authenticating_server();

        let mut wire = Vec::new();
        wire.extend_from_slice(&2u32.to_be_bytes());
        wire.extend_from_slice(&[0u8; 4]);
        let result = session.feed(&wire);
        assert!(result.is_err());
        assert!(session.state().is_error());
    }

    #[test]
    fn test_invalid_padding_is_fatal() {
        let mut session = authenticating_server();

        // packet_length 12, padding_length 200 > available bytes.
        let mut wire = Vec::new();
        wire.extend_from_slice(&12u32.to_be_bytes());
        wire.push(200);
        wire.extend_from_slice(&[0u8; 11]);

        let result = session.feed(&wire);
        assert!(result.is_err());
        assert!(session.state().last_error().unwrap().contains("Invalid padding"));
    }

    #[test]
    fn test_processing_state_blocks_nested_feed() {
        let mut session = authenticating_server();
        session.state_mut().packet_state = ReassemblyState::Processing;

        let wire = vec![0u8; 64];
        assert_eq!(session.feed(&wire).unwrap(), 0);
    }

    #[test]
    fn test_empty_payload_packet_is_fatal() {
        // A packet whose payload is consumed entirely by padding has no
        // type byte to parse.
        let mut session = authenticating_server();

        let mut wire = Vec::new();
        wire.extend_from_slice(&11u32.to_be_bytes());
        wire.push(10);
        wire.extend_from_slice(&[0u8; 10]);

        let result = session.feed(&wire);
        assert!(result.is_err());
        assert!(session
            .state()
            .last_error()
            .unwrap()
            .contains("Packet too short to read type"));
    }

    #[test]
    fn test_disconnect_stops_processing_leftover_bytes() {
        let mut session = authenticating_server();

        let mut sender = authenticating_server();
        // DISCONNECT followed by another packet that must not be seen.
        let mut disconnect = Vec::new();
        disconnect.push(1u8);
        disconnect.extend_from_slice(&11u32.to_be_bytes());
        disconnect.extend_from_slice(&0u32.to_be_bytes());
        sender.stage(&disconnect);
        sender.send().unwrap();
        sender.stage(&[0x05]);
        sender.send().unwrap();
        let wire = sender.take_output();

        let consumed = session.feed(&wire).unwrap();
        assert!(consumed < wire.len());
        assert!(session.state().is_error());
        assert_eq!(session.state().recv_seq(), 1);
    }

    #[test]
    fn test_counters_track_payload_sizes() {
        let mut session = authenticating_server();
        let seen = Arc::new(Mutex::new(Vec::new()));
        session.register_handlers(recording_bundle(Arc::clone(&seen)));

        session.stage(&[0x05, 1, 2, 3]);
        session.send().unwrap();
        let wire = session.take_output();
        session.feed(&wire).unwrap();

        let counters = session.state().counters();
        assert_eq!(counters.out_packets, 1);
        assert_eq!(counters.out_bytes, 4);
        assert_eq!(counters.in_packets, 1);
        assert_eq!(counters.in_bytes, 4);
    }

    #[test]
    fn test_capture_sink_sees_both_directions() {
        struct Recorder(Arc<Mutex<Vec<(CaptureDirection, usize)>>>);
        impl crate::ssh::session::CaptureSink for Recorder {
            fn capture(&mut self, direction: CaptureDirection, data: &[u8]) {
                self.0.lock().unwrap().push((direction, data.len()));
            }
        }

        let mut session = authenticating_server();
        let seen = Arc::new(Mutex::new(Vec::new()));
        session
            .state_mut()
            .set_capture_sink(Box::new(Recorder(Arc::clone(&seen))));
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        session.register_handlers(recording_bundle(Arc::clone(&dispatched)));

        session.stage(&[0x05]);
        session.send().unwrap();
        let wire = session.take_output();
        session.feed(&wire).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, CaptureDirection::Outbound);
        assert_eq!(seen[1].0, CaptureDirection::Inbound);
    }

    #[test]
    fn test_flow_control_notifies_channels() {
        use crate::ssh::session::Channel;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut session = authenticated_client();
        let notified = Arc::new(AtomicUsize::new(0));
        for id in 0..3 {
            let mut channel = Channel::new(id, id + 100, 4096);
            let notified = Arc::clone(&notified);
            channel.on_write_wontblock(move |window| {
                assert_eq!(window, 4096);
                notified.fetch_add(1, Ordering::SeqCst);
            });
            session.state_mut().add_channel(channel);
        }

        session.on_writable();
        assert_eq!(notified.load(Ordering::SeqCst), 3);
    }
}
