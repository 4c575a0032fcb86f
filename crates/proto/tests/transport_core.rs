//! End-to-end tests for the SSH transport core: packetize feeds into
//! reassembly across cipher suites, fragmentation patterns, compression
//! and tampering.

use std::sync::{Arc, Mutex};

use skiff_proto::ssh::dispatch::{HandlerBundle, HandlerOutcome};
use skiff_proto::ssh::session::{KexPhase, Role, SessionConfig, SessionPhase};
use skiff_proto::ssh::{
    Aes256CtrCipher, CipherSuite, HmacSha256, Session, MAX_PACKET_LEN,
};

const KEY_C2S: [u8; 32] = [0x11; 32];
const KEY_S2C: [u8; 32] = [0x22; 32];
const IV_C2S: [u8; 16] = [0x33; 16];
const IV_S2C: [u8; 16] = [0x44; 16];
const MAC_C2S: [u8; 32] = [0x55; 32];
const MAC_S2C: [u8; 32] = [0x66; 32];

/// Client-side suite: encrypts client-to-server, decrypts server-to-client.
fn client_suite() -> CipherSuite {
    CipherSuite::new(
        Box::new(Aes256CtrCipher::new(&KEY_S2C, &IV_S2C).unwrap()),
        Box::new(Aes256CtrCipher::new(&KEY_C2S, &IV_C2S).unwrap()),
        Some(Box::new(HmacSha256::new(&MAC_S2C).unwrap())),
        Some(Box::new(HmacSha256::new(&MAC_C2S).unwrap())),
    )
}

/// Server-side mirror of [`client_suite`].
fn server_suite() -> CipherSuite {
    CipherSuite::new(
        Box::new(Aes256CtrCipher::new(&KEY_C2S, &IV_C2S).unwrap()),
        Box::new(Aes256CtrCipher::new(&KEY_S2C, &IV_S2C).unwrap()),
        Some(Box::new(HmacSha256::new(&MAC_C2S).unwrap())),
        Some(Box::new(HmacSha256::new(&MAC_S2C).unwrap())),
    )
}

fn advance_to_authenticating(session: &mut Session) {
    let state = session.state_mut();
    state.set_session_phase(SessionPhase::Dh).unwrap();
    state.set_session_phase(SessionPhase::Authenticating).unwrap();
    state.set_kex_phase(KexPhase::InitSent).unwrap();
    state.set_kex_phase(KexPhase::NewkeysSent).unwrap();
    state.set_kex_phase(KexPhase::Finished).unwrap();
}

/// Server session with a recording handler for SERVICE_REQUEST (type 5).
fn recording_server(suite: Option<CipherSuite>) -> (Session, Arc<Mutex<Vec<Vec<u8>>>>) {
    let mut session = Session::new(SessionConfig::new(Role::Server));
    advance_to_authenticating(&mut session);
    if let Some(suite) = suite {
        session.state_mut().install_next_suite(suite);
        session.state_mut().activate_next_suite().unwrap();
    }

    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let mut bundle = HandlerBundle::new(5, 1);
    bundle.set_handler(5, move |_state, _ty, payload| {
        seen_clone.lock().unwrap().push(payload.to_vec());
        HandlerOutcome::Used
    });
    session.register_handlers(bundle);

    (session, seen)
}

/// Client session with the client half of the suite installed.
fn client_with(suite: Option<CipherSuite>) -> Session {
    let mut session = Session::new(SessionConfig::new(Role::Client));
    advance_to_authenticating(&mut session);
    if let Some(suite) = suite {
        session.state_mut().install_next_suite(suite);
        session.state_mut().activate_next_suite().unwrap();
    }
    session
}

fn packetize(session: &mut Session, payload: &[u8]) -> Vec<u8> {
    session.stage(payload);
    session.send().unwrap();
    session.take_output()
}

#[test]
fn test_plaintext_round_trip() {
    let (mut server, seen) = recording_server(None);
    let mut client = client_with(None);

    let wire = packetize(&mut client, &[5]);
    assert_eq!(&wire[..4], &12u32.to_be_bytes());
    assert_eq!(wire[4], 10);

    let consumed = server.feed(&wire).unwrap();
    assert_eq!(consumed, wire.len());
    assert_eq!(server.state().recv_seq(), 1);
    assert_eq!(seen.lock().unwrap().as_slice(), &[Vec::<u8>::new()]);
}

#[test]
fn test_identity_suite_round_trip() {
    // The "none" suite exercises the suite-present code paths without
    // encryption or MAC.
    let (mut server, seen) = recording_server(Some(CipherSuite::none()));
    let mut client = client_with(Some(CipherSuite::none()));

    let payload: Vec<u8> = std::iter::once(5u8).chain((0..100).map(|i| i as u8)).collect();
    let wire = packetize(&mut client, &payload);

    let consumed = server.feed(&wire).unwrap();
    assert_eq!(consumed, wire.len());
    assert_eq!(seen.lock().unwrap()[0], payload[1..]);
}

#[test]
fn test_encrypted_round_trip() {
    let (mut server, seen) = recording_server(Some(server_suite()));
    let mut client = client_with(Some(client_suite()));

    let payload: Vec<u8> = std::iter::once(5u8).chain((0..300).map(|i| i as u8)).collect();
    let wire = packetize(&mut client, &payload);

    // Ciphertext must not leak the payload.
    assert_ne!(&wire[5..5 + 10], &payload[..10]);

    let consumed = server.feed(&wire).unwrap();
    assert_eq!(consumed, wire.len());
    assert_eq!(server.state().recv_seq(), 1);
    assert_eq!(seen.lock().unwrap()[0], payload[1..]);
}

#[test]
fn test_encrypted_multi_packet_stream() {
    let (mut server, seen) = recording_server(Some(server_suite()));
    let mut client = client_with(Some(client_suite()));

    let mut wire = Vec::new();
    for i in 0..5u8 {
        client.stage(&[5, i]);
        client.send().unwrap();
        wire.extend_from_slice(&client.take_output());
    }

    let consumed = server.feed(&wire).unwrap();
    assert_eq!(consumed, wire.len());
    assert_eq!(server.state().recv_seq(), 5);

    let seen = seen.lock().unwrap();
    let expected: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i]).collect();
    assert_eq!(seen.as_slice(), expected.as_slice());
}

#[test]
fn test_fragmentation_invariance() {
    // The dispatched payload sequence is identical for every partition
    // of the same wire bytes.
    let mut client = client_with(Some(client_suite()));
    let mut wire = Vec::new();
    for i in 0..3u8 {
        client.stage(&[5, i, i, i]);
        client.send().unwrap();
        wire.extend_from_slice(&client.take_output());
    }

    let mut reference: Option<Vec<Vec<u8>>> = None;
    for chunk_size in [1usize, 3, 7, 16, 64, wire.len()] {
        let (mut server, seen) = recording_server(Some(server_suite()));

        let mut pending: Vec<u8> = Vec::new();
        for chunk in wire.chunks(chunk_size) {
            pending.extend_from_slice(chunk);
            let consumed = server.feed(&pending).unwrap();
            pending.drain(..consumed);
        }
        assert!(pending.is_empty());

        let dispatched = seen.lock().unwrap().clone();
        assert_eq!(dispatched.len(), 3);
        match &reference {
            Some(reference) => assert_eq!(&dispatched, reference),
            None => reference = Some(dispatched),
        }
    }
}

#[test]
fn test_padding_invariant_across_payload_sizes() {
    for len in 1..=70usize {
        let mut plain = client_with(None);
        let mut payload = vec![5u8];
        payload.resize(len, 0xab);
        let wire = packetize(&mut plain, &payload);
        // No cipher: 8-byte blocks, visible padding byte.
        assert_eq!(wire.len() % 8, 0, "payload len {}", len);
        assert!(wire[4] >= 4, "payload len {}", len);

        let mut encrypted = client_with(Some(client_suite()));
        let wire = packetize(&mut encrypted, &payload);
        // AES-CTR: 16-byte blocks plus a 32-byte MAC.
        assert_eq!((wire.len() - 32) % 16, 0, "payload len {}", len);
    }
}

#[test]
fn test_mac_tamper_is_fatal() {
    let mut client = client_with(Some(client_suite()));
    let wire = packetize(&mut client, &[5, 1, 2, 3]);
    let mac_start = wire.len() - 32;

    for flip in [mac_start, mac_start + 15, wire.len() - 1] {
        let (mut server, seen) = recording_server(Some(server_suite()));
        let mut tampered = wire.clone();
        tampered[flip] ^= 0x01;

        let result = server.feed(&tampered);
        assert!(result.is_err());
        assert!(server.state().is_error());
        assert_eq!(server.state().last_error(), Some("HMAC error"));
        assert!(seen.lock().unwrap().is_empty());
    }
}

#[test]
fn test_ciphertext_tamper_is_fatal() {
    let mut client = client_with(Some(client_suite()));
    let payload: Vec<u8> = std::iter::once(5u8).chain((0..300).map(|i| i as u8)).collect();
    let wire = packetize(&mut client, &payload);

    // Flip a bit in the encrypted body (past the length block so the
    // declared length stays plausible).
    for flip in [16usize, 100, wire.len() - 33] {
        let (mut server, seen) = recording_server(Some(server_suite()));
        let mut tampered = wire.clone();
        tampered[flip] ^= 0x80;

        let result = server.feed(&tampered);
        assert!(result.is_err());
        assert!(server.state().is_error());
        assert!(seen.lock().unwrap().is_empty());
    }
}

#[test]
fn test_compression_round_trip() {
    let (mut server, seen) =
        recording_server(Some(server_suite().with_compression(true, true)));
    let mut client = client_with(Some(client_suite().with_compression(true, true)));

    let mut payload = vec![5u8];
    payload.extend_from_slice(&vec![0u8; 10_000]);
    let wire = packetize(&mut client, &payload);

    // At least an order of magnitude smaller on the wire.
    assert!(wire.len() * 10 < payload.len());

    let consumed = server.feed(&wire).unwrap();
    assert_eq!(consumed, wire.len());
    assert_eq!(seen.lock().unwrap()[0], payload[1..]);
}

#[test]
fn test_compression_state_carries_across_packets() {
    let (mut server, seen) =
        recording_server(Some(server_suite().with_compression(true, true)));
    let mut client = client_with(Some(client_suite().with_compression(true, true)));

    for i in 0..8u8 {
        let mut payload = vec![5u8];
        payload.extend_from_slice(&vec![i; 500]);
        let wire = packetize(&mut client, &payload);
        let consumed = server.feed(&wire).unwrap();
        assert_eq!(consumed, wire.len());
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 8);
    for (i, payload) in seen.iter().enumerate() {
        assert_eq!(payload, &vec![i as u8; 500]);
    }
}

#[test]
fn test_decompression_bomb_is_fatal() {
    let (mut server, seen) =
        recording_server(Some(server_suite().with_compression(true, true)));
    let mut client = client_with(Some(client_suite().with_compression(true, true)));

    // Inflates past MAX_PACKET_LEN on the receiving side.
    let mut payload = vec![5u8];
    payload.extend_from_slice(&vec![0u8; MAX_PACKET_LEN + 64 * 1024]);
    let wire = packetize(&mut client, &payload);
    assert!(wire.len() < MAX_PACKET_LEN);

    let result = server.feed(&wire);
    assert!(result.is_err());
    assert!(server.state().is_error());
    assert!(server
        .state()
        .last_error()
        .unwrap()
        .contains("Decompression error"));
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_oversize_packet_is_fatal() {
    let (mut server, _seen) = recording_server(None);

    let mut wire = Vec::new();
    wire.extend_from_slice(&((MAX_PACKET_LEN + 1) as u32).to_be_bytes());
    wire.extend_from_slice(&[0u8; 4]);

    let result = server.feed(&wire);
    assert!(result.is_err());
    assert!(server.state().is_error());
}

#[test]
fn test_filter_rejects_userauth_during_initial_kex() {
    let mut server = Session::new(SessionConfig::new(Role::Server));
    let mut client = client_with(None);

    let wire = packetize(&mut client, &[50]);
    let result = server.feed(&wire);
    assert!(result.is_err());
    assert!(server.state().is_error());
}

#[test]
fn test_unknown_type_gets_unimplemented_reply() {
    let mut server = Session::new(SessionConfig::new(Role::Server));
    advance_to_authenticating(&mut server);
    server
        .state_mut()
        .set_session_phase(SessionPhase::Authenticated)
        .unwrap();
    let mut client = client_with(None);

    let wire = packetize(&mut client, &[200]);
    let consumed = server.feed(&wire).unwrap();
    assert_eq!(consumed, wire.len());
    assert!(matches!(
        server.state().session_phase(),
        SessionPhase::Authenticated
    ));

    let reply = server.take_output();
    assert_eq!(reply[5], 3);
    assert_eq!(&reply[6..10], &0u32.to_be_bytes());
}

#[test]
fn test_sequence_numbers_stay_consecutive() {
    let (mut server, _seen) = recording_server(Some(server_suite()));
    let mut client = client_with(Some(client_suite()));

    for expected in 1..=20u32 {
        let wire = packetize(&mut client, &[5, 9]);
        server.feed(&wire).unwrap();
        assert_eq!(client.state().send_seq(), expected);
        assert_eq!(server.state().recv_seq(), expected);
    }
}

#[test]
fn test_traffic_counters_accumulate() {
    let (mut server, _seen) = recording_server(Some(server_suite()));
    let mut client = client_with(Some(client_suite()));

    for _ in 0..4 {
        let wire = packetize(&mut client, &[5, 0, 0, 0]);
        server.feed(&wire).unwrap();
    }

    assert_eq!(client.state().counters().out_packets, 4);
    assert_eq!(client.state().counters().out_bytes, 16);
    assert_eq!(server.state().counters().in_packets, 4);
    assert_eq!(server.state().counters().in_bytes, 16);
}
