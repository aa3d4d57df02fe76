// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! §8 items 6-7: handshake signature forgery and session record tamper
//! rejection, exercised only through the public crate API.

use overlay_node::{
    Identity,
    crypto::{EphemeralKeypair, MAX_CIPHERTEXT, SecureSocket, build_handshake_blob, derive_session_key, verify_handshake_blob},
    id::Identifier,
};

#[test]
fn full_handshake_then_session_round_trip() {
    let alice = Identity::new();
    let bob = Identity::new();
    let alice_eph = EphemeralKeypair::generate();
    let bob_eph = EphemeralKeypair::generate();

    let alice_blob = build_handshake_blob(&alice, &alice_eph);
    let bob_blob = build_handshake_blob(&bob, &bob_eph);

    let alice_seen = verify_handshake_blob(&bob_blob, None).expect("bob's blob verifies");
    let bob_seen = verify_handshake_blob(&alice_blob, None).expect("alice's blob verifies");
    assert_eq!(alice_seen.identity.fingerprint(), bob.fingerprint());
    assert_eq!(bob_seen.identity.fingerprint(), alice.fingerprint());

    let (a_key, a_iv) = derive_session_key(alice_eph, &alice_seen.eph_pub).expect("alice derives");
    let (b_key, b_iv) = derive_session_key(bob_eph, &bob_seen.eph_pub).expect("bob derives");
    assert_eq!(a_key, b_key);
    assert_eq!(a_iv, b_iv);

    let stream_id = Identifier::random();
    let mut alice_socket = SecureSocket::new(stream_id, bob.fingerprint(), a_key, a_iv);
    let mut bob_socket = SecureSocket::new(stream_id, alice.fingerprint(), b_key, b_iv);

    let record = alice_socket.encrypt_record(b"hello from alice").expect("encrypts");
    let plaintext = bob_socket.decrypt_record(&record[20..]).expect("decrypts");
    assert_eq!(plaintext, b"hello from alice");
}

#[test]
fn tampered_handshake_signature_is_rejected() {
    let identity = Identity::new();
    let eph = EphemeralKeypair::generate();
    let mut blob = build_handshake_blob(&identity, &eph);
    let last = blob.sig.len() - 1;
    blob.sig[last] ^= 0x01;
    assert!(verify_handshake_blob(&blob, None).is_err());
}

#[test]
fn wrong_expected_fingerprint_is_rejected_through_the_public_api() {
    let identity = Identity::new();
    let eph = EphemeralKeypair::generate();
    let blob = build_handshake_blob(&identity, &eph);
    assert!(verify_handshake_blob(&blob, Some(&Identifier::random())).is_err());
}

#[test]
fn flipped_ciphertext_byte_fails_the_gcm_tag() {
    let stream_id = Identifier::random();
    let key = [7u8; 16];
    let iv = [9u8; 16];
    let mut sender = SecureSocket::new(stream_id, Identifier::random(), key, iv);
    let mut receiver = SecureSocket::new(stream_id, Identifier::random(), key, iv);

    let mut record = sender.encrypt_record(b"do not tamper with me").expect("encrypts");
    let last = record.len() - 1;
    record[last] ^= 0x80;
    assert!(receiver.decrypt_record(&record[20..]).is_err());
}

#[test]
fn oversized_plaintext_is_rejected_before_it_ever_reaches_the_wire() {
    let stream_id = Identifier::random();
    let mut socket = SecureSocket::new(stream_id, Identifier::random(), [1u8; 16], [2u8; 16]);
    let too_big = vec![0u8; MAX_CIPHERTEXT + 1];
    assert!(socket.encrypt_record(&too_big).is_err());
}
