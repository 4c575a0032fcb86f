//! Packet-level cryptographic operations.
//!
//! This module defines the cipher and MAC capabilities the packet layer
//! is written against, and the concrete implementations the transport
//! negotiates:
//!
//! - `none` (identity cipher, plaintext before the first NEWKEYS)
//! - AES-128-CTR, AES-256-CTR (stream ciphers with separate MAC)
//! - HMAC-SHA256, HMAC-SHA512
//!
//! # Block policy
//!
//! A cipher reports two block sizes: the regular `block_size` and the
//! `lenfield_block_size`, the number of bytes that must be decrypted to
//! recover the packet length field. For classic ciphers the latter is
//! reported as zero and the packet layer falls back to the regular
//! block size; AEAD and encrypt-then-MAC schemes report a distinct
//! value through the same hook.
//!
//! # Security
//!
//! - MAC comparison is constant-time ([`subtle`])
//! - MAC keys are zeroized on drop ([`zeroize`])
//! - The MAC input is `sequence_number || cleartext packet bytes`; the
//!   sequence number is owned by the session and passed in explicitly

use aes::{Aes128, Aes256};
use cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use skiff_platform::{SkiffError, SkiffResult};
use zeroize::Zeroize;

use crate::ssh::compress::{DeflateStream, InflateStream};

/// Cipher capability consumed by the packet layer.
///
/// Stream ciphers keep their keystream position between calls, so the
/// packet layer may decrypt the length-field block first and the
/// remainder of the packet later.
pub trait PacketCipher: Send {
    /// Negotiated algorithm name.
    fn name(&self) -> &'static str;

    /// Cipher block size in bytes.
    fn block_size(&self) -> usize;

    /// Bytes that must be decrypted to recover the length field.
    ///
    /// Zero means "same as [`block_size`](Self::block_size)".
    fn lenfield_block_size(&self) -> usize;

    /// Encrypts `data` in place.
    fn encrypt(&mut self, data: &mut [u8]) -> SkiffResult<()>;

    /// Decrypts `data` in place.
    fn decrypt(&mut self, data: &mut [u8]) -> SkiffResult<()>;
}

/// MAC capability consumed by the packet layer.
pub trait PacketMac: Send {
    /// Negotiated algorithm name.
    fn name(&self) -> &'static str;

    /// Digest length in bytes.
    fn digest_len(&self) -> usize;

    /// Computes the MAC over `sequence_number || data`.
    fn compute(&self, sequence: u32, data: &[u8]) -> Vec<u8>;

    /// Verifies `tag` against the MAC of `sequence_number || data`
    /// using a constant-time comparison.
    fn verify(&self, sequence: u32, data: &[u8], tag: &[u8]) -> SkiffResult<()>;
}

/// Identity cipher used before the first key exchange completes.
///
/// Reports the protocol-default block size of 8.
#[derive(Debug, Default)]
pub struct NoneCipher;

impl PacketCipher for NoneCipher {
    fn name(&self) -> &'static str {
        "none"
    }

    fn block_size(&self) -> usize {
        8
    }

    fn lenfield_block_size(&self) -> usize {
        0
    }

    fn encrypt(&mut self, _data: &mut [u8]) -> SkiffResult<()> {
        Ok(())
    }

    fn decrypt(&mut self, _data: &mut [u8]) -> SkiffResult<()> {
        Ok(())
    }
}

/// AES-128 in counter mode (`aes128-ctr`).
pub struct Aes128CtrCipher {
    ctx: Ctr128BE<Aes128>,
}

impl Aes128CtrCipher {
    /// Creates the cipher from 16 bytes of key and 16 bytes of IV.
    pub fn new(key: &[u8], iv: &[u8]) -> SkiffResult<Self> {
        if key.len() < 16 || iv.len() < 16 {
            return Err(SkiffError::Security(format!(
                "Insufficient key material for aes128-ctr: key {}, iv {}",
                key.len(),
                iv.len()
            )));
        }

        let mut k = [0u8; 16];
        let mut n = [0u8; 16];
        k.copy_from_slice(&key[..16]);
        n.copy_from_slice(&iv[..16]);
        let ctx = Ctr128BE::<Aes128>::new(&k.into(), &n.into());
        k.zeroize();
        n.zeroize();
        Ok(Self { ctx })
    }
}

impl PacketCipher for Aes128CtrCipher {
    fn name(&self) -> &'static str {
        "aes128-ctr"
    }

    fn block_size(&self) -> usize {
        16
    }

    fn lenfield_block_size(&self) -> usize {
        0
    }

    fn encrypt(&mut self, data: &mut [u8]) -> SkiffResult<()> {
        self.ctx.apply_keystream(data);
        Ok(())
    }

    fn decrypt(&mut self, data: &mut [u8]) -> SkiffResult<()> {
        self.ctx.apply_keystream(data);
        Ok(())
    }
}

/// AES-256 in counter mode (`aes256-ctr`).
pub struct Aes256CtrCipher {
    ctx: Ctr128BE<Aes256>,
}

impl Aes256CtrCipher {
    /// Creates the cipher from 32 bytes of key and 16 bytes of IV.
    pub fn new(key: &[u8], iv: &[u8]) -> SkiffResult<Self> {
        if key.len() < 32 || iv.len() < 16 {
            return Err(SkiffError::Security(format!(
                "Insufficient key material for aes256-ctr: key {}, iv {}",
                key.len(),
                iv.len()
            )));
        }

        let mut k = [0u8; 32];
        let mut n = [0u8; 16];
        k.copy_from_slice(&key[..32]);
        n.copy_from_slice(&iv[..16]);
        let ctx = Ctr128BE::<Aes256>::new(&k.into(), &n.into());
        k.zeroize();
        n.zeroize();
        Ok(Self { ctx })
    }
}

impl PacketCipher for Aes256CtrCipher {
    fn name(&self) -> &'static str {
        "aes256-ctr"
    }

    fn block_size(&self) -> usize {
        16
    }

    fn lenfield_block_size(&self) -> usize {
        0
    }

    fn encrypt(&mut self, data: &mut [u8]) -> SkiffResult<()> {
        self.ctx.apply_keystream(data);
        Ok(())
    }

    fn decrypt(&mut self, data: &mut [u8]) -> SkiffResult<()> {
        self.ctx.apply_keystream(data);
        Ok(())
    }
}

/// HMAC-SHA2-256 (`hmac-sha2-256`).
pub struct HmacSha256 {
    key: Vec<u8>,
}

impl HmacSha256 {
    /// Creates the MAC from at least 32 bytes of key material.
    pub fn new(key_material: &[u8]) -> SkiffResult<Self> {
        if key_material.len() < 32 {
            return Err(SkiffError::Security(format!(
                "Insufficient key material for hmac-sha2-256: got {}",
                key_material.len()
            )));
        }

        Ok(Self {
            key: key_material[..32].to_vec(),
        })
    }
}

impl std::fmt::Debug for HmacSha256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha256").field("key", &"<redacted>").finish()
    }
}

impl PacketMac for HmacSha256 {
    fn name(&self) -> &'static str {
        "hmac-sha2-256"
    }

    fn digest_len(&self) -> usize {
        32
    }

    fn compute(&self, sequence: u32, data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC key size is valid");
        mac.update(&sequence.to_be_bytes());
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn verify(&self, sequence: u32, data: &[u8], tag: &[u8]) -> SkiffResult<()> {
        verify_tag(&self.compute(sequence, data), tag)
    }
}

impl Drop for HmacSha256 {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// HMAC-SHA2-512 (`hmac-sha2-512`).
pub struct HmacSha512 {
    key: Vec<u8>,
}

impl HmacSha512 {
    /// Creates the MAC from at least 64 bytes of key material.
    pub fn new(key_material: &[u8]) -> SkiffResult<Self> {
        if key_material.len() < 64 {
            return Err(SkiffError::Security(format!(
                "Insufficient key material for hmac-sha2-512: got {}",
                key_material.len()
            )));
        }

        Ok(Self {
            key: key_material[..64].to_vec(),
        })
    }
}

impl std::fmt::Debug for HmacSha512 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha512").field("key", &"<redacted>").finish()
    }
}

impl PacketMac for HmacSha512 {
    fn name(&self) -> &'static str {
        "hmac-sha2-512"
    }

    fn digest_len(&self) -> usize {
        64
    }

    fn compute(&self, sequence: u32, data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha512>::new_from_slice(&self.key).expect("HMAC key size is valid");
        mac.update(&sequence.to_be_bytes());
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn verify(&self, sequence: u32, data: &[u8], tag: &[u8]) -> SkiffResult<()> {
        verify_tag(&self.compute(sequence, data), tag)
    }
}

impl Drop for HmacSha512 {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn verify_tag(computed: &[u8], received: &[u8]) -> SkiffResult<()> {
    if computed.len() != received.len() {
        return Err(SkiffError::Security("MAC length mismatch".to_string()));
    }

    use subtle::ConstantTimeEq;
    if computed.ct_eq(received).into() {
        Ok(())
    } else {
        Err(SkiffError::Security("MAC verification failed".to_string()))
    }
}

/// Negotiated per-direction cipher suite.
///
/// Holds the in/out ciphers, the optional in/out MACs, the per-direction
/// compression flags and the lazily-created streaming compression
/// contexts. The contexts persist for the remaining life of the session
/// because the zlib stream state carries between packets.
pub struct CipherSuite {
    in_cipher: Box<dyn PacketCipher>,
    out_cipher: Box<dyn PacketCipher>,
    in_mac: Option<Box<dyn PacketMac>>,
    out_mac: Option<Box<dyn PacketMac>>,
    compress_in: bool,
    compress_out: bool,
    pub(crate) inflate: Option<InflateStream>,
    pub(crate) deflate: Option<DeflateStream>,
}

impl std::fmt::Debug for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSuite")
            .field("in_cipher", &self.in_cipher.name())
            .field("out_cipher", &self.out_cipher.name())
            .field("in_mac", &self.in_mac.as_ref().map(|m| m.name()))
            .field("out_mac", &self.out_mac.as_ref().map(|m| m.name()))
            .field("compress_in", &self.compress_in)
            .field("compress_out", &self.compress_out)
            .finish()
    }
}

impl CipherSuite {
    /// Creates a suite from negotiated ciphers and MACs.
    pub fn new(
        in_cipher: Box<dyn PacketCipher>,
        out_cipher: Box<dyn PacketCipher>,
        in_mac: Option<Box<dyn PacketMac>>,
        out_mac: Option<Box<dyn PacketMac>>,
    ) -> Self {
        Self {
            in_cipher,
            out_cipher,
            in_mac,
            out_mac,
            compress_in: false,
            compress_out: false,
            inflate: None,
            deflate: None,
        }
    }

    /// Creates the identity suite: no encryption, no MAC.
    pub fn none() -> Self {
        Self::new(Box::new(NoneCipher), Box::new(NoneCipher), None, None)
    }

    /// Enables compression per direction.
    pub fn with_compression(mut self, inbound: bool, outbound: bool) -> Self {
        self.compress_in = inbound;
        self.compress_out = outbound;
        self
    }

    /// Inbound cipher block size.
    pub fn in_block_size(&self) -> usize {
        self.in_cipher.block_size()
    }

    /// Inbound length-field block size as declared by the cipher
    /// (zero means "use the regular block size").
    pub fn in_lenfield_block_size(&self) -> usize {
        self.in_cipher.lenfield_block_size()
    }

    /// Outbound cipher block size.
    pub fn out_block_size(&self) -> usize {
        self.out_cipher.block_size()
    }

    /// Outbound length-field block size as declared by the cipher.
    pub fn out_lenfield_block_size(&self) -> usize {
        self.out_cipher.lenfield_block_size()
    }

    /// Inbound MAC digest length (zero when no MAC is negotiated).
    pub fn in_mac_len(&self) -> usize {
        self.in_mac.as_ref().map_or(0, |m| m.digest_len())
    }

    /// Outbound MAC digest length (zero when no MAC is negotiated).
    pub fn out_mac_len(&self) -> usize {
        self.out_mac.as_ref().map_or(0, |m| m.digest_len())
    }

    /// Whether inbound decompression is negotiated.
    pub fn compress_in(&self) -> bool {
        self.compress_in
    }

    /// Whether outbound compression is negotiated.
    pub fn compress_out(&self) -> bool {
        self.compress_out
    }

    /// Decrypts exactly one length-field block from `src` into `dst`
    /// and parses the packet length from its first four bytes.
    pub fn decrypt_length(&mut self, dst: &mut [u8], src: &[u8]) -> SkiffResult<u32> {
        dst.copy_from_slice(&src[..dst.len()]);
        self.in_cipher.decrypt(dst)?;
        Ok(u32::from_be_bytes([dst[0], dst[1], dst[2], dst[3]]))
    }

    /// Continues decrypting packet bytes from `src` into `dst` after
    /// the length-field block has been processed.
    pub fn decrypt_remaining(&mut self, dst: &mut [u8], src: &[u8]) -> SkiffResult<()> {
        dst.copy_from_slice(&src[..dst.len()]);
        self.in_cipher.decrypt(dst)
    }

    /// Verifies the inbound MAC over `sequence || clear` against `tag`.
    ///
    /// A suite without an inbound MAC accepts any (empty) tag.
    pub fn verify_mac(&self, sequence: u32, clear: &[u8], tag: &[u8]) -> SkiffResult<()> {
        match self.in_mac.as_ref() {
            Some(mac) => mac.verify(sequence, clear, tag),
            None => Ok(()),
        }
    }

    /// Encrypts a staged cleartext packet in place and returns the MAC
    /// bytes to append, computed over `sequence || cleartext`.
    pub fn protect(&mut self, data: &mut [u8], sequence: u32) -> SkiffResult<Option<Vec<u8>>> {
        let tag = self.out_mac.as_ref().map(|mac| mac.compute(sequence, data));
        self.out_cipher.encrypt(data)?;
        Ok(tag)
    }
}
