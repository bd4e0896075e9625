//! SMB2/3 session crypto state machine (spec.md §4.6).
//!
//! Key derivation follows SP800-108 counter-mode HMAC-SHA256 with the
//! constant labels/contexts MS-SMB2 specifies per dialect; 3.1.1 swaps
//! the constant context for the running preauth integrity hash. Signers
//! zero the wire signature field in their own copy before computing a
//! tag and verify in constant time.

use aes::Aes128;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, KeyInit};
use cmac::Cmac;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dialect {
    /// SMB 2.0.2 / 2.1 — signing only, HMAC-SHA1 in the real protocol but
    /// this core only ever constructs the post-2.1 HMAC-SHA256 signer,
    /// since nothing older is in scope.
    Pre300,
    Smb300,
    Smb302,
    Smb311,
}

impl Dialect {
    fn is_3xx_or_later(self) -> bool {
        !matches!(self, Dialect::Pre300)
    }

    fn is_311(self) -> bool {
        matches!(self, Dialect::Smb311)
    }
}

/// AES-GMAC per MS-SMB2's `SMB2_SIGNING_ALG_AES_GMAC` identifier.
pub const SIGNING_ALG_AES_GMAC: u16 = 0x0002;

struct Labels {
    label: &'static [u8],
    ctx: &'static [u8],
}

fn signing_labels(dialect: Dialect) -> Labels {
    if dialect.is_311() {
        Labels {
            label: b"SMBSigningKey\0",
            ctx: b"",
        }
    } else {
        Labels {
            label: b"SMB2AESCMAC\0",
            ctx: b"SmbSign\0",
        }
    }
}

fn encryption_labels(dialect: Dialect) -> Labels {
    if dialect.is_311() {
        Labels {
            label: b"SMBC2SCipherKey\0",
            ctx: b"",
        }
    } else {
        Labels {
            label: b"SMB2AESCCM\0",
            ctx: b"ServerIn \0",
        }
    }
}

fn decryption_labels(dialect: Dialect) -> Labels {
    if dialect.is_311() {
        Labels {
            label: b"SMBS2CCipherKey\0",
            ctx: b"",
        }
    } else {
        Labels {
            label: b"SMB2AESCCM\0",
            ctx: b"ServerOut\0",
        }
    }
}

fn application_labels(dialect: Dialect) -> Labels {
    if dialect.is_311() {
        Labels {
            label: b"SMBAppKey\0",
            ctx: b"",
        }
    } else {
        Labels {
            label: b"SMB2APP\0",
            ctx: b"SmbRpc\0",
        }
    }
}

/// `HMAC_SHA256(Ki, BE32(1) || Label || 0x00 || Context || BE32(L))`,
/// truncated to `bits / 8` bytes (spec.md §4.6).
fn kdf(ki: &[u8], label: &[u8], context: &[u8], bits: u32) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(ki).expect("HMAC accepts any key length");
    mac.update(&1u32.to_be_bytes());
    mac.update(label);
    mac.update(&[0u8]);
    mac.update(context);
    mac.update(&bits.to_be_bytes());
    let out = mac.finalize().into_bytes();
    out[..(bits / 8) as usize].to_vec()
}

/// `signer`, the four derived keys and the negotiated signing posture
/// for one SMB session. `destroy` zeroes every key buffer.
pub struct SessionCryptoState {
    pub signer: std::sync::Arc<dyn Signer>,
    pub signing_key: Vec<u8>,
    pub encryption_key: Vec<u8>,
    pub decryption_key: Vec<u8>,
    pub application_key: Vec<u8>,
    pub signing_enabled: bool,
    pub signing_required: bool,
}

impl SessionCryptoState {
    /// Derives all four keys at session-setup time even though only
    /// signing may be in use today (spec.md §4.6). `preauth_hash` is
    /// required (and used as every KDF context) from dialect 3.1.1
    /// onward; `cipher_is_256` selects a 256-bit vs 128-bit cipher key.
    pub fn derive_all_keys(
        dialect: Dialect,
        session_key: &[u8],
        algorithm_id: u16,
        preauth_hash: Option<&[u8; 32]>,
        cipher_is_256: bool,
        signing_enabled: bool,
        signing_required: bool,
    ) -> Self {
        let signer = new_signer(dialect, algorithm_id, session_key);

        if !dialect.is_3xx_or_later() {
            return Self {
                signer,
                signing_key: session_key.to_vec(),
                encryption_key: Vec::new(),
                decryption_key: Vec::new(),
                application_key: Vec::new(),
                signing_enabled,
                signing_required,
            };
        }

        let context_for = |labels: &Labels| -> Vec<u8> {
            if dialect.is_311() {
                preauth_hash.expect("3.1.1 requires a preauth integrity hash").to_vec()
            } else {
                labels.ctx.to_vec()
            }
        };

        let sl = signing_labels(dialect);
        let el = encryption_labels(dialect);
        let dl = decryption_labels(dialect);
        let al = application_labels(dialect);
        let cipher_bits = if cipher_is_256 { 256 } else { 128 };

        Self {
            signer,
            signing_key: kdf(session_key, sl.label, &context_for(&sl), 128),
            encryption_key: kdf(session_key, el.label, &context_for(&el), cipher_bits),
            decryption_key: kdf(session_key, dl.label, &context_for(&dl), cipher_bits),
            application_key: kdf(session_key, al.label, &context_for(&al), 128),
            signing_enabled,
            signing_required,
        }
    }

    pub fn destroy(mut self) {
        zero(&mut self.signing_key);
        zero(&mut self.encryption_key);
        zero(&mut self.decryption_key);
        zero(&mut self.application_key);
    }
}

fn zero(buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b = 0;
    }
}

/// Zeroes the wire signature field (offset 48..64) in a private copy of
/// `msg` before a signer computes its tag — every [`Signer`] impl must
/// apply this and never sign the field the client actually sent.
fn prepare(msg: &[u8]) -> Vec<u8> {
    let mut buf = msg.to_vec();
    if buf.len() >= 64 {
        buf[48..64].fill(0);
    }
    buf
}

pub trait Signer: Send + Sync {
    fn sign(&self, msg: &[u8]) -> [u8; 16];

    /// Constant-time comparison against the wire tag.
    fn verify(&self, msg: &[u8], tag: &[u8; 16]) -> bool {
        let computed = self.sign(msg);
        computed.ct_eq(tag).into()
    }
}

pub struct HMACSigner {
    key: Vec<u8>,
}

impl HMACSigner {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }
}

impl Signer for HMACSigner {
    fn sign(&self, msg: &[u8]) -> [u8; 16] {
        let prepared = prepare(msg);
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(&prepared);
        let full = mac.finalize().into_bytes();
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        out
    }
}

pub struct CMACSigner {
    key: [u8; 16],
}

impl CMACSigner {
    pub fn new(key: &[u8]) -> Self {
        let mut k = [0u8; 16];
        k.copy_from_slice(&key[..16]);
        Self { key: k }
    }
}

impl Signer for CMACSigner {
    fn sign(&self, msg: &[u8]) -> [u8; 16] {
        cmac_aes128(&self.key, &prepare(msg))
    }
}

fn cmac_aes128(key: &[u8; 16], msg: &[u8]) -> [u8; 16] {
    let mut mac = Cmac::<Aes128>::new_from_slice(key).expect("AES-128 key is 16 bytes");
    mac.update(msg);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&full);
    out
}

/// AES-128 GCM with an empty plaintext and the message as AAD. The
/// nonce is the SMB2 header's MessageId field (bytes 28..36),
/// zero-padded from 8 to 12 bytes (spec.md §4.6).
pub struct GMACSigner {
    key: [u8; 16],
}

impl GMACSigner {
    pub fn new(key: &[u8]) -> Self {
        let mut k = [0u8; 16];
        k.copy_from_slice(&key[..16]);
        Self { key: k }
    }
}

impl Signer for GMACSigner {
    fn sign(&self, msg: &[u8]) -> [u8; 16] {
        let prepared = prepare(msg);
        let mut nonce = [0u8; 12];
        if prepared.len() >= 36 {
            nonce[..8].copy_from_slice(&prepared[28..36]);
        }
        let cipher = Aes128Gcm::new_from_slice(&self.key).expect("AES-128 key is 16 bytes");
        let nonce = GenericArray::from_slice(&nonce);
        let tag = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &[],
                    aad: &prepared,
                },
            )
            .expect("GCM encryption of an empty plaintext cannot fail");
        let mut out = [0u8; 16];
        out.copy_from_slice(&tag);
        out
    }
}

/// Dispatches to the signer dialect/algorithm select: pre-3.0 always
/// gets HMAC; AES-GMAC only if the negotiated algorithm id says so;
/// everything else on 3.x gets CMAC (spec.md §4.6).
pub fn new_signer(dialect: Dialect, algorithm_id: u16, key: &[u8]) -> std::sync::Arc<dyn Signer> {
    if !dialect.is_3xx_or_later() {
        return std::sync::Arc::new(HMACSigner::new(key));
    }
    if algorithm_id == SIGNING_ALG_AES_GMAC {
        std::sync::Arc::new(GMACSigner::new(key))
    } else {
        std::sync::Arc::new(CMACSigner::new(key))
    }
}

/// Picks the signing algorithm to advertise back to the client: the
/// first entry in `preference` the client's SIGNING_CAPABILITIES
/// context offered. A 3.1.1 client that omitted the context entirely
/// falls back to AES-CMAC per MS-SMB2 (spec.md §4.6).
pub fn negotiate_signing_algorithm(
    client_offered: Option<&[crate::config::SigningAlgorithm]>,
    preference: &[crate::config::SigningAlgorithm],
) -> crate::config::SigningAlgorithm {
    use crate::config::SigningAlgorithm;
    match client_offered {
        None => SigningAlgorithm::Cmac,
        Some(offered) => preference
            .iter()
            .find(|p| offered.contains(p))
            .copied()
            .unwrap_or(SigningAlgorithm::Cmac),
    }
}
