// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Security envelope: one long-lived Ed25519 identity keypair, payload
//! sealing with AES-256-GCM under per-session keys, and the X25519
//! agreement used to negotiate those keys at handshake.
//!
//! Nonce uniqueness per session key is a correctness requirement. Every
//! [`SecurityEnvelope::seal`] draws a fresh 96-bit nonce from the system
//! CSPRNG; no nonce counter is shared across tasks.

use ring::{
    aead, agreement, hkdf,
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an AEAD nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;
/// Length of a session key in bytes (256 bits).
pub const SESSION_KEY_LEN: usize = 32;

/// HKDF salt binding derived keys to the v1 protocol.
const SESSION_KEY_SALT: &[u8] = b"asinka-v1";

/// Crypto failures. Callers rarely recover; `verify` never returns one.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Identity keypair could not be created or is unavailable.
    #[error("identity key unavailable")]
    KeyUnavailable,
    /// Seal/open/agreement failure, including AEAD tag mismatch.
    #[error("crypto")]
    Crypto,
}

/// 256-bit symmetric session key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches logs.
        f.write_str("SessionKey(..)")
    }
}

/// An AEAD-sealed payload: ciphertext plus the nonce it was sealed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPayload {
    /// Random 96-bit nonce.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the 128-bit tag appended.
    pub ciphertext: Vec<u8>,
}

/// Signer backend abstraction (external key storage compatible).
pub trait SignerBackend: Send + Sync {
    /// Identity public key bytes.
    fn public_key(&self) -> Vec<u8>;
    /// Sign message bytes.
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// In-memory Ed25519 backend. The keypair lives for the client's lifetime
/// and is never persisted; durable key storage is an external concern.
pub struct InMemoryEd25519Backend {
    keypair: Ed25519KeyPair,
}

impl InMemoryEd25519Backend {
    /// Generate a fresh keypair.
    pub fn generate(rng: &SystemRandom) -> Result<Self, CryptoError> {
        let pkcs8 =
            Ed25519KeyPair::generate_pkcs8(rng).map_err(|_| CryptoError::KeyUnavailable)?;
        let keypair =
            Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| CryptoError::KeyUnavailable)?;
        Ok(Self { keypair })
    }
}

impl SignerBackend for InMemoryEd25519Backend {
    fn public_key(&self) -> Vec<u8> {
        self.keypair.public_key().as_ref().to_vec()
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.keypair.sign(msg).as_ref().to_vec())
    }
}

/// One half of an X25519 session-key agreement.
///
/// Created per handshake attempt; [`EphemeralAgreement::derive`] consumes
/// it, so a private scalar is never used twice.
pub struct EphemeralAgreement {
    private: agreement::EphemeralPrivateKey,
    public: Vec<u8>,
}

impl EphemeralAgreement {
    /// Generate an ephemeral X25519 keypair.
    pub fn generate(rng: &SystemRandom) -> Result<Self, CryptoError> {
        let private = agreement::EphemeralPrivateKey::generate(&agreement::X25519, rng)
            .map_err(|_| CryptoError::Crypto)?;
        let public = private
            .compute_public_key()
            .map_err(|_| CryptoError::Crypto)?
            .as_ref()
            .to_vec();
        Ok(Self { private, public })
    }

    /// Our ephemeral public key, carried in the handshake.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Derive the session key from the peer's ephemeral public key,
    /// binding it to the minted session id.
    pub fn derive(self, peer_public: &[u8], session_id: &str) -> Result<SessionKey, CryptoError> {
        let peer = agreement::UnparsedPublicKey::new(&agreement::X25519, peer_public);
        let key = agreement::agree_ephemeral(self.private, &peer, |shared| {
            let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, SESSION_KEY_SALT);
            let prk = salt.extract(shared);
            let info = [session_id.as_bytes()];
            let okm = prk
                .expand(&info, hkdf::HKDF_SHA256)
                .map_err(|_| CryptoError::Crypto)?;
            let mut out = [0u8; SESSION_KEY_LEN];
            okm.fill(&mut out).map_err(|_| CryptoError::Crypto)?;
            Ok(SessionKey(out))
        })
        .map_err(|_| CryptoError::Crypto)?;
        key
    }
}

/// The security envelope. Stateless beyond its keypair; safe to call from
/// any task.
pub struct SecurityEnvelope {
    backend: Box<dyn SignerBackend>,
    rng: SystemRandom,
}

impl SecurityEnvelope {
    /// Create an envelope with a freshly generated in-memory identity.
    pub fn new() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let backend = InMemoryEd25519Backend::generate(&rng)?;
        Ok(Self {
            backend: Box::new(backend),
            rng,
        })
    }

    /// Create an envelope over an externally provided signer.
    pub fn with_backend(backend: Box<dyn SignerBackend>) -> Self {
        Self {
            backend,
            rng: SystemRandom::new(),
        }
    }

    /// Identity public key bytes.
    pub fn public_key(&self) -> Vec<u8> {
        self.backend.public_key()
    }

    /// Sign `msg` with the identity key.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.backend.sign(msg)
    }

    /// Verify `sig` over `msg` with `peer_public_key`. Returns false on any
    /// error, malformed input included.
    pub fn verify(&self, msg: &[u8], sig: &[u8], peer_public_key: &[u8]) -> bool {
        if sig.len() != 64 || peer_public_key.len() != 32 {
            return false;
        }
        UnparsedPublicKey::new(&ED25519, peer_public_key)
            .verify(msg, sig)
            .is_ok()
    }

    /// Generate a fresh 256-bit session key from the CSPRNG.
    pub fn generate_session_key(&self) -> Result<SessionKey, CryptoError> {
        let mut out = [0u8; SESSION_KEY_LEN];
        self.rng.fill(&mut out).map_err(|_| CryptoError::Crypto)?;
        Ok(SessionKey(out))
    }

    /// Begin an X25519 agreement for handshake key negotiation.
    pub fn begin_agreement(&self) -> Result<EphemeralAgreement, CryptoError> {
        EphemeralAgreement::generate(&self.rng)
    }

    /// AEAD-seal `plaintext` under `key` with a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8], key: &SessionKey) -> Result<SealedPayload, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Crypto)?;
        let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

        let unbound =
            aead::UnboundKey::new(&aead::AES_256_GCM, &key.0).map_err(|_| CryptoError::Crypto)?;
        let sealing = aead::LessSafeKey::new(unbound);

        // ciphertext buffer = plaintext + tag
        let mut in_out = plaintext.to_vec();
        sealing
            .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Crypto)?;

        Ok(SealedPayload {
            nonce: nonce_bytes,
            ciphertext: in_out,
        })
    }

    /// Open a sealed payload. Fails on tag mismatch or truncated input.
    pub fn open(&self, sealed: &SealedPayload, key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
        if sealed.ciphertext.len() < aead::AES_256_GCM.tag_len() {
            return Err(CryptoError::Crypto);
        }
        let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);
        let unbound =
            aead::UnboundKey::new(&aead::AES_256_GCM, &key.0).map_err(|_| CryptoError::Crypto)?;
        let opening = aead::LessSafeKey::new(unbound);

        let mut in_out = sealed.ciphertext.clone();
        let plain = opening
            .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Crypto)?;
        Ok(plain.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let env = SecurityEnvelope::new().unwrap();
        let key = env.generate_session_key().unwrap();
        let sealed = env.seal(b"hello asinka", &key).unwrap();
        assert_eq!(env.open(&sealed, &key).unwrap(), b"hello asinka");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let env = SecurityEnvelope::new().unwrap();
        let k1 = env.generate_session_key().unwrap();
        let k2 = env.generate_session_key().unwrap();
        let sealed = env.seal(b"secret", &k1).unwrap();
        assert!(env.open(&sealed, &k2).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let env = SecurityEnvelope::new().unwrap();
        let key = env.generate_session_key().unwrap();
        let mut sealed = env.seal(b"payload", &key).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(env.open(&sealed, &key).is_err());
    }

    #[test]
    fn sign_verifies_with_own_public_key_only() {
        let a = SecurityEnvelope::new().unwrap();
        let b = SecurityEnvelope::new().unwrap();
        let sig = a.sign(b"doc").unwrap();
        assert!(a.verify(b"doc", &sig, &a.public_key()));
        assert!(!a.verify(b"other", &sig, &a.public_key()));
        assert!(!a.verify(b"doc", &sig, &b.public_key()));
        assert!(!a.verify(b"doc", &[0u8; 3], &a.public_key()));
    }

    #[test]
    fn both_agreement_halves_derive_the_same_key() {
        let env = SecurityEnvelope::new().unwrap();
        let a = env.begin_agreement().unwrap();
        let b = env.begin_agreement().unwrap();
        let a_pub = a.public_key().to_vec();
        let b_pub = b.public_key().to_vec();

        let ka = a.derive(&b_pub, "sess-1").unwrap();
        let kb = b.derive(&a_pub, "sess-1").unwrap();
        assert_eq!(ka.as_bytes(), kb.as_bytes());

        // A different session id yields a different key.
        let c = env.begin_agreement().unwrap();
        let d = env.begin_agreement().unwrap();
        let c_pub = c.public_key().to_vec();
        let kd = d.derive(&c_pub, "sess-2").unwrap();
        assert_ne!(ka.as_bytes(), kd.as_bytes());
    }
}
