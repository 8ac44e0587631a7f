pub mod pgp;

use crate::errors::*;
use crate::keyring::SecretKeyRecord;
use anyhow::bail;
use sequoia_openpgp::armor;
use sequoia_openpgp::crypto::{KeyPair, Password};
use sequoia_openpgp::types::{HashAlgorithm, PublicKeyAlgorithm};
use serde::Deserialize;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    /// Only for verifiers that can't handle anything newer
    Sha1,
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn hash_algo(self) -> HashAlgorithm {
        match self {
            DigestAlgorithm::Sha1 => HashAlgorithm::SHA1,
            DigestAlgorithm::Sha224 => HashAlgorithm::SHA224,
            DigestAlgorithm::Sha256 => HashAlgorithm::SHA256,
            DigestAlgorithm::Sha384 => HashAlgorithm::SHA384,
            DigestAlgorithm::Sha512 => HashAlgorithm::SHA512,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Encoding {
    Binary,
    Armored,
}

impl Encoding {
    pub fn from_armor(armor: bool) -> Self {
        if armor {
            Encoding::Armored
        } else {
            Encoding::Binary
        }
    }

    /// File extension appended to the signed file's name.
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Binary => "sig",
            Encoding::Armored => "asc",
        }
    }
}

/// A finished signature packet and how it's going to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureResult {
    packet: Vec<u8>,
    encoding: Encoding,
}

impl SignatureResult {
    pub fn new(packet: Vec<u8>, encoding: Encoding) -> Self {
        SignatureResult { packet, encoding }
    }

    /// The serialized signature packet, without armor.
    pub fn packet(&self) -> &[u8] {
        &self.packet
    }

    pub fn encode(&self) -> sequoia_openpgp::Result<Vec<u8>> {
        match self.encoding {
            Encoding::Binary => Ok(self.packet.clone()),
            Encoding::Armored => {
                let mut w = armor::Writer::new(Vec::new(), armor::Kind::Signature)?;
                w.write_all(&self.packet)?;
                let buf = w.finalize()?;
                Ok(buf)
            }
        }
    }
}

/// Decrypted secret key material, ready to create signatures.
pub struct UnlockedPrivateKey {
    key_id: u64,
    keypair: KeyPair,
}

impl UnlockedPrivateKey {
    pub fn new(key_id: u64, keypair: KeyPair) -> Self {
        UnlockedPrivateKey { key_id, keypair }
    }

    pub fn key_id(&self) -> u64 {
        self.key_id
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.keypair.public().pk_algo()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}

impl fmt::Debug for UnlockedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedPrivateKey")
            .field("key_id", &format_args!("{:016X}", self.key_id))
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// Hash state of a single signature that is still being computed.
pub trait SignatureAccumulator: Send {
    fn update(&mut self, data: &[u8]);

    /// Sign the accumulated data and return the serialized signature packet.
    fn finalize(self: Box<Self>) -> sequoia_openpgp::Result<Vec<u8>>;
}

/// The cryptography used to unlock keys and create signatures.
pub trait SigningBackend: Send + Sync {
    fn unlock(&self, record: &SecretKeyRecord, passphrase: &Password)
        -> Result<UnlockedPrivateKey>;

    fn start(
        &self,
        key: Arc<UnlockedPrivateKey>,
        digest: DigestAlgorithm,
    ) -> sequoia_openpgp::Result<Box<dyn SignatureAccumulator>>;
}

/// An unlocked key together with the state of the signature currently being created.
///
/// Only one signature is accumulated at a time. [`SigningContext::finalize`] consumes the
/// accumulated state, the next signature has to be started with [`SigningContext::begin`].
pub struct SigningContext {
    backend: Arc<dyn SigningBackend>,
    key: Arc<UnlockedPrivateKey>,
    digest: DigestAlgorithm,
    state: Option<Box<dyn SignatureAccumulator>>,
    consumed: u64,
}

impl SigningContext {
    pub fn new(
        backend: Arc<dyn SigningBackend>,
        key: Arc<UnlockedPrivateKey>,
        digest: DigestAlgorithm,
    ) -> Self {
        SigningContext {
            backend,
            key,
            digest,
            state: None,
            consumed: 0,
        }
    }

    pub fn unlock(
        backend: Arc<dyn SigningBackend>,
        record: &SecretKeyRecord,
        passphrase: &Password,
        digest: DigestAlgorithm,
    ) -> Result<Self> {
        let key = backend.unlock(record, passphrase)?;
        Ok(Self::new(backend, Arc::new(key), digest))
    }

    /// Create an independent context that signs with the same key.
    pub fn fork(&self) -> Self {
        Self::new(self.backend.clone(), self.key.clone(), self.digest)
    }

    pub fn key(&self) -> &UnlockedPrivateKey {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn begin(&mut self) -> sequoia_openpgp::Result<()> {
        if self.state.is_some() {
            debug!("Discarding unfinished signature");
        }
        let state = self.backend.start(self.key.clone(), self.digest)?;
        self.state = Some(state);
        self.consumed = 0;
        Ok(())
    }

    pub fn update(&mut self, data: &[u8]) -> sequoia_openpgp::Result<()> {
        let Some(state) = self.state.as_mut() else {
            bail!("No signature has been started");
        };
        state.update(data);
        self.consumed += data.len() as u64;
        Ok(())
    }

    pub fn finalize(&mut self, encoding: Encoding) -> sequoia_openpgp::Result<SignatureResult> {
        let Some(state) = self.state.take() else {
            bail!("No signature has been started");
        };
        debug!(
            "Generating signature over {} bytes with key {:016X}",
            self.consumed,
            self.key.key_id()
        );
        self.consumed = 0;
        let packet = state.finalize()?;
        Ok(SignatureResult::new(packet, encoding))
    }

    pub fn reset(&mut self) {
        self.state = None;
        self.consumed = 0;
    }
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("key", &self.key)
            .field("digest", &self.digest)
            .field("active", &self.state.is_some())
            .finish()
    }
}
