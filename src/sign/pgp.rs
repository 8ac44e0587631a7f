use super::{DigestAlgorithm, SignatureAccumulator, SigningBackend, UnlockedPrivateKey};
use crate::errors::*;
use crate::keyring::SecretKeyRecord;
use anyhow::{bail, Context};
use sequoia_openpgp::crypto::hash;
use sequoia_openpgp::crypto::{KeyPair, Password};
use sequoia_openpgp::packet::prelude::*;
use sequoia_openpgp::serialize::Marshal;
use sequoia_openpgp::types::SignatureType;
use std::sync::Arc;

/// Decrypt the secret key material of a keyring record.
pub fn unlock_keypair(record: &SecretKeyRecord, passphrase: &Password) -> anyhow::Result<KeyPair> {
    let algo = record.algorithm();
    if !algo.for_signing() {
        bail!("Public key algorithm {} can not create signatures", algo);
    }
    if !algo.is_supported() {
        bail!("Public key algorithm {} is not supported", algo);
    }

    let key = record.key().clone();
    let key = if key.has_unencrypted_secret() {
        warn!(
            "Secret key {} is not protected by a passphrase, ignoring passphrase",
            record.key_id_hex()
        );
        key
    } else {
        key.decrypt_secret(passphrase)
            .context("Failed to decrypt secret key, wrong passphrase?")?
    };

    let keypair = key
        .into_keypair()
        .context("Failed to load decrypted secret key")?;
    debug!("Unlocked secret key {} ({})", record.key_id_hex(), algo);
    Ok(keypair)
}

/// Creates binary document signatures with sequoia-openpgp.
#[derive(Debug, Default, Clone)]
pub struct PgpBackend;

impl PgpBackend {
    pub fn new() -> Self {
        PgpBackend
    }
}

impl SigningBackend for PgpBackend {
    fn unlock(
        &self,
        record: &SecretKeyRecord,
        passphrase: &Password,
    ) -> Result<UnlockedPrivateKey> {
        let keypair = unlock_keypair(record, passphrase).map_err(|source| Error::Unlock {
            key_id: record.key_id_hex(),
            source,
        })?;
        Ok(UnlockedPrivateKey::new(record.key_id(), keypair))
    }

    fn start(
        &self,
        key: Arc<UnlockedPrivateKey>,
        digest: DigestAlgorithm,
    ) -> sequoia_openpgp::Result<Box<dyn SignatureAccumulator>> {
        let hash = digest
            .hash_algo()
            .context()
            .with_context(|| anyhow::anyhow!("Hash algorithm {:?} is not available", digest))?;
        trace!("Starting new {:?} signature", digest);
        Ok(Box::new(PgpAccumulator { key, hash }))
    }
}

struct PgpAccumulator {
    key: Arc<UnlockedPrivateKey>,
    hash: Box<dyn hash::Digest>,
}

impl SignatureAccumulator for PgpAccumulator {
    fn update(&mut self, data: &[u8]) {
        self.hash.update(data);
    }

    fn finalize(self: Box<Self>) -> sequoia_openpgp::Result<Vec<u8>> {
        let PgpAccumulator { key, hash } = *self;
        let mut signer = key.keypair().clone();

        let sig = SignatureBuilder::new(SignatureType::Binary)
            .sign_hash(&mut signer, hash)
            .context("Failed to create signature")?;

        let mut output = Vec::new();
        Packet::Signature(sig)
            .serialize(&mut output)
            .context("Failed to serialize signature")?;
        Ok(output)
    }
}
