use crate::errors::*;
use crate::keyring::SecretKeyRecord;
use crate::sign::pgp::unlock_keypair;
use crate::sign::{DigestAlgorithm, SignatureAccumulator, SigningBackend, UnlockedPrivateKey};
use anyhow::{anyhow, bail};
use sequoia_openpgp::armor;
use sequoia_openpgp::cert::prelude::*;
use sequoia_openpgp::crypto::{hash, Password};
use sequoia_openpgp::packet::prelude::*;
use sequoia_openpgp::parse::Parse;
use sequoia_openpgp::serialize::MarshalInto;
use sequoia_openpgp::types::KeyFlags;
use std::io::Read;
use std::sync::{Arc, Mutex};

fn serialize_tsk(cert: &Cert, armored: bool) -> anyhow::Result<Vec<u8>> {
    let buf = if armored {
        cert.as_tsk().armored().to_vec()?
    } else {
        cert.as_tsk().to_vec()?
    };
    Ok(buf)
}

/// A keyring with a passphrase protected primary key and one signing subkey.
pub fn generate_keyring(passphrase: &str, armored: bool) -> anyhow::Result<(Cert, Vec<u8>)> {
    let (cert, _rev) = CertBuilder::new()
        .add_userid("Alice <alice@example.com>")
        .add_signing_subkey()
        .set_password(Some(passphrase.into()))
        .generate()?;
    let keyring = serialize_tsk(&cert, armored)?;
    Ok((cert, keyring))
}

pub fn generate_unprotected_keyring() -> anyhow::Result<(Cert, Vec<u8>)> {
    let (cert, _rev) = CertBuilder::new()
        .add_userid("Bob <bob@example.com>")
        .generate()?;
    let keyring = serialize_tsk(&cert, false)?;
    Ok((cert, keyring))
}

pub fn generate_keyring_with_encryption_subkey(
    passphrase: &str,
) -> anyhow::Result<(Cert, Vec<u8>)> {
    let (cert, _rev) = CertBuilder::new()
        .add_userid("Carol <carol@example.com>")
        .add_subkey(
            KeyFlags::empty()
                .set_transport_encryption()
                .set_storage_encryption(),
            None,
            None,
        )
        .set_password(Some(passphrase.into()))
        .generate()?;
    let keyring = serialize_tsk(&cert, false)?;
    Ok((cert, keyring))
}

/// Remove ascii armor if present.
pub fn dearmor(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    if !data.starts_with(b"-----BEGIN") {
        return Ok(data.to_vec());
    }
    let mut reader = armor::Reader::from_bytes(
        data,
        armor::ReaderMode::Tolerant(Some(armor::Kind::Signature)),
    );
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn parse_signature(data: &[u8]) -> anyhow::Result<Signature> {
    let data = dearmor(data)?;
    match Packet::from_bytes(&data)? {
        Packet::Signature(sig) => Ok(sig),
        packet => bail!("Expected signature packet, found: {:?}", packet.tag()),
    }
}

/// Verify a detached signature with any key of the certificate.
pub fn verify(cert: &Cert, signature: &[u8], data: &[u8]) -> anyhow::Result<Signature> {
    let mut sig = parse_signature(signature)?;
    for ka in cert.keys() {
        if sig.verify_message(ka.key(), data).is_ok() {
            return Ok(sig);
        }
    }
    Err(anyhow!("Signature does not verify with any key of {}", cert.fingerprint()))
}

/// Signs by emitting the key id followed by a plain digest of the data.
///
/// Output is deterministic and every chunk passed to `update` is recorded.
#[derive(Debug, Default, Clone)]
pub struct DigestBackend {
    pub chunks: Arc<Mutex<Vec<usize>>>,
    pub fail: bool,
}

impl DigestBackend {
    pub fn failing() -> Self {
        DigestBackend {
            fail: true,
            ..Default::default()
        }
    }

    pub fn chunks(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().clone()
    }
}

impl SigningBackend for DigestBackend {
    fn unlock(&self, record: &SecretKeyRecord, passphrase: &Password) -> Result<UnlockedPrivateKey> {
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
        Ok(Box::new(DigestAccumulator {
            key_id: key.key_id(),
            hash: digest.hash_algo().context()?,
            chunks: self.chunks.clone(),
            fail: self.fail,
        }))
    }
}

struct DigestAccumulator {
    key_id: u64,
    hash: Box<dyn hash::Digest>,
    chunks: Arc<Mutex<Vec<usize>>>,
    fail: bool,
}

impl SignatureAccumulator for DigestAccumulator {
    fn update(&mut self, data: &[u8]) {
        self.chunks.lock().unwrap().push(data.len());
        self.hash.update(data);
    }

    fn finalize(mut self: Box<Self>) -> sequoia_openpgp::Result<Vec<u8>> {
        if self.fail {
            bail!("Signing backend refused to sign");
        }
        let mut digest = vec![0; self.hash.digest_size()];
        self.hash.digest(&mut digest)?;

        let mut out = self.key_id.to_be_bytes().to_vec();
        out.extend(digest);
        Ok(out)
    }
}
