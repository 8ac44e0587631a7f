use crate::errors::*;
use crate::keyring::SecretKeyRecord;

const SHORT_KEY_ID_MASK: u64 = 0xFFFF_FFFF;

/// Parse a hex key id, either the full 64 bit form or the 32 bit short form.
///
/// Surrounding whitespace and a `0x` prefix are ignored.
pub fn parse_identifier(identifier: &str) -> Result<u64> {
    let invalid = || Error::InvalidIdentifier {
        identifier: identifier.to_string(),
    };

    let hex = identifier.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);

    if hex.is_empty() || hex.len() > 16 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u64::from_str_radix(hex, 16).map_err(|_| invalid())
}

fn matches(key_id: u64, wanted: u64) -> bool {
    key_id == wanted || key_id & SHORT_KEY_ID_MASK == wanted
}

/// Position of the first key id that equals `wanted`, or whose low 32 bits do.
pub fn find_index<I: IntoIterator<Item = u64>>(key_ids: I, wanted: u64) -> Option<usize> {
    key_ids.into_iter().position(|key_id| matches(key_id, wanted))
}

/// Select the secret key matching `identifier`, the first match in keyring order wins.
pub fn resolve<'a>(records: &'a [SecretKeyRecord], identifier: &str) -> Result<&'a SecretKeyRecord> {
    let wanted = parse_identifier(identifier)?;

    let idx = find_index(records.iter().map(|r| r.key_id()), wanted).ok_or_else(|| {
        Error::KeyNotFound {
            identifier: identifier.to_string(),
        }
    })?;
    let record = &records[idx];

    let others = records[idx + 1..]
        .iter()
        .filter(|r| matches(r.key_id(), wanted))
        .count();
    if others > 0 {
        debug!(
            "Key id {:?} also matches {} other key(s), using the first one: {}",
            identifier,
            others,
            record.key_id_hex()
        );
    }

    debug!(
        "Selected secret key {} ({}) of certificate {}",
        record.key_id_hex(),
        record.algorithm(),
        record.cert()
    );
    Ok(record)
}
