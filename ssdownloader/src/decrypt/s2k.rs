//! Iterated and salted string-to-key derivation (RFC 4880 section 3.7.1.3).

use sha2::{Digest, Sha256};

use super::error::{malformed, DecryptError, DecryptResult};

pub(crate) const S2K_ITERATED_SALTED: u8 = 3;
pub(crate) const HASH_SHA256: u8 = 8;

/// Iteration count the service encodes with.
pub const PROFILE_S2K_COUNT: usize = 65535;

const SALT_LEN: usize = 8;

/// Parsed string-to-key specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct S2k {
    pub salt: [u8; SALT_LEN],
    pub coded_count: u8,
}

impl S2k {
    /// Parse a specifier, returning it and the number of bytes consumed.
    pub fn parse(data: &[u8]) -> DecryptResult<(Self, usize)> {
        let mode = *data
            .first()
            .ok_or_else(|| malformed("missing string-to-key specifier"))?;
        if mode != S2K_ITERATED_SALTED {
            return Err(DecryptError::Unsupported {
                what: "string-to-key mode",
                value: mode,
            });
        }
        if data.len() < 3 + SALT_LEN {
            return Err(malformed("truncated string-to-key specifier"));
        }
        if data[1] != HASH_SHA256 {
            return Err(DecryptError::Unsupported {
                what: "string-to-key hash algorithm",
                value: data[1],
            });
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[2..2 + SALT_LEN]);
        Ok((
            Self {
                salt,
                coded_count: data[2 + SALT_LEN],
            },
            3 + SALT_LEN,
        ))
    }

    /// Serialize the specifier.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(S2K_ITERATED_SALTED);
        out.push(HASH_SHA256);
        out.extend_from_slice(&self.salt);
        out.push(self.coded_count);
    }

    /// Number of bytes fed to the hash.
    pub fn count(&self) -> usize {
        decode_count(self.coded_count)
    }

    /// Derive a 256-bit key from the passphrase.
    pub fn derive_key(&self, passphrase: &[u8]) -> [u8; 32] {
        let mut input = Vec::with_capacity(SALT_LEN + passphrase.len());
        input.extend_from_slice(&self.salt);
        input.extend_from_slice(passphrase);

        // the salted passphrase is always hashed at least once in full
        let count = self.count().max(input.len());
        let mut hasher = Sha256::new();
        for _ in 0..count / input.len() {
            hasher.update(&input);
        }
        hasher.update(&input[..count % input.len()]);
        hasher.finalize().into()
    }
}

/// Expand a coded count byte.
pub(crate) fn decode_count(coded: u8) -> usize {
    let coded = coded as usize;
    (16 + (coded & 15)) << ((coded >> 4) + 6)
}

/// Smallest coded count that covers `count` bytes.
pub(crate) fn encode_count(count: usize) -> u8 {
    (0..=u8::MAX)
        .find(|coded| decode_count(*coded) >= count)
        .unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_coding() {
        assert_eq!(decode_count(0), 1024);
        assert_eq!(decode_count(0x60), 65536);
        assert_eq!(decode_count(0xff), 65_011_712);
        assert_eq!(encode_count(PROFILE_S2K_COUNT), 0x60);
        assert_eq!(encode_count(65536), 0x60);
        assert_eq!(encode_count(65537), 0x61);
    }

    #[test]
    fn test_parse_rejects_other_hash() {
        let mut specifier = vec![S2K_ITERATED_SALTED, 2];
        specifier.extend_from_slice(&[0u8; 9]);
        let err = S2k::parse(&specifier).unwrap_err();
        assert!(matches!(
            err,
            DecryptError::Unsupported { value: 2, .. }
        ));
    }

    #[test]
    fn test_parse_rejects_simple_mode() {
        let err = S2k::parse(&[0, HASH_SHA256]).unwrap_err();
        assert!(matches!(err, DecryptError::Unsupported { value: 0, .. }));
    }

    #[test]
    fn test_parse_write_round_trip() {
        let s2k = S2k {
            salt: [1, 2, 3, 4, 5, 6, 7, 8],
            coded_count: 0x60,
        };
        let mut out = Vec::new();
        s2k.write(&mut out);
        assert_eq!(S2k::parse(&out).unwrap(), (s2k, 11));
    }

    #[test]
    fn test_derive_key_short_count_hashes_input_once() {
        let s2k = S2k {
            salt: [0u8; 8],
            coded_count: 0,
        };
        // input longer than the count is still hashed once in full
        let long = vec![b'a'; 2000];
        let expected: [u8; 32] = {
            let mut hasher = Sha256::new();
            hasher.update([0u8; 8]);
            hasher.update(&long);
            hasher.finalize().into()
        };
        assert_eq!(s2k.derive_key(&long), expected);
    }
}
