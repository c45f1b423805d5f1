//! The fixed symmetric OpenPGP profile used for SendSafely segments.
//!
//! A segment is a symmetric-key encrypted session key packet followed by an
//! integrity protected data packet:
//!
//! - session key: version 4, AES-256, iterated+salted SHA-256 string-to-key
//! - data: AES-256 CFB with a zero IV, 16-byte random prefix, 2 check bytes
//!   and a trailing SHA-1 modification detection code
//! - content: a literal data packet, optionally inside an uncompressed
//!   compressed-data packet

use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha1::{Digest, Sha1};

use super::error::{malformed, DecryptError, DecryptResult};
use super::packet::{
    read_packets, write_packet, TAG_COMPRESSED, TAG_LITERAL, TAG_MARKER, TAG_SED, TAG_SEIPD,
    TAG_SKESK,
};
use super::s2k::{encode_count, S2k, PROFILE_S2K_COUNT};
use super::OneShotPassphrase;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

const CIPHER_AES256: u8 = 9;
const COMPRESSION_NONE: u8 = 0;
const SKESK_VERSION: u8 = 4;
const SEIPD_VERSION: u8 = 1;
const BLOCK_SIZE: usize = 16;
const KEY_SIZE: usize = 32;
/// MDC packet: 0xD3 0x14 header plus a 20-byte SHA-1.
const MDC_LEN: usize = 22;
const MDC_HEADER: [u8; 2] = [0xd3, 0x14];

/// Decrypted content of a literal data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralData {
    pub file_name: String,
    pub created: DateTime<Utc>,
    pub data: Vec<u8>,
}

fn cfb_decrypt(key: &[u8], buf: &mut [u8]) -> DecryptResult<()> {
    Aes256CfbDec::new_from_slices(key, &[0u8; BLOCK_SIZE])
        .map_err(|e| DecryptError::Cipher(e.to_string()))?
        .decrypt(buf);
    Ok(())
}

fn cfb_encrypt(key: &[u8], buf: &mut [u8]) -> DecryptResult<()> {
    Aes256CfbEnc::new_from_slices(key, &[0u8; BLOCK_SIZE])
        .map_err(|e| DecryptError::Cipher(e.to_string()))?
        .encrypt(buf);
    Ok(())
}

/// Decrypt a complete message and return its literal content.
pub fn decrypt_message(
    message: &[u8],
    passphrase: &OneShotPassphrase,
) -> DecryptResult<LiteralData> {
    let mut session_key_packet = None;
    let mut data_packet = None;
    for packet in read_packets(message)? {
        match packet.tag {
            TAG_MARKER => continue,
            TAG_SKESK if session_key_packet.is_none() => session_key_packet = Some(packet.body),
            TAG_SKESK => continue,
            TAG_SEIPD => {
                data_packet = Some(packet.body);
                break;
            }
            TAG_SED => {
                return Err(DecryptError::Unsupported {
                    what: "packet type (no integrity protection)",
                    value: TAG_SED,
                })
            }
            other => {
                return Err(DecryptError::Unsupported {
                    what: "packet type",
                    value: other,
                })
            }
        }
    }

    let session_key_packet = session_key_packet
        .ok_or(DecryptError::MissingPacket("symmetric-key encrypted session key"))?;
    let data_packet =
        data_packet.ok_or(DecryptError::MissingPacket("integrity protected data"))?;

    let key = session_key(&session_key_packet, passphrase)?;
    let plaintext = decrypt_protected_data(&data_packet, &key)?;
    read_literal(&plaintext)
}

/// Recover the session key from a symmetric-key encrypted session key packet.
fn session_key(body: &[u8], passphrase: &OneShotPassphrase) -> DecryptResult<[u8; KEY_SIZE]> {
    if body.len() < 2 {
        return Err(malformed("session key packet too short"));
    }
    if body[0] != SKESK_VERSION {
        return Err(DecryptError::Unsupported {
            what: "session key packet version",
            value: body[0],
        });
    }
    if body[1] != CIPHER_AES256 {
        return Err(DecryptError::Unsupported {
            what: "cipher algorithm",
            value: body[1],
        });
    }

    let (s2k, used) = S2k::parse(&body[2..])?;
    let derived = s2k.derive_key(passphrase.take()?.as_bytes());

    let encrypted_key = &body[2 + used..];
    if encrypted_key.is_empty() {
        return Ok(derived);
    }

    let mut decrypted = encrypted_key.to_vec();
    cfb_decrypt(&derived, &mut decrypted)?;
    match decrypted.split_first() {
        Some((&CIPHER_AES256, key)) if key.len() == KEY_SIZE => {
            let mut session_key = [0u8; KEY_SIZE];
            session_key.copy_from_slice(key);
            Ok(session_key)
        }
        Some((&CIPHER_AES256, _)) => Err(malformed("encrypted session key has the wrong length")),
        Some((&algorithm, _)) => Err(DecryptError::Unsupported {
            what: "session key cipher algorithm",
            value: algorithm,
        }),
        None => Err(malformed("empty encrypted session key")),
    }
}

/// Decrypt an integrity protected data packet body and verify it.
fn decrypt_protected_data(body: &[u8], key: &[u8]) -> DecryptResult<Vec<u8>> {
    let (&version, ciphertext) = body
        .split_first()
        .ok_or_else(|| malformed("empty integrity protected data packet"))?;
    if version != SEIPD_VERSION {
        return Err(DecryptError::Unsupported {
            what: "integrity protected data version",
            value: version,
        });
    }
    if ciphertext.len() < BLOCK_SIZE + 2 + MDC_LEN {
        return Err(malformed("integrity protected data packet too short"));
    }

    let mut plain = ciphertext.to_vec();
    cfb_decrypt(key, &mut plain)?;

    if plain[BLOCK_SIZE - 2..BLOCK_SIZE] != plain[BLOCK_SIZE..BLOCK_SIZE + 2] {
        return Err(DecryptError::QuickCheckFailed);
    }

    let mdc_start = plain.len() - MDC_LEN;
    if plain[mdc_start..mdc_start + 2] != MDC_HEADER {
        return Err(DecryptError::IntegrityCheckFailed);
    }
    let digest = Sha1::digest(&plain[..mdc_start + 2]);
    if digest.as_slice() != &plain[mdc_start + 2..] {
        return Err(DecryptError::IntegrityCheckFailed);
    }

    plain.truncate(mdc_start);
    plain.drain(..BLOCK_SIZE + 2);
    Ok(plain)
}

/// Find the literal data packet, unwrapping uncompressed containers.
fn read_literal(data: &[u8]) -> DecryptResult<LiteralData> {
    for packet in read_packets(data)? {
        match packet.tag {
            TAG_MARKER => continue,
            TAG_COMPRESSED => {
                let (&algorithm, inner) = packet
                    .body
                    .split_first()
                    .ok_or_else(|| malformed("empty compressed data packet"))?;
                if algorithm != COMPRESSION_NONE {
                    return Err(DecryptError::Unsupported {
                        what: "compression algorithm",
                        value: algorithm,
                    });
                }
                return read_literal(inner);
            }
            TAG_LITERAL => return parse_literal(&packet.body),
            other => {
                return Err(DecryptError::Unsupported {
                    what: "packet type",
                    value: other,
                })
            }
        }
    }
    Err(DecryptError::MissingPacket("literal data"))
}

fn parse_literal(body: &[u8]) -> DecryptResult<LiteralData> {
    if body.len() < 2 {
        return Err(malformed("literal data packet too short"));
    }
    let name_len = body[1] as usize;
    let header_len = 2 + name_len + 4;
    if body.len() < header_len {
        return Err(malformed("literal data packet header truncated"));
    }
    let file_name = String::from_utf8_lossy(&body[2..2 + name_len]).into_owned();
    let date = &body[2 + name_len..header_len];
    let created_secs = u32::from_be_bytes([date[0], date[1], date[2], date[3]]);
    Ok(LiteralData {
        file_name,
        created: DateTime::from_timestamp(i64::from(created_secs), 0).unwrap_or_default(),
        data: body[header_len..].to_vec(),
    })
}

/// Encrypt `data` in the segment profile.
pub fn encrypt_message(
    data: &[u8],
    passphrase: &str,
    file_name: &str,
    created: DateTime<Utc>,
) -> DecryptResult<Vec<u8>> {
    let mut rng = rand::rng();

    let mut salt = [0u8; 8];
    rng.fill_bytes(&mut salt);
    let s2k = S2k {
        salt,
        coded_count: encode_count(PROFILE_S2K_COUNT),
    };
    let key = s2k.derive_key(passphrase.as_bytes());

    let mut session_key_body = vec![SKESK_VERSION, CIPHER_AES256];
    s2k.write(&mut session_key_body);

    let name = &file_name.as_bytes()[..file_name.len().min(u8::MAX as usize)];
    let mut literal = vec![b'b', name.len() as u8];
    literal.extend_from_slice(name);
    literal.extend_from_slice(&u32::try_from(created.timestamp()).unwrap_or(0).to_be_bytes());
    literal.extend_from_slice(data);

    let mut compressed = vec![COMPRESSION_NONE];
    write_packet(&mut compressed, TAG_LITERAL, &literal);

    let mut prefix = [0u8; BLOCK_SIZE];
    rng.fill_bytes(&mut prefix);
    let mut plain = Vec::with_capacity(BLOCK_SIZE + 2 + compressed.len() + 8 + MDC_LEN);
    plain.extend_from_slice(&prefix);
    plain.extend_from_slice(&prefix[BLOCK_SIZE - 2..]);
    write_packet(&mut plain, TAG_COMPRESSED, &compressed);
    plain.extend_from_slice(&MDC_HEADER);
    let digest = Sha1::digest(&plain);
    plain.extend_from_slice(&digest);
    cfb_encrypt(&key, &mut plain)?;

    let mut data_body = Vec::with_capacity(plain.len() + 1);
    data_body.push(SEIPD_VERSION);
    data_body.extend_from_slice(&plain);

    let mut message = Vec::new();
    write_packet(&mut message, TAG_SKESK, &session_key_body);
    write_packet(&mut message, TAG_SEIPD, &data_body);
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSPHRASE: &str = "ACbuj9NKTkvjZ71Gc0t5zuU1xvba9XAouAMYKEYCODE";

    /// Produced by GnuPG with AES-256, SHA-256 S2K (count 65536), no compression.
    const GPG_SEGMENT: &str = "8c0d0409030829e19c5dd0408abf60d25a01d5ca658e03eb76613c5c0dc76df8351c362f8b2f60cce2e25cbd25070f40343605eb184d59325a66e4fd17e47e65081ec4acaa5cae226690b28f5bba75ba99a7f84629709b7610f17c7031b5a4a65d5df1010f9046f870194a";

    /// Same profile with zip compression.
    const GPG_ZIP_SEGMENT: &str = "8c0d04090308d6cae4ba8f7ca08d60d24001f937e5a5af5dac3bf2ae4f2937f8ff3f94d32b485875f4a8ae91c7d1f17423ea0575299d971d36d82641b48412e785a04f9c1e4ce24ae0cbff24d43520e6c2";

    /// Same profile with AES-128.
    const GPG_AES128_SEGMENT: &str = "8c0d040703082cf9595bf85e78d760d23c0113a5d6389f1e65f7026344ae188d17555b123e1504c2bf7127326a183c90919e93d26f82c8b1f578f11ef88a96d7cb2a074ed39cffe54f47ea6fc0";

    fn created() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_decrypt_gpg_segment() {
        let message = hex::decode(GPG_SEGMENT).unwrap();
        let literal = decrypt_message(&message, &OneShotPassphrase::new(PASSPHRASE)).unwrap();
        assert_eq!(literal.file_name, "plain.txt");
        assert_eq!(literal.data, b"hello from a sendsafely segment\n");
    }

    #[test]
    fn test_decrypt_gpg_segment_wrong_passphrase() {
        let message = hex::decode(GPG_SEGMENT).unwrap();
        let err = decrypt_message(&message, &OneShotPassphrase::new("wrong")).unwrap_err();
        assert!(matches!(
            err,
            DecryptError::QuickCheckFailed | DecryptError::IntegrityCheckFailed
        ));
    }

    #[test]
    fn test_rejects_compression() {
        let message = hex::decode(GPG_ZIP_SEGMENT).unwrap();
        let err = decrypt_message(&message, &OneShotPassphrase::new(PASSPHRASE)).unwrap_err();
        assert!(matches!(
            err,
            DecryptError::Unsupported {
                what: "compression algorithm",
                value: 1
            }
        ));
    }

    #[test]
    fn test_rejects_other_cipher_before_asking_for_passphrase() {
        let message = hex::decode(GPG_AES128_SEGMENT).unwrap();
        let passphrase = OneShotPassphrase::new(PASSPHRASE);
        let err = decrypt_message(&message, &passphrase).unwrap_err();
        assert!(matches!(err, DecryptError::Unsupported { value: 7, .. }));
        assert!(passphrase.take().is_ok());
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let message = encrypt_message(&data, PASSPHRASE, "report.tar.gz.1", created()).unwrap();
        let literal = decrypt_message(&message, &OneShotPassphrase::new(PASSPHRASE)).unwrap();
        assert_eq!(literal.data, data);
        assert_eq!(literal.file_name, "report.tar.gz.1");
        assert_eq!(literal.created, created());
    }

    #[test]
    fn test_tampered_ciphertext_fails_integrity() {
        let mut message = encrypt_message(b"some bytes worth protecting", PASSPHRASE, "f", created())
            .unwrap();
        let last = message.len() - 25;
        message[last] ^= 0x01;
        let err = decrypt_message(&message, &OneShotPassphrase::new(PASSPHRASE)).unwrap_err();
        assert!(matches!(err, DecryptError::IntegrityCheckFailed));
    }

    #[test]
    fn test_passphrase_is_single_use() {
        let message = encrypt_message(b"x", PASSPHRASE, "f", created()).unwrap();
        let passphrase = OneShotPassphrase::new(PASSPHRASE);
        decrypt_message(&message, &passphrase).unwrap();
        let err = decrypt_message(&message, &passphrase).unwrap_err();
        assert!(matches!(err, DecryptError::PassphraseAlreadyUsed));
    }

    #[test]
    fn test_missing_data_packet() {
        let message = hex::decode(GPG_SEGMENT).unwrap();
        let err = decrypt_message(&message[..15], &OneShotPassphrase::new(PASSPHRASE)).unwrap_err();
        assert!(matches!(err, DecryptError::MissingPacket(_)));
    }

    #[test]
    fn test_not_a_message() {
        let err = decrypt_message(b"plain text", &OneShotPassphrase::new(PASSPHRASE)).unwrap_err();
        assert!(matches!(err, DecryptError::Malformed(_)));
    }
}
