//! Byte-level sealing for locally stored blobs (transaction records and the
//! password-sealed account). BLAKE2b keystream plus a keyed integrity tag;
//! not circuit-visible, so a field-friendly cipher is not required here.

use blake2b_simd::blake2b;

use crate::error::VeilError;

const TAG_LEN: usize = 16;

fn keystream_block(key: &[u8; 32], counter: u64) -> [u8; 64] {
    let mut input = Vec::with_capacity(40);
    input.extend_from_slice(key);
    input.extend_from_slice(&counter.to_le_bytes());
    let digest = blake2b(&input);
    let mut block = [0u8; 64];
    block.copy_from_slice(digest.as_bytes());
    block
}

fn tag(key: &[u8; 32], ciphertext: &[u8]) -> [u8; TAG_LEN] {
    let mut input = Vec::with_capacity(32 + 1 + ciphertext.len());
    input.extend_from_slice(key);
    input.push(0x74); // domain separator for the tag
    input.extend_from_slice(ciphertext);
    let digest = blake2b(&input);
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&digest.as_bytes()[..TAG_LEN]);
    out
}

/// Encrypts `plaintext` under `key`, appending an integrity tag.
pub fn seal_bytes(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(plaintext.len() + TAG_LEN);
    for (i, chunk) in plaintext.chunks(64).enumerate() {
        let block = keystream_block(key, i as u64);
        out.extend(chunk.iter().zip(block.iter()).map(|(p, k)| p ^ k));
    }
    let t = tag(key, &out);
    out.extend_from_slice(&t);
    out
}

/// Reverses [`seal_bytes`], failing on a bad tag (wrong key or tampering).
pub fn unseal_bytes(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, VeilError> {
    if sealed.len() < TAG_LEN {
        return Err(VeilError::Crypto("sealed blob too short"));
    }
    let (ciphertext, stored_tag) = sealed.split_at(sealed.len() - TAG_LEN);
    if tag(key, ciphertext).as_slice() != stored_tag {
        return Err(VeilError::Crypto("sealed blob tag mismatch"));
    }
    let mut out = Vec::with_capacity(ciphertext.len());
    for (i, chunk) in ciphertext.chunks(64).enumerate() {
        let block = keystream_block(key, i as u64);
        out.extend(chunk.iter().zip(block.iter()).map(|(c, k)| c ^ k));
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seal_round_trip() {
        let key = [3u8; 32];
        let message = b"four new key pairs walk into a tree";
        let sealed = seal_bytes(&key, message);
        assert_eq!(unseal_bytes(&key, &sealed).unwrap(), message);
    }

    #[test]
    fn test_unseal_rejects_wrong_key() {
        let sealed = seal_bytes(&[1u8; 32], b"secret");
        assert!(unseal_bytes(&[2u8; 32], &sealed).is_err());
    }

    #[test]
    fn test_unseal_rejects_tampering() {
        let mut sealed = seal_bytes(&[1u8; 32], b"secret");
        sealed[0] ^= 0x01;
        assert!(unseal_bytes(&[1u8; 32], &sealed).is_err());
    }
}
