//! Byte transform pipeline applied to every stored block.
//!
//! **Design**:
//! - Write path: `plaintext -> [gzip] -> [AES-256-CBC] -> stored bytes`
//! - Read path: `stored bytes -> [decrypt] -> [gunzip] -> plaintext`
//! - Key derivation: `SHA-256(password)`, one password per archive
//! - IV: the raw 16 bytes of the owning entry's identifier; the index block
//!   uses the all-zero identifier and is always compressed
//!
//! Using the entry id as the IV is sound only because ids are freshly
//! generated 128-bit random values that are never reused under one password.
//! A stricter format would store a random IV per write; this one does not,
//! for compatibility with the on-disk layout.

use crate::error::{CofferError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Identifier used as the IV for index blocks.
pub const ZERO_ID: [u8; 16] = [0u8; 16];

/// Apply the write-side pipeline to `data`.
pub fn encode(id: &[u8; 16], compress: bool, password: Option<&[u8]>, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = if compress {
        compress_block(data)?
    } else {
        data.to_vec()
    };

    if let Some(password) = password {
        let key = derive_key(password);
        out = encrypt_block(&key, id, &out);
    }

    Ok(out)
}

/// Reverse the pipeline over `stored`, producing the original plaintext.
pub fn decode(id: &[u8; 16], compress: bool, password: Option<&[u8]>, stored: &[u8]) -> Result<Vec<u8>> {
    let mut out = if let Some(password) = password {
        let key = derive_key(password);
        decrypt_block(&key, id, stored)?
    } else {
        stored.to_vec()
    };

    if compress {
        out = decompress_block(&out)?;
    }

    Ok(out)
}

/// Derive the symmetric key from the archive password.
pub fn derive_key(password: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(password);
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

fn compress_block(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decompress_block(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn encrypt_block(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(data)
}

fn decrypt_block(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(CofferError::Crypto(format!(
            "Ciphertext length {} is not a positive multiple of the block size",
            data.len()
        )));
    }

    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|e| CofferError::Crypto(e.to_string()))
}
