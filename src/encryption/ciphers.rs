// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! AES-GCM and AES-GCM-CTR module ciphers.
//!
//! Encrypted modules are framed as `length (4 LE) || nonce (12) || ciphertext
//! || tag (16)`, where `length` counts everything after the length field and
//! the tag is absent in CTR mode. Keys must be 16, 24 or 32 bytes.

use aes::cipher::consts::U12;
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, KeyInit, Nonce};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt::Debug;

use crate::errors::{ParquetError, Result};

pub(crate) const NONCE_LEN: usize = 12;
pub(crate) const TAG_LEN: usize = 16;
pub(crate) const SIZE_LEN: usize = 4;

/// Bytes added to a plaintext by GCM module framing
pub(crate) const GCM_CIPHERTEXT_DELTA: usize = SIZE_LEN + NONCE_LEN + TAG_LEN;
/// Bytes added to a plaintext by CTR module framing
pub(crate) const CTR_CIPHERTEXT_DELTA: usize = SIZE_LEN + NONCE_LEN;

type Aes192Gcm = AesGcm<Aes192, U12>;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes192Ctr = ctr::Ctr128BE<Aes192>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Encrypts Parquet modules, producing the framed module layout
pub trait BlockEncryptor: Debug + Send + Sync {
    /// Encrypts a plaintext under the given AAD
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

/// Decrypts framed Parquet modules
pub trait BlockDecryptor: Debug + Send + Sync {
    /// Decrypts a framed module (including its length prefix) under the given
    /// AAD
    fn decrypt(&self, length_and_ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

pub(crate) fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Compares two byte slices without early exit on the first difference
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// An AES-GCM key of any of the supported sizes
pub(crate) enum GcmCipher {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl GcmCipher {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        match key_bytes.len() {
            16 => Ok(Self::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key_bytes)
                    .map_err(|_| ParquetError::InvalidKeyLength(key_bytes.len() * 8))?,
            ))),
            24 => Ok(Self::Aes192(Box::new(
                Aes192Gcm::new_from_slice(key_bytes)
                    .map_err(|_| ParquetError::InvalidKeyLength(key_bytes.len() * 8))?,
            ))),
            32 => Ok(Self::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key_bytes)
                    .map_err(|_| ParquetError::InvalidKeyLength(key_bytes.len() * 8))?,
            ))),
            n => Err(ParquetError::InvalidKeyLength(n * 8)),
        }
    }

    /// Encrypts, returning `ciphertext || tag`
    pub(crate) fn seal(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let result = match self {
            Self::Aes128(cipher) => cipher.encrypt(nonce, payload),
            Self::Aes192(cipher) => cipher.encrypt(nonce, payload),
            Self::Aes256(cipher) => cipher.encrypt(nonce, payload),
        };
        result.map_err(|_| general_err!("AES-GCM encryption failed"))
    }

    /// Decrypts `ciphertext || tag`, authenticating the tag against the AAD
    pub(crate) fn open(
        &self,
        nonce: &[u8],
        ciphertext_and_tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_LEN || ciphertext_and_tag.len() < TAG_LEN {
            return Err(ParquetError::AuthenticationFailed(
                "AES-GCM module".to_string(),
            ));
        }
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload {
            msg: ciphertext_and_tag,
            aad,
        };
        let result = match self {
            Self::Aes128(cipher) => cipher.decrypt(nonce, payload),
            Self::Aes192(cipher) => cipher.decrypt(nonce, payload),
            Self::Aes256(cipher) => cipher.decrypt(nonce, payload),
        };
        result.map_err(|_| ParquetError::AuthenticationFailed("AES-GCM module".to_string()))
    }
}

fn ctr_apply_keystream(key_bytes: &[u8], nonce: &[u8], buffer: &mut [u8]) -> Result<()> {
    // The counter block is the 12-byte nonce followed by a 32-bit counter
    // starting at 1.
    let mut iv = [0u8; 16];
    iv[..NONCE_LEN].copy_from_slice(nonce);
    iv[15] = 1;
    match key_bytes.len() {
        16 => Aes128Ctr::new_from_slices(key_bytes, &iv)
            .map_err(|_| ParquetError::InvalidKeyLength(key_bytes.len() * 8))?
            .apply_keystream(buffer),
        24 => Aes192Ctr::new_from_slices(key_bytes, &iv)
            .map_err(|_| ParquetError::InvalidKeyLength(key_bytes.len() * 8))?
            .apply_keystream(buffer),
        32 => Aes256Ctr::new_from_slices(key_bytes, &iv)
            .map_err(|_| ParquetError::InvalidKeyLength(key_bytes.len() * 8))?
            .apply_keystream(buffer),
        n => return Err(ParquetError::InvalidKeyLength(n * 8)),
    }
    Ok(())
}

/// AES-GCM module encryptor producing `len || nonce || ciphertext || tag`
pub(crate) struct GcmBlockEncryptor {
    cipher: GcmCipher,
}

impl Debug for GcmBlockEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GcmBlockEncryptor")
    }
}

impl GcmBlockEncryptor {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            cipher: GcmCipher::new(key_bytes)?,
        })
    }

    /// Encrypts with a caller-provided nonce; used for footer signing where
    /// the nonce is stored in the file and re-fed by the reader.
    pub(crate) fn encrypt_with_nonce(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Vec<u8>> {
        let ciphertext_and_tag = self.cipher.seal(nonce, plaintext, aad)?;
        let mut buffer = Vec::with_capacity(SIZE_LEN + NONCE_LEN + ciphertext_and_tag.len());
        let length = (NONCE_LEN + ciphertext_and_tag.len()) as u32;
        buffer.extend_from_slice(&length.to_le_bytes());
        buffer.extend_from_slice(nonce);
        buffer.extend_from_slice(&ciphertext_and_tag);
        Ok(buffer)
    }
}

impl BlockEncryptor for GcmBlockEncryptor {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = random_nonce();
        self.encrypt_with_nonce(plaintext, aad, &nonce)
    }
}

/// AES-GCM module decryptor
pub(crate) struct GcmBlockDecryptor {
    cipher: GcmCipher,
}

impl Debug for GcmBlockDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GcmBlockDecryptor")
    }
}

impl GcmBlockDecryptor {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            cipher: GcmCipher::new(key_bytes)?,
        })
    }
}

impl BlockDecryptor for GcmBlockDecryptor {
    fn decrypt(&self, length_and_ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if length_and_ciphertext.len() < GCM_CIPHERTEXT_DELTA {
            return Err(eof_err!(
                "encrypted module of {} bytes is shorter than the GCM framing",
                length_and_ciphertext.len()
            ));
        }
        let nonce = &length_and_ciphertext[SIZE_LEN..SIZE_LEN + NONCE_LEN];
        let ciphertext_and_tag = &length_and_ciphertext[SIZE_LEN + NONCE_LEN..];
        self.cipher.open(nonce, ciphertext_and_tag, aad)
    }
}

/// AES-CTR module encryptor producing `len || nonce || ciphertext`.
///
/// Used for page payloads in [`ParquetCipher::AesGcmCtrV1`] files, where the
/// pages stay authenticated through the encrypted metadata.
///
/// [`ParquetCipher::AesGcmCtrV1`]: crate::basic::ParquetCipher::AesGcmCtrV1
pub(crate) struct CtrBlockEncryptor {
    key_bytes: Vec<u8>,
}

impl Debug for CtrBlockEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CtrBlockEncryptor")
    }
}

impl CtrBlockEncryptor {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        match key_bytes.len() {
            16 | 24 | 32 => Ok(Self {
                key_bytes: key_bytes.to_vec(),
            }),
            n => Err(ParquetError::InvalidKeyLength(n * 8)),
        }
    }
}

impl BlockEncryptor for CtrBlockEncryptor {
    fn encrypt(&self, plaintext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = random_nonce();
        let mut buffer = Vec::with_capacity(CTR_CIPHERTEXT_DELTA + plaintext.len());
        let length = (NONCE_LEN + plaintext.len()) as u32;
        buffer.extend_from_slice(&length.to_le_bytes());
        buffer.extend_from_slice(&nonce);
        buffer.extend_from_slice(plaintext);
        ctr_apply_keystream(&self.key_bytes, &nonce, &mut buffer[CTR_CIPHERTEXT_DELTA..])?;
        Ok(buffer)
    }
}

/// AES-CTR module decryptor
pub(crate) struct CtrBlockDecryptor {
    key_bytes: Vec<u8>,
}

impl Debug for CtrBlockDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CtrBlockDecryptor")
    }
}

impl CtrBlockDecryptor {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        match key_bytes.len() {
            16 | 24 | 32 => Ok(Self {
                key_bytes: key_bytes.to_vec(),
            }),
            n => Err(ParquetError::InvalidKeyLength(n * 8)),
        }
    }
}

impl BlockDecryptor for CtrBlockDecryptor {
    fn decrypt(&self, length_and_ciphertext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        if length_and_ciphertext.len() < CTR_CIPHERTEXT_DELTA {
            return Err(eof_err!(
                "encrypted module of {} bytes is shorter than the CTR framing",
                length_and_ciphertext.len()
            ));
        }
        let nonce = &length_and_ciphertext[SIZE_LEN..SIZE_LEN + NONCE_LEN];
        let mut plaintext = length_and_ciphertext[CTR_CIPHERTEXT_DELTA..].to_vec();
        ctr_apply_keystream(&self.key_bytes, nonce, &mut plaintext)?;
        Ok(plaintext)
    }
}

/// Recomputes the signed-footer module for a plaintext footer.
///
/// Identical to a GCM module encryption except that the nonce is supplied by
/// the caller rather than drawn from the CSPRNG, so that the reader can
/// reproduce the ciphertext written by the signer and compare tags.
pub(crate) fn signed_footer_encrypt(
    footer: &[u8],
    key_bytes: &[u8],
    aad: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    GcmBlockEncryptor::new(key_bytes)?.encrypt_with_nonce(footer, aad, nonce)
}
