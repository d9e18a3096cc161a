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

//! Shared state and helpers of the key-management tools: the KMS client
//! cache, the writer- and reader-side KEK caches, and local AES-GCM key
//! wrapping.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use log::debug;
use std::sync::Mutex;
use std::time::Duration;

use crate::encryption::ciphers::{self, GcmCipher, NONCE_LEN};
use crate::encryption::key_management::key_wrapper::KeyEncryptionKey;
use crate::encryption::key_management::kms::{
    KmsClientFactory, KmsClientRef, KmsConnectionConfig, LocalWrapKmsClient,
};
use crate::encryption::key_management::two_level_cache::{InnerCache, TwoLevelCacheWithExpiration};
use crate::errors::{ParquetError, Result};
use std::sync::Arc;

/// Owns the caches shared by all wrappers and unwrappers created from one
/// [`CryptoFactory`](super::crypto_factory::CryptoFactory).
///
/// Each cache is two-level: the outer level expires per KMS access token, the
/// inner level is keyed by KMS instance id (clients), master key id (writer
/// KEKs) or KEK id (reader KEKs). Sweeps happen opportunistically whenever a
/// cache is accessed, at most once per cache lifetime.
pub(crate) struct KeyToolkit {
    kms_client_factory: Mutex<Box<dyn KmsClientFactory>>,
    kms_client_cache: TwoLevelCacheWithExpiration<KmsClientRef>,
    kek_write_cache: TwoLevelCacheWithExpiration<KeyEncryptionKey>,
    kek_read_cache: TwoLevelCacheWithExpiration<Vec<u8>>,
}

impl KeyToolkit {
    pub(crate) fn new(kms_client_factory: Box<dyn KmsClientFactory>) -> Self {
        Self {
            kms_client_factory: Mutex::new(kms_client_factory),
            kms_client_cache: TwoLevelCacheWithExpiration::new(),
            kek_write_cache: TwoLevelCacheWithExpiration::new(),
            kek_read_cache: TwoLevelCacheWithExpiration::new(),
        }
    }

    /// Returns the KMS client for the configured instance, creating and
    /// caching one per (access token, KMS instance id) as needed. With
    /// `wrap_locally`, the created client is wrapped so that key wrapping
    /// happens in-process with fetched master keys.
    pub(crate) fn get_kms_client(
        &self,
        kms_connection_config: &KmsConnectionConfig,
        wrap_locally: bool,
        cache_lifetime: Option<Duration>,
    ) -> Result<KmsClientRef> {
        if let Some(cleanup_period) = cache_lifetime {
            self.kms_client_cache
                .check_cache_for_expired_tokens(cleanup_period);
        }
        let inner = self.kms_client_cache.get_or_create_internal_cache(
            &kms_connection_config.key_access_token(),
            cache_lifetime,
        );
        let mut inner = inner.lock().unwrap();
        let kms_instance_id = kms_connection_config.kms_instance_id();
        if let Some(client) = inner.get(kms_instance_id) {
            return Ok(client.clone());
        }
        debug!("creating KMS client for instance '{kms_instance_id}'");
        let client_factory = self.kms_client_factory.lock().unwrap();
        let mut client = client_factory.create_client(kms_connection_config)?;
        if wrap_locally {
            client = Arc::new(LocalWrapKmsClient::new(client));
        }
        inner.insert(kms_instance_id.to_owned(), client.clone());
        Ok(client)
    }

    /// The writer-side KEK cache for the current access token: one generated
    /// KEK per master key id
    pub(crate) fn kek_write_cache(
        &self,
        kms_connection_config: &KmsConnectionConfig,
        cache_lifetime: Option<Duration>,
    ) -> InnerCache<KeyEncryptionKey> {
        if let Some(cleanup_period) = cache_lifetime {
            self.kek_write_cache
                .check_cache_for_expired_tokens(cleanup_period);
        }
        self.kek_write_cache
            .get_or_create_internal_cache(&kms_connection_config.key_access_token(), cache_lifetime)
    }

    /// The reader-side KEK cache for the current access token: unwrapped KEK
    /// bytes per base64 KEK id
    pub(crate) fn kek_read_cache(
        &self,
        kms_connection_config: &KmsConnectionConfig,
        cache_lifetime: Option<Duration>,
    ) -> InnerCache<Vec<u8>> {
        if let Some(cleanup_period) = cache_lifetime {
            self.kek_read_cache
                .check_cache_for_expired_tokens(cleanup_period);
        }
        self.kek_read_cache
            .get_or_create_internal_cache(&kms_connection_config.key_access_token(), cache_lifetime)
    }

    /// Drops all cached state for one access token
    pub(crate) fn remove_cache_entries_for_token(&self, access_token: &str) {
        self.kms_client_cache.remove(access_token);
        self.kek_write_cache.remove(access_token);
        self.kek_read_cache.remove(access_token);
    }

    /// Drops all cached state for all access tokens
    pub(crate) fn clear_caches(&self) {
        self.kms_client_cache.clear();
        self.kek_write_cache.clear();
        self.kek_read_cache.clear();
    }
}

/// Encrypts a key with AES-GCM in-process, returning base64 of
/// `nonce || ciphertext || tag`
pub(crate) fn encrypt_key_locally(
    key_bytes: &[u8],
    master_key_bytes: &[u8],
    aad: &[u8],
) -> Result<String> {
    let cipher = GcmCipher::new(master_key_bytes)?;
    let nonce = ciphers::random_nonce();
    let ciphertext_and_tag = cipher.seal(&nonce, key_bytes, aad)?;

    let mut encrypted_key = Vec::with_capacity(NONCE_LEN + ciphertext_and_tag.len());
    encrypted_key.extend_from_slice(&nonce);
    encrypted_key.extend_from_slice(&ciphertext_and_tag);
    Ok(BASE64_STANDARD.encode(&encrypted_key))
}

/// Inverse of [`encrypt_key_locally`]
pub(crate) fn decrypt_key_locally(
    encoded_encrypted_key: &str,
    master_key_bytes: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let encrypted_key = BASE64_STANDARD.decode(encoded_encrypted_key).map_err(|e| {
        ParquetError::MalformedKeyMaterial(format!("could not base64 decode encrypted key: {e}"))
    })?;
    if encrypted_key.len() < NONCE_LEN {
        return Err(ParquetError::MalformedKeyMaterial(
            "encrypted key is shorter than its nonce".to_string(),
        ));
    }
    let cipher = GcmCipher::new(master_key_bytes)?;
    cipher.open(
        &encrypted_key[..NONCE_LEN],
        &encrypted_key[NONCE_LEN..],
        aad,
    )
}
