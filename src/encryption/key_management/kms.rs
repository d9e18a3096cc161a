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

//! The Key Management Service (KMS) client abstraction.
//!
//! A [`KmsClient`] wraps and unwraps data encryption keys with master keys
//! that never leave the KMS — unless local wrapping is enabled, in which case
//! [`LocalWrapKmsClient`] fetches master keys once and performs the AES-GCM
//! wrapping in-process. [`InMemoryKms`] is a deterministic KMS used in tests
//! and examples.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use crate::encryption::key_management::key_toolkit;
use crate::errors::{ParquetError, Result};

/// Default value of the KMS instance ID, URL and access token when not
/// configured
pub const DEFAULT_KMS_VALUE: &str = "DEFAULT";

const LOCAL_WRAP_NO_KEY_VERSION: &str = "NO_VERSION";

/// Connection settings for a KMS instance.
///
/// The key access token is interior-mutable so that long-lived readers can
/// pick up refreshed credentials; see
/// [`refresh_key_access_token`](Self::refresh_key_access_token).
#[derive(Debug)]
pub struct KmsConnectionConfig {
    kms_instance_id: String,
    kms_instance_url: String,
    key_access_token: RwLock<String>,
    custom_kms_conf: HashMap<String, String>,
}

impl Clone for KmsConnectionConfig {
    fn clone(&self) -> Self {
        Self {
            kms_instance_id: self.kms_instance_id.clone(),
            kms_instance_url: self.kms_instance_url.clone(),
            key_access_token: RwLock::new(self.key_access_token.read().unwrap().clone()),
            custom_kms_conf: self.custom_kms_conf.clone(),
        }
    }
}

impl Default for KmsConnectionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl KmsConnectionConfig {
    /// Returns a new builder for a [`KmsConnectionConfig`]
    pub fn builder() -> KmsConnectionConfigBuilder {
        KmsConnectionConfigBuilder::default()
    }

    /// Identifier of the KMS instance to use
    pub fn kms_instance_id(&self) -> &str {
        &self.kms_instance_id
    }

    /// URL of the KMS instance to use
    pub fn kms_instance_url(&self) -> &str {
        &self.kms_instance_url
    }

    /// The current key access token
    pub fn key_access_token(&self) -> String {
        self.key_access_token.read().unwrap().clone()
    }

    /// KMS-implementation specific settings
    pub fn custom_kms_conf(&self) -> &HashMap<String, String> {
        &self.custom_kms_conf
    }

    /// Replaces the key access token with a refreshed value
    pub fn refresh_key_access_token(&self, new_token: String) {
        *self.key_access_token.write().unwrap() = new_token;
    }

    pub(crate) fn set_kms_instance_id(&mut self, kms_instance_id: String) {
        self.kms_instance_id = kms_instance_id;
    }

    pub(crate) fn set_kms_instance_url(&mut self, kms_instance_url: String) {
        self.kms_instance_url = kms_instance_url;
    }
}

/// Builder for [`KmsConnectionConfig`]
pub struct KmsConnectionConfigBuilder {
    kms_instance_id: String,
    kms_instance_url: String,
    key_access_token: String,
    custom_kms_conf: HashMap<String, String>,
}

impl Default for KmsConnectionConfigBuilder {
    fn default() -> Self {
        Self {
            kms_instance_id: DEFAULT_KMS_VALUE.to_owned(),
            kms_instance_url: DEFAULT_KMS_VALUE.to_owned(),
            key_access_token: DEFAULT_KMS_VALUE.to_owned(),
            custom_kms_conf: HashMap::default(),
        }
    }
}

impl KmsConnectionConfigBuilder {
    /// Sets the KMS instance identifier
    pub fn set_kms_instance_id(mut self, kms_instance_id: String) -> Self {
        self.kms_instance_id = kms_instance_id;
        self
    }

    /// Sets the KMS instance URL
    pub fn set_kms_instance_url(mut self, kms_instance_url: String) -> Self {
        self.kms_instance_url = kms_instance_url;
        self
    }

    /// Sets the key access token
    pub fn set_key_access_token(mut self, key_access_token: String) -> Self {
        self.key_access_token = key_access_token;
        self
    }

    /// Sets a KMS-implementation specific option
    pub fn set_custom_kms_conf_option(mut self, key: String, value: String) -> Self {
        self.custom_kms_conf.insert(key, value);
        self
    }

    /// Finalizes the connection configuration
    pub fn build(self) -> KmsConnectionConfig {
        KmsConnectionConfig {
            kms_instance_id: self.kms_instance_id,
            kms_instance_url: self.kms_instance_url,
            key_access_token: RwLock::new(self.key_access_token),
            custom_kms_conf: self.custom_kms_conf,
        }
    }
}

/// A client of a Key Management Service
pub trait KmsClient: Send + Sync {
    /// Wraps a key with the identified master key, returning an opaque string
    fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<String>;

    /// Unwraps a previously wrapped key with the identified master key
    fn unwrap_key(&self, wrapped_key: &str, master_key_identifier: &str) -> Result<Vec<u8>>;

    /// Fetches the raw master key, enabling local wrapping. KMS deployments
    /// that never export master keys keep the default implementation.
    fn get_master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        Err(ParquetError::KmsError(format!(
            "KMS does not support exporting master key '{master_key_identifier}'"
        )))
    }
}

/// Reference counted reference to a KMS client
pub type KmsClientRef = Arc<dyn KmsClient>;

/// Creates KMS clients from connection settings
pub trait KmsClientFactory: Send + Sync {
    /// Creates a client for the configured KMS instance
    fn create_client(&self, kms_connection_config: &KmsConnectionConfig) -> Result<KmsClientRef>;
}

impl<T> KmsClientFactory for Arc<T>
where
    T: KmsClientFactory + ?Sized,
{
    fn create_client(&self, kms_connection_config: &KmsConnectionConfig) -> Result<KmsClientRef> {
        self.as_ref().create_client(kms_connection_config)
    }
}

/// The envelope in which locally wrapped keys are serialized
#[derive(Serialize, Deserialize)]
struct LocalKeyWrap {
    #[serde(rename = "masterKeyVersion")]
    master_key_version: String,
    #[serde(rename = "encryptedKey")]
    encrypted_key: String,
}

impl LocalKeyWrap {
    fn create_serialized(encrypted_key: String) -> Result<String> {
        serde_json::to_string(&LocalKeyWrap {
            master_key_version: LOCAL_WRAP_NO_KEY_VERSION.to_owned(),
            encrypted_key,
        })
        .map_err(|e| ParquetError::KmsError(format!("error serializing local key wrap: {e}")))
    }

    fn parse(wrapped_key: &str) -> Result<Self> {
        serde_json::from_str(wrapped_key)
            .map_err(|e| ParquetError::KmsError(format!("failed to parse local key wrap: {e}")))
    }
}

/// Performs key wrapping in-process with master keys fetched from the
/// underlying KMS client.
///
/// Master keys are fetched once per identifier and cached for the lifetime of
/// the client; the client itself is cached per access token by the key
/// toolkit, which bounds how long a fetched master key stays in memory.
pub struct LocalWrapKmsClient {
    kms_client: KmsClientRef,
    master_key_cache: Mutex<HashMap<String, Vec<u8>>>,
}

impl LocalWrapKmsClient {
    /// Wraps an existing client, moving wrap/unwrap operations in-process
    pub fn new(kms_client: KmsClientRef) -> Self {
        Self {
            kms_client,
            master_key_cache: Mutex::new(HashMap::default()),
        }
    }

    fn master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        let mut cache = self.master_key_cache.lock().unwrap();
        match cache.get(master_key_identifier) {
            Some(key) => Ok(key.clone()),
            None => {
                let key = self.kms_client.get_master_key(master_key_identifier)?;
                cache.insert(master_key_identifier.to_owned(), key.clone());
                Ok(key)
            }
        }
    }
}

impl KmsClient for LocalWrapKmsClient {
    fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<String> {
        let master_key = self.master_key(master_key_identifier)?;
        let encrypted = key_toolkit::encrypt_key_locally(
            key_bytes,
            &master_key,
            master_key_identifier.as_bytes(),
        )?;
        LocalKeyWrap::create_serialized(encrypted)
    }

    fn unwrap_key(&self, wrapped_key: &str, master_key_identifier: &str) -> Result<Vec<u8>> {
        let key_wrap = LocalKeyWrap::parse(wrapped_key)?;
        if key_wrap.master_key_version != LOCAL_WRAP_NO_KEY_VERSION {
            return Err(ParquetError::KmsError(format!(
                "master key versions are not supported for local wrapping: {}",
                key_wrap.master_key_version
            )));
        }
        let master_key = self.master_key(master_key_identifier)?;
        key_toolkit::decrypt_key_locally(
            &key_wrap.encrypted_key,
            &master_key,
            master_key_identifier.as_bytes(),
        )
    }

    fn get_master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        self.master_key(master_key_identifier)
    }
}

/// Deterministic in-memory KMS for tests and examples.
///
/// Master keys are supplied explicitly at construction; wrapping is AES-GCM
/// with the master key identifier as AAD. Key rotation can be simulated with
/// [`start_key_rotation`](Self::start_key_rotation) /
/// [`finish_key_rotation`](Self::finish_key_rotation), and access denial for
/// individual keys with [`deny_key`](Self::deny_key).
pub struct InMemoryKms {
    master_keys: Mutex<MasterKeyState>,
    denied_keys: Mutex<HashSet<String>>,
}

struct MasterKeyState {
    current: HashMap<String, Vec<u8>>,
    next: HashMap<String, Vec<u8>>,
}

impl InMemoryKms {
    /// Creates an in-memory KMS holding the given master keys
    pub fn new(master_keys: HashMap<String, Vec<u8>>) -> Self {
        Self {
            master_keys: Mutex::new(MasterKeyState {
                next: master_keys.clone(),
                current: master_keys,
            }),
            denied_keys: Mutex::new(HashSet::default()),
        }
    }

    /// Returns a client factory producing clients over the given master keys
    pub fn factory(master_keys: HashMap<String, Vec<u8>>) -> InMemoryKmsFactory {
        InMemoryKmsFactory { master_keys }
    }

    /// Installs new master key versions to be used for subsequent wrapping
    pub fn start_key_rotation(&self, new_master_keys: HashMap<String, Vec<u8>>) {
        self.master_keys.lock().unwrap().next = new_master_keys;
    }

    /// Retires the previous master key versions
    pub fn finish_key_rotation(&self) {
        let mut state = self.master_keys.lock().unwrap();
        state.current = state.next.clone();
    }

    /// Denies any further access to the identified master key
    pub fn deny_key(&self, master_key_identifier: &str) {
        self.denied_keys
            .lock()
            .unwrap()
            .insert(master_key_identifier.to_owned());
    }

    fn check_access(&self, master_key_identifier: &str) -> Result<()> {
        if self.denied_keys.lock().unwrap().contains(master_key_identifier) {
            return Err(ParquetError::KeyAccessDenied(
                master_key_identifier.to_owned(),
            ));
        }
        Ok(())
    }

    // Wrapping always uses the latest key version
    fn latest_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        self.master_keys
            .lock()
            .unwrap()
            .next
            .get(master_key_identifier)
            .cloned()
            .ok_or_else(|| ParquetError::KeyNotFound(master_key_identifier.to_owned()))
    }

    // Unwrapping uses the active version, which trails during rotation
    fn active_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        self.master_keys
            .lock()
            .unwrap()
            .current
            .get(master_key_identifier)
            .cloned()
            .ok_or_else(|| ParquetError::KeyNotFound(master_key_identifier.to_owned()))
    }
}

/// [`KmsClientFactory`] producing [`InMemoryKms`] clients
pub struct InMemoryKmsFactory {
    master_keys: HashMap<String, Vec<u8>>,
}

impl KmsClientFactory for InMemoryKmsFactory {
    fn create_client(&self, _kms_connection_config: &KmsConnectionConfig) -> Result<KmsClientRef> {
        Ok(Arc::new(InMemoryKms::new(self.master_keys.clone())))
    }
}

impl KmsClient for InMemoryKms {
    fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<String> {
        self.check_access(master_key_identifier)?;
        let master_key = self.latest_key(master_key_identifier)?;
        key_toolkit::encrypt_key_locally(key_bytes, &master_key, master_key_identifier.as_bytes())
    }

    fn unwrap_key(&self, wrapped_key: &str, master_key_identifier: &str) -> Result<Vec<u8>> {
        self.check_access(master_key_identifier)?;
        let master_key = self.active_key(master_key_identifier)?;
        key_toolkit::decrypt_key_locally(wrapped_key, &master_key, master_key_identifier.as_bytes())
    }

    fn get_master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        self.check_access(master_key_identifier)?;
        self.latest_key(master_key_identifier)
    }
}
