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

//! Reader-side envelope unwrapping: recovers data encryption keys from the
//! key-metadata blobs stored in a file, via the KMS.

use std::sync::{Arc, RwLock};

use crate::encryption::decrypt::KeyRetriever;
use crate::encryption::key_management::crypto_factory::DecryptionConfiguration;
use crate::encryption::key_management::key_encryption;
use crate::encryption::key_management::key_material::{KeyMaterial, KeyMetadata};
use crate::encryption::key_management::key_material_store::FileKeyMaterialStore;
use crate::encryption::key_management::key_toolkit::KeyToolkit;
use crate::encryption::key_management::kms::KmsConnectionConfig;
use crate::encryption::key_management::two_level_cache::InnerCache;
use crate::errors::{ParquetError, Result};

/// Unwraps key encryption keys and data encryption keys using a KMS
pub(crate) struct FileKeyUnwrapper {
    key_toolkit: Arc<KeyToolkit>,
    kms_connection_config: RwLock<Arc<KmsConnectionConfig>>,
    decryption_configuration: DecryptionConfiguration,
    key_material_store: Option<Arc<dyn FileKeyMaterialStore>>,
    // Unwrapped KEKs per base64 KEK id, shared per access token
    kek_cache: InnerCache<Vec<u8>>,
}

impl FileKeyUnwrapper {
    pub(crate) fn new(
        key_toolkit: Arc<KeyToolkit>,
        kms_connection_config: Arc<KmsConnectionConfig>,
        decryption_configuration: DecryptionConfiguration,
        key_material_store: Option<Arc<dyn FileKeyMaterialStore>>,
    ) -> Self {
        let kek_cache = key_toolkit.kek_read_cache(
            &kms_connection_config,
            decryption_configuration.cache_lifetime(),
        );
        Self {
            key_toolkit,
            kms_connection_config: RwLock::new(kms_connection_config),
            decryption_configuration,
            key_material_store,
            kek_cache,
        }
    }

    fn unwrap_single_wrapped_key(&self, wrapped_dek: &str, master_key_id: &str) -> Result<Vec<u8>> {
        let kms_connection_config = self.kms_connection_config.read().unwrap();
        let client = self.key_toolkit.get_kms_client(
            &kms_connection_config,
            self.decryption_configuration.wrap_locally(),
            self.decryption_configuration.cache_lifetime(),
        )?;
        client.unwrap_key(wrapped_dek, master_key_id)
    }

    fn unwrap_double_wrapped_key(
        &self,
        wrapped_dek: &str,
        master_key_id: &str,
        encoded_kek_id: &str,
        wrapped_kek: &str,
    ) -> Result<Vec<u8>> {
        let mut kek_cache = self.kek_cache.lock().unwrap();
        let kek_bytes = match kek_cache.get(encoded_kek_id) {
            Some(kek_bytes) => kek_bytes.clone(),
            None => {
                let kms_connection_config = self.kms_connection_config.read().unwrap();
                let client = self.key_toolkit.get_kms_client(
                    &kms_connection_config,
                    self.decryption_configuration.wrap_locally(),
                    self.decryption_configuration.cache_lifetime(),
                )?;
                let kek_bytes = client.unwrap_key(wrapped_kek, master_key_id)?;
                kek_cache.insert(encoded_kek_id.to_owned(), kek_bytes.clone());
                kek_bytes
            }
        };
        drop(kek_cache);
        key_encryption::decrypt_encryption_key(wrapped_dek, encoded_kek_id, &kek_bytes)
    }

    /// Adopts the KMS instance id and URL recorded in footer key material
    /// when the connection configuration does not name an instance itself.
    fn update_kms_config_from_footer_material(
        &self,
        kms_instance_id: &str,
        kms_instance_url: &str,
    ) -> Result<()> {
        let mut kms_connection_config = self.kms_connection_config.write().unwrap();

        let has_instance_id = kms_connection_config.kms_instance_id() != super::kms::DEFAULT_KMS_VALUE
            && !kms_connection_config.kms_instance_id().is_empty();
        let has_instance_url =
            kms_connection_config.kms_instance_url() != super::kms::DEFAULT_KMS_VALUE
                && !kms_connection_config.kms_instance_url().is_empty();
        if has_instance_id && has_instance_url {
            return Ok(());
        }

        let mut_config = Arc::make_mut(&mut kms_connection_config);
        if !has_instance_id && !kms_instance_id.is_empty() {
            mut_config.set_kms_instance_id(kms_instance_id.to_owned());
        }
        if !has_instance_url && !kms_instance_url.is_empty() {
            mut_config.set_kms_instance_url(kms_instance_url.to_owned());
        }
        Ok(())
    }

    fn key_material_from_metadata(&self, key_metadata: &[u8]) -> Result<KeyMaterial> {
        match KeyMetadata::parse(key_metadata)? {
            KeyMetadata::Internal(key_material) => Ok(key_material),
            KeyMetadata::External { key_reference } => match &self.key_material_store {
                Some(store) => {
                    let key_material = store.get_key_material(&key_reference)?;
                    KeyMaterial::deserialize(&key_material)
                }
                None => Err(ParquetError::MalformedKeyMaterial(format!(
                    "file uses external key material ('{key_reference}') but no key material store is configured"
                ))),
            },
        }
    }
}

impl KeyRetriever for FileKeyUnwrapper {
    fn retrieve_key(&self, key_metadata: &[u8]) -> Result<Vec<u8>> {
        let key_material = self.key_material_from_metadata(key_metadata)?;

        // Footer key material may carry the KMS instance to talk to
        if let (Some(instance_id), Some(instance_url)) = (
            &key_material.kms_instance_id,
            &key_material.kms_instance_url,
        ) {
            self.update_kms_config_from_footer_material(instance_id, instance_url)?;
        }

        if key_material.double_wrapping {
            // Presence of both fields is guaranteed by KeyMaterial parsing
            let kek_id = key_material.key_encryption_key_id.as_deref().unwrap_or_default();
            let wrapped_kek = key_material.wrapped_kek.as_deref().unwrap_or_default();
            self.unwrap_double_wrapped_key(
                &key_material.wrapped_dek,
                &key_material.master_key_id,
                kek_id,
                wrapped_kek,
            )
        } else {
            self.unwrap_single_wrapped_key(&key_material.wrapped_dek, &key_material.master_key_id)
        }
    }
}
