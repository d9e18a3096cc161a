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

//! Writer-side envelope wrapping: turns freshly generated data encryption
//! keys into the key-metadata blobs stored in a file.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

use crate::encryption::key_management::crypto_factory::EncryptionConfiguration;
use crate::encryption::key_management::key_encryption::encrypt_encryption_key;
use crate::encryption::key_management::key_material::{KeyMaterialBuilder, KeyMetadata};
use crate::encryption::key_management::key_material_store::{
    FileKeyMaterialStore, COLUMN_KEY_ID_IN_FILE_PREFIX, FOOTER_KEY_ID_IN_FILE,
};
use crate::encryption::key_management::key_toolkit::KeyToolkit;
use crate::encryption::key_management::kms::KmsConnectionConfig;
use crate::encryption::key_management::two_level_cache::InnerCache;
use crate::errors::Result;

const KEK_LENGTH: usize = 16;
const KEK_ID_LENGTH: usize = 16;

/// A generated key encryption key together with its wrapped form
#[derive(Clone)]
pub(crate) struct KeyEncryptionKey {
    pub(crate) kek_bytes: Vec<u8>,
    pub(crate) kek_id: Vec<u8>,
    pub(crate) encoded_kek_id: String,
    pub(crate) encoded_wrapped_kek: String,
}

/// Creates key material for data encryption keys of one file being written
pub(crate) struct FileKeyWrapper<'a> {
    key_toolkit: Arc<KeyToolkit>,
    kms_connection_config: Arc<KmsConnectionConfig>,
    encryption_configuration: &'a EncryptionConfiguration,
    key_material_store: Option<Arc<dyn FileKeyMaterialStore>>,
    // One KEK per master key id, shared by all files written under the same
    // access token while the cache entry lives
    kek_per_master_key_id: InnerCache<KeyEncryptionKey>,
    key_counter: u32,
}

impl<'a> FileKeyWrapper<'a> {
    pub(crate) fn new(
        key_toolkit: Arc<KeyToolkit>,
        kms_connection_config: Arc<KmsConnectionConfig>,
        encryption_configuration: &'a EncryptionConfiguration,
        key_material_store: Option<Arc<dyn FileKeyMaterialStore>>,
    ) -> Self {
        let kek_per_master_key_id = key_toolkit.kek_write_cache(
            &kms_connection_config,
            encryption_configuration.cache_lifetime(),
        );
        debug!(
            "creating file key wrapper for KMS instance '{}', double wrapping: {}",
            kms_connection_config.kms_instance_id(),
            encryption_configuration.double_wrapping()
        );
        Self {
            key_toolkit,
            kms_connection_config,
            encryption_configuration,
            key_material_store,
            kek_per_master_key_id,
            key_counter: 0,
        }
    }

    /// Wraps a data key with the identified master key and returns the
    /// key-metadata bytes to store in the file
    pub(crate) fn get_encryption_key_metadata(
        &mut self,
        data_key: &[u8],
        master_key_id: &str,
        is_footer_key: bool,
    ) -> Result<Vec<u8>> {
        let key_material_builder = if is_footer_key {
            KeyMaterialBuilder::for_footer_key(
                self.kms_connection_config.kms_instance_id().to_owned(),
                self.kms_connection_config.kms_instance_url().to_owned(),
            )
        } else {
            KeyMaterialBuilder::for_column_key()
        };

        let key_material = if self.encryption_configuration.double_wrapping() {
            let mut kek_cache = self.kek_per_master_key_id.lock().unwrap();
            let kek = match kek_cache.get(master_key_id) {
                Some(kek) => kek.clone(),
                None => {
                    let kek = self.create_key_encryption_key(master_key_id)?;
                    kek_cache.insert(master_key_id.to_owned(), kek.clone());
                    kek
                }
            };
            drop(kek_cache);

            let wrapped_dek = encrypt_encryption_key(data_key, &kek.kek_id, &kek.kek_bytes)?;
            key_material_builder
                .with_double_wrapped_key(
                    master_key_id.to_owned(),
                    kek.encoded_kek_id,
                    kek.encoded_wrapped_kek,
                    wrapped_dek,
                )
                .build()?
        } else {
            let kms_client = self.key_toolkit.get_kms_client(
                &self.kms_connection_config,
                self.encryption_configuration.wrap_locally(),
                self.encryption_configuration.cache_lifetime(),
            )?;
            let wrapped_dek = kms_client.wrap_key(data_key, master_key_id)?;
            key_material_builder
                .with_single_wrapped_key(master_key_id.to_owned(), wrapped_dek)
                .build()?
        };

        match &self.key_material_store {
            // Internal storage: the key metadata IS the key material
            None => Ok(key_material.serialize()?.into_bytes()),
            // External storage: the key metadata only references material in
            // the store
            Some(store) => {
                let key_id_in_file = if is_footer_key {
                    FOOTER_KEY_ID_IN_FILE.to_owned()
                } else {
                    let key_id = format!("{COLUMN_KEY_ID_IN_FILE_PREFIX}{}", self.key_counter);
                    self.key_counter += 1;
                    key_id
                };
                let mut key_material = key_material;
                key_material.internal_storage = false;
                store.add_key_material(&key_id_in_file, &key_material.serialize()?)?;
                let serialized_key_metadata =
                    KeyMetadata::create_serialized_for_external_material(&key_id_in_file)?;
                Ok(serialized_key_metadata.into_bytes())
            }
        }
    }

    fn create_key_encryption_key(&self, master_key_id: &str) -> Result<KeyEncryptionKey> {
        let mut kek_bytes = vec![0u8; KEK_LENGTH];
        OsRng.fill_bytes(&mut kek_bytes);

        // KEK ids must be globally unique so that unwrapped KEKs can be
        // cached across files during reading
        let mut kek_id = vec![0u8; KEK_ID_LENGTH];
        OsRng.fill_bytes(&mut kek_id);
        let encoded_kek_id = BASE64_STANDARD.encode(&kek_id);

        let kms_client = self.key_toolkit.get_kms_client(
            &self.kms_connection_config,
            self.encryption_configuration.wrap_locally(),
            self.encryption_configuration.cache_lifetime(),
        )?;
        let encoded_wrapped_kek = kms_client.wrap_key(&kek_bytes, master_key_id)?;

        Ok(KeyEncryptionKey {
            kek_bytes,
            kek_id,
            encoded_kek_id,
            encoded_wrapped_kek,
        })
    }
}
