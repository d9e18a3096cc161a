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

//! The key-management tools API for building file encryption and decryption
//! properties that work with a Key Management Server.

use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::basic::ParquetCipher;
use crate::encryption::decrypt::FileDecryptionProperties;
use crate::encryption::encrypt::FileEncryptionProperties;
use crate::encryption::key_management::key_material_store::FileKeyMaterialStore;
use crate::encryption::key_management::key_toolkit::KeyToolkit;
use crate::encryption::key_management::key_unwrapper::FileKeyUnwrapper;
use crate::encryption::key_management::key_wrapper::FileKeyWrapper;
use crate::encryption::key_management::kms::{KmsClientFactory, KmsConnectionConfig};
use crate::errors::{ParquetError, Result};

const ACCEPTABLE_DATA_KEY_LENGTHS: [u32; 3] = [128, 192, 256];
const DEFAULT_CACHE_LIFETIME: Duration = Duration::from_secs(600);

/// Configuration for encrypting a Parquet file with KMS-managed keys
#[derive(Debug)]
pub struct EncryptionConfiguration {
    footer_key: String,
    column_keys: Option<String>,
    uniform_encryption: bool,
    encryption_algorithm: ParquetCipher,
    plaintext_footer: bool,
    double_wrapping: bool,
    wrap_locally: bool,
    cache_lifetime: Option<Duration>,
    internal_key_material: bool,
    data_key_length_bits: u32,
}

impl EncryptionConfiguration {
    /// Create a new builder for an [`EncryptionConfiguration`], using the
    /// given master key identifier for footer encryption or signing
    pub fn builder(footer_key: String) -> EncryptionConfigurationBuilder {
        EncryptionConfigurationBuilder::new(footer_key)
    }

    /// Master key identifier for footer key encryption or signing
    pub fn footer_key(&self) -> &str {
        &self.footer_key
    }

    /// The column key configuration string, mapping master key identifiers to
    /// the columns they encrypt: `keyId1:colA,colB;keyId2:colC`
    pub fn column_keys(&self) -> Option<&str> {
        self.column_keys.as_deref()
    }

    /// Whether all columns are encrypted with the footer key
    pub fn uniform_encryption(&self) -> bool {
        self.uniform_encryption
    }

    /// The encryption algorithm to use
    pub fn encryption_algorithm(&self) -> ParquetCipher {
        self.encryption_algorithm
    }

    /// Whether to write the footer in plaintext (signed with the footer key)
    pub fn plaintext_footer(&self) -> bool {
        self.plaintext_footer
    }

    /// Whether to use double wrapping, where data encryption keys (DEKs) are
    /// wrapped with key encryption keys (KEKs), which are in turn wrapped
    /// with the KMS. This reduces interactions with the KMS.
    pub fn double_wrapping(&self) -> bool {
        self.double_wrapping
    }

    /// Whether to wrap keys in-process with master keys fetched from the KMS
    /// rather than sending every wrap operation to the KMS
    pub fn wrap_locally(&self) -> bool {
        self.wrap_locally
    }

    /// How long KMS clients and key encryption keys are cached.
    /// When None, cached objects never expire.
    pub fn cache_lifetime(&self) -> Option<Duration> {
        self.cache_lifetime
    }

    /// Whether key material is stored inside the Parquet file metadata rather
    /// than in an external store
    pub fn internal_key_material(&self) -> bool {
        self.internal_key_material
    }

    /// Number of bits for randomly generated data encryption keys
    pub fn data_key_length_bits(&self) -> u32 {
        self.data_key_length_bits
    }
}

/// Builder for a Parquet [`EncryptionConfiguration`]
pub struct EncryptionConfigurationBuilder {
    footer_key: String,
    column_keys: Option<String>,
    uniform_encryption: bool,
    encryption_algorithm: ParquetCipher,
    plaintext_footer: bool,
    double_wrapping: bool,
    wrap_locally: bool,
    cache_lifetime: Option<Duration>,
    internal_key_material: bool,
    data_key_length_bits: u32,
}

impl EncryptionConfigurationBuilder {
    /// Creates a new [`EncryptionConfigurationBuilder`] with default options
    pub fn new(footer_key: String) -> Self {
        Self {
            footer_key,
            column_keys: None,
            uniform_encryption: false,
            encryption_algorithm: ParquetCipher::AesGcmV1,
            plaintext_footer: false,
            double_wrapping: true,
            wrap_locally: false,
            cache_lifetime: Some(DEFAULT_CACHE_LIFETIME),
            internal_key_material: true,
            data_key_length_bits: 128,
        }
    }

    /// Finalizes the encryption configuration.
    ///
    /// Exactly one of [`set_column_keys`](Self::set_column_keys) and
    /// [`set_uniform_encryption`](Self::set_uniform_encryption) must have
    /// been called.
    pub fn build(self) -> Result<EncryptionConfiguration> {
        match (&self.column_keys, self.uniform_encryption) {
            (Some(_), true) => {
                return Err(ParquetError::ConfigConflict(
                    "cannot set both column_keys and uniform_encryption".to_string(),
                ))
            }
            (None, false) => {
                return Err(ParquetError::ConfigMissing(
                    "either column_keys or uniform_encryption must be set".to_string(),
                ))
            }
            _ => {}
        }
        Ok(EncryptionConfiguration {
            footer_key: self.footer_key,
            column_keys: self.column_keys,
            uniform_encryption: self.uniform_encryption,
            encryption_algorithm: self.encryption_algorithm,
            plaintext_footer: self.plaintext_footer,
            double_wrapping: self.double_wrapping,
            wrap_locally: self.wrap_locally,
            cache_lifetime: self.cache_lifetime,
            internal_key_material: self.internal_key_material,
            data_key_length_bits: self.data_key_length_bits,
        })
    }

    /// Specify the column key configuration string:
    /// `keyId1:colA,colB;keyId2:colC`. Columns not named stay in plaintext.
    pub fn set_column_keys(mut self, column_keys: String) -> Self {
        self.column_keys = Some(column_keys);
        self
    }

    /// Encrypt all columns with the footer key
    pub fn set_uniform_encryption(mut self) -> Self {
        self.uniform_encryption = true;
        self
    }

    /// Set the encryption algorithm to use
    pub fn set_encryption_algorithm(mut self, algorithm: ParquetCipher) -> Self {
        self.encryption_algorithm = algorithm;
        self
    }

    /// Set whether to write the footer in plaintext. Defaults to false.
    pub fn set_plaintext_footer(mut self, plaintext_footer: bool) -> Self {
        self.plaintext_footer = plaintext_footer;
        self
    }

    /// Set whether to use double wrapping. Defaults to true.
    pub fn set_double_wrapping(mut self, double_wrapping: bool) -> Self {
        self.double_wrapping = double_wrapping;
        self
    }

    /// Set whether to wrap keys in-process with fetched master keys.
    /// Defaults to false.
    pub fn set_wrap_locally(mut self, wrap_locally: bool) -> Self {
        self.wrap_locally = wrap_locally;
        self
    }

    /// Set how long to cache objects for, including KMS clients and key
    /// encryption keys. When None, cached objects never expire.
    /// Defaults to 10 minutes.
    pub fn set_cache_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.cache_lifetime = lifetime;
        self
    }

    /// Set whether to store key material inside the Parquet file metadata.
    /// Defaults to true; external material requires a key material store.
    pub fn set_internal_key_material(mut self, internal_key_material: bool) -> Self {
        self.internal_key_material = internal_key_material;
        self
    }

    /// Set the length of randomly generated data encryption keys in bits.
    /// Must be one of 128, 192 or 256. Defaults to 128.
    pub fn set_data_key_length_bits(mut self, data_key_length_bits: u32) -> Self {
        self.data_key_length_bits = data_key_length_bits;
        self
    }
}

/// Configuration for decrypting a Parquet file with KMS-managed keys
#[derive(Debug)]
pub struct DecryptionConfiguration {
    cache_lifetime: Option<Duration>,
    wrap_locally: bool,
}

impl DecryptionConfiguration {
    /// Create a new builder for a [`DecryptionConfiguration`]
    pub fn builder() -> DecryptionConfigurationBuilder {
        DecryptionConfigurationBuilder::default()
    }

    /// How long KMS clients and key encryption keys are cached.
    /// When None, cached objects never expire.
    pub fn cache_lifetime(&self) -> Option<Duration> {
        self.cache_lifetime
    }

    /// Whether keys were wrapped in-process and must be unwrapped with
    /// fetched master keys
    pub fn wrap_locally(&self) -> bool {
        self.wrap_locally
    }
}

impl Default for DecryptionConfiguration {
    fn default() -> Self {
        DecryptionConfigurationBuilder::default().build()
    }
}

/// Builder for a Parquet [`DecryptionConfiguration`]
pub struct DecryptionConfigurationBuilder {
    cache_lifetime: Option<Duration>,
    wrap_locally: bool,
}

impl DecryptionConfigurationBuilder {
    /// Creates a new [`DecryptionConfigurationBuilder`] with default options
    pub fn new() -> Self {
        Self {
            cache_lifetime: Some(DEFAULT_CACHE_LIFETIME),
            wrap_locally: false,
        }
    }

    /// Finalizes the decryption configuration
    pub fn build(self) -> DecryptionConfiguration {
        DecryptionConfiguration {
            cache_lifetime: self.cache_lifetime,
            wrap_locally: self.wrap_locally,
        }
    }

    /// Set how long to cache objects for. Defaults to 10 minutes.
    pub fn set_cache_lifetime(mut self, cache_lifetime: Option<Duration>) -> Self {
        self.cache_lifetime = cache_lifetime;
        self
    }

    /// Set whether keys are unwrapped in-process with fetched master keys.
    /// Defaults to false.
    pub fn set_wrap_locally(mut self, wrap_locally: bool) -> Self {
        self.wrap_locally = wrap_locally;
        self
    }
}

impl Default for DecryptionConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One parsed entry of the column keys property: a master key id and the
/// columns it encrypts
type ColumnKeyMapping = Vec<(String, Vec<String>)>;

/// Parses the `keyId1:colA,colB;keyId2:colC` column keys property.
/// Whitespace around identifiers is trimmed and empty `;` segments skipped.
fn parse_column_keys(column_keys: &str) -> Result<ColumnKeyMapping> {
    let mut mapping: ColumnKeyMapping = Vec::new();
    let mut seen_columns: HashSet<String> = HashSet::new();

    for key_to_columns in column_keys.split(';') {
        let key_to_columns = key_to_columns.trim();
        if key_to_columns.is_empty() {
            continue;
        }

        let parts: Vec<&str> = key_to_columns.split(':').collect();
        if parts.len() != 2 {
            return Err(ParquetError::MalformedColumnKeys(format!(
                "incorrect key to columns mapping: [{key_to_columns}]"
            )));
        }

        let column_key_id = parts[0].trim();
        if column_key_id.is_empty() {
            return Err(ParquetError::MalformedColumnKeys(
                "empty key name".to_string(),
            ));
        }

        let mut column_names: Vec<String> = Vec::new();
        for column_name in parts[1].split(',') {
            let column_name = column_name.trim();
            if column_name.is_empty() {
                return Err(ParquetError::MalformedColumnKeys(format!(
                    "empty column name for key '{column_key_id}'"
                )));
            }
            if !seen_columns.insert(column_name.to_owned()) {
                return Err(ParquetError::DuplicateColumnKey(column_name.to_owned()));
            }
            column_names.push(column_name.to_owned());
        }

        mapping.push((column_key_id.to_owned(), column_names));
    }

    if mapping.is_empty() {
        return Err(ParquetError::MalformedColumnKeys(
            "no column keys configured".to_string(),
        ));
    }
    Ok(mapping)
}

/// A factory that produces file decryption and encryption properties from
/// declarative configurations and a KMS client
pub struct CryptoFactory {
    key_toolkit: Arc<KeyToolkit>,
}

impl CryptoFactory {
    /// Create a new [`CryptoFactory`], providing a factory for creating KMS
    /// clients
    pub fn new<T>(kms_client_factory: T) -> Self
    where
        T: KmsClientFactory + 'static,
    {
        CryptoFactory {
            key_toolkit: Arc::new(KeyToolkit::new(Box::new(kms_client_factory))),
        }
    }

    /// Create file decryption properties for Parquet files with internally
    /// stored key material
    pub fn file_decryption_properties(
        &self,
        kms_connection_config: Arc<KmsConnectionConfig>,
        decryption_configuration: DecryptionConfiguration,
    ) -> Result<Arc<FileDecryptionProperties>> {
        self.file_decryption_properties_with_key_material_store(
            kms_connection_config,
            decryption_configuration,
            None,
        )
    }

    /// Create file decryption properties, resolving externally stored key
    /// material through the given store
    pub fn file_decryption_properties_with_key_material_store(
        &self,
        kms_connection_config: Arc<KmsConnectionConfig>,
        decryption_configuration: DecryptionConfiguration,
        key_material_store: Option<Arc<dyn FileKeyMaterialStore>>,
    ) -> Result<Arc<FileDecryptionProperties>> {
        let key_retriever = Arc::new(FileKeyUnwrapper::new(
            self.key_toolkit.clone(),
            kms_connection_config,
            decryption_configuration,
            key_material_store,
        ));
        FileDecryptionProperties::with_key_retriever(key_retriever).build()
    }

    /// Create file encryption properties for a Parquet file
    pub fn file_encryption_properties(
        &self,
        kms_connection_config: Arc<KmsConnectionConfig>,
        encryption_configuration: &EncryptionConfiguration,
    ) -> Result<FileEncryptionProperties> {
        self.file_encryption_properties_with_key_material_store(
            kms_connection_config,
            encryption_configuration,
            None,
        )
    }

    /// Create file encryption properties, persisting key material into the
    /// given external store when `internal_key_material` is disabled
    pub fn file_encryption_properties_with_key_material_store(
        &self,
        kms_connection_config: Arc<KmsConnectionConfig>,
        encryption_configuration: &EncryptionConfiguration,
        key_material_store: Option<Arc<dyn FileKeyMaterialStore>>,
    ) -> Result<FileEncryptionProperties> {
        let dek_length_bits = encryption_configuration.data_key_length_bits();
        if !ACCEPTABLE_DATA_KEY_LENGTHS.contains(&dek_length_bits) {
            return Err(ParquetError::InvalidKeyLength(dek_length_bits as usize));
        }
        let dek_length = (dek_length_bits / 8) as usize;

        if !encryption_configuration.internal_key_material() && key_material_store.is_none() {
            return Err(ParquetError::ConfigMissing(
                "external key material requires a key material store".to_string(),
            ));
        }
        let key_material_store = if encryption_configuration.internal_key_material() {
            None
        } else {
            key_material_store
        };
        let save_material = key_material_store.is_some();

        let mut key_wrapper = FileKeyWrapper::new(
            self.key_toolkit.clone(),
            kms_connection_config,
            encryption_configuration,
            key_material_store.clone(),
        );

        let footer_key = generate_data_key(dek_length);
        let footer_key_metadata = key_wrapper.get_encryption_key_metadata(
            &footer_key,
            encryption_configuration.footer_key(),
            true,
        )?;

        let mut builder = FileEncryptionProperties::builder(footer_key)
            .with_footer_key_metadata(footer_key_metadata)
            .with_algorithm(encryption_configuration.encryption_algorithm())
            .with_plaintext_footer(encryption_configuration.plaintext_footer());

        if let Some(column_keys) = encryption_configuration.column_keys() {
            for (master_key_id, column_paths) in parse_column_keys(column_keys)? {
                for column_path in column_paths {
                    let column_key = generate_data_key(dek_length);
                    let column_key_metadata =
                        key_wrapper.get_encryption_key_metadata(&column_key, &master_key_id, false)?;
                    builder = builder.with_column_key_and_metadata(
                        &column_path,
                        column_key,
                        column_key_metadata,
                    );
                }
            }
        }

        if save_material {
            if let Some(store) = &key_material_store {
                store.save_material()?;
            }
        }

        builder.build()
    }

    /// Drops cached KMS clients and key encryption keys for one access token
    pub fn remove_cache_entries_for_token(&self, access_token: &str) {
        self.key_toolkit.remove_cache_entries_for_token(access_token);
    }

    /// Drops cached KMS clients and key encryption keys for all access tokens
    pub fn remove_cache_entries_for_all_tokens(&self) {
        self.key_toolkit.clear_caches();
    }
}

fn generate_data_key(dek_length: usize) -> Vec<u8> {
    let mut key = vec![0u8; dek_length];
    OsRng.fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::key_management::key_material::KeyMaterialBuilder;
    use crate::encryption::key_management::kms::KmsClient;
    use crate::encryption::key_management::test_kms::TestKmsClientFactory;
    use crate::encryption::key_management::two_level_cache::mock_time;

    #[test]
    fn test_file_decryption_properties() {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let config = Default::default();

        let crypto_factory = CryptoFactory::new(TestKmsClientFactory::with_default_keys());
        let decryption_props = crypto_factory
            .file_decryption_properties(kms_config, config)
            .unwrap();

        let expected_dek = b"1234567890123450".to_vec();
        let kms = TestKmsClientFactory::with_default_keys()
            .create_client(&Default::default())
            .unwrap();

        let wrapped_key = kms.wrap_key(&expected_dek, "kc1").unwrap();
        let key_material = KeyMaterialBuilder::for_column_key()
            .with_single_wrapped_key("kc1".to_owned(), wrapped_key)
            .build()
            .unwrap();
        let serialized_key_material = key_material.serialize().unwrap();

        let dek = decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();

        assert_eq!(dek, expected_dek);
    }

    #[test]
    fn test_kms_client_caching_with_lifetime() {
        test_kms_client_caching(Some(Duration::from_secs(6000)));
    }

    #[test]
    fn test_kms_client_caching_no_lifetime() {
        test_kms_client_caching(None);
    }

    fn test_kms_client_caching(cache_lifetime: Option<Duration>) {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let config = DecryptionConfiguration::builder()
            .set_cache_lifetime(cache_lifetime)
            .build();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());
        let decryption_props = crypto_factory
            .file_decryption_properties(kms_config.clone(), config)
            .unwrap();

        let dek = b"1234567890123450".to_vec();
        let kms = TestKmsClientFactory::with_default_keys()
            .create_client(&Default::default())
            .unwrap();

        let wrapped_key = kms.wrap_key(&dek, "kc1").unwrap();
        let key_material = KeyMaterialBuilder::for_column_key()
            .with_single_wrapped_key("kc1".to_owned(), wrapped_key)
            .build()
            .unwrap();
        let serialized_key_material = key_material.serialize().unwrap();

        assert_eq!(0, kms_factory.invocations().len());

        decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();
        assert_eq!(vec!["DEFAULT"], kms_factory.invocations());

        decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();
        // Same client should have been reused
        assert_eq!(vec!["DEFAULT"], kms_factory.invocations());

        kms_config.refresh_key_access_token("super_secret".to_owned());

        decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();
        // New key access token should have been used
        assert_eq!(vec!["DEFAULT", "super_secret"], kms_factory.invocations());

        decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();
        assert_eq!(vec!["DEFAULT", "super_secret"], kms_factory.invocations());
    }

    #[test]
    fn test_kms_client_expiration() {
        let time_controller = mock_time::time_controller();

        let kms_config = Arc::new(KmsConnectionConfig::default());
        let config = DecryptionConfiguration::builder()
            .set_cache_lifetime(Some(Duration::from_secs(600)))
            .build();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());
        let decryption_props = crypto_factory
            .file_decryption_properties(kms_config.clone(), config)
            .unwrap();

        let dek = b"1234567890123450".to_vec();
        let kms = TestKmsClientFactory::with_default_keys()
            .create_client(&Default::default())
            .unwrap();

        let wrapped_key = kms.wrap_key(&dek, "kc1").unwrap();
        let key_material = KeyMaterialBuilder::for_column_key()
            .with_single_wrapped_key("kc1".to_owned(), wrapped_key)
            .build()
            .unwrap();
        let serialized_key_material = key_material.serialize().unwrap();

        assert_eq!(0, kms_factory.invocations().len());

        let do_key_retrieval = || {
            decryption_props
                .footer_key(Some(serialized_key_material.as_bytes()))
                .unwrap()
                .into_owned();
        };

        do_key_retrieval();
        assert_eq!(1, kms_factory.invocations().len());

        time_controller.advance(Duration::from_secs(599));

        do_key_retrieval();
        assert_eq!(1, kms_factory.invocations().len());

        time_controller.advance(Duration::from_secs(1));

        do_key_retrieval();
        assert_eq!(2, kms_factory.invocations().len());
    }

    #[test]
    fn test_round_trip_double_wrapping_properties() {
        round_trip_encryption_properties(true);
    }

    #[test]
    fn test_round_trip_single_wrapping_properties() {
        round_trip_encryption_properties(false);
    }

    fn round_trip_encryption_properties(double_wrapping: bool) {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_double_wrapping(double_wrapping)
            .set_column_keys("kc1: x0, x1; kc2: x2, x3".to_owned())
            .build()
            .unwrap();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());

        let file_encryption_properties = crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config)
            .unwrap();

        let decryption_properties = crypto_factory
            .file_decryption_properties(kms_config.clone(), Default::default())
            .unwrap();

        assert!(file_encryption_properties.encrypt_footer());
        assert!(file_encryption_properties.aad_prefix().is_none());
        assert_eq!(16, file_encryption_properties.footer_key().len());

        let retrieved_footer_key = decryption_properties
            .footer_key(
                file_encryption_properties
                    .footer_key_metadata()
                    .map(|k| k.as_slice()),
            )
            .unwrap();
        assert_eq!(
            file_encryption_properties.footer_key(),
            retrieved_footer_key.as_slice()
        );

        let column_keys = file_encryption_properties.column_keys();
        let mut all_columns: Vec<String> = column_keys.keys().cloned().collect();
        all_columns.sort();
        assert_eq!(vec!["x0", "x1", "x2", "x3"], all_columns);
        for (column_name, column_key) in column_keys.iter() {
            assert_eq!(16, column_key.key().len());

            let retrieved_key = decryption_properties
                .column_key(column_name, column_key.key_metadata().map(|k| k.as_slice()))
                .unwrap();
            assert_eq!(column_key.key(), retrieved_key.as_slice());
        }

        assert_eq!(1, kms_factory.invocations().len());
        if double_wrapping {
            // With double wrapping, only one KEK is wrapped per master key id
            assert_eq!(3, kms_factory.keys_wrapped());
            assert_eq!(3, kms_factory.keys_unwrapped());
        } else {
            // With single wrapping, the footer key and one DEK per column are
            // wrapped with the KMS
            assert_eq!(5, kms_factory.keys_wrapped());
            assert_eq!(5, kms_factory.keys_unwrapped());
        }
    }

    #[test]
    fn test_uniform_encryption() {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_uniform_encryption()
            .build()
            .unwrap();

        let crypto_factory = CryptoFactory::new(TestKmsClientFactory::with_default_keys());

        let file_encryption_properties = crypto_factory
            .file_encryption_properties(kms_config, &encryption_config)
            .unwrap();

        assert!(file_encryption_properties.column_keys().is_empty());
    }

    #[test]
    fn test_wrap_locally_round_trip() {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_uniform_encryption()
            .set_wrap_locally(true)
            .build()
            .unwrap();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());

        let file_encryption_properties = crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config)
            .unwrap();

        // All wrapping happened in-process
        assert_eq!(0, kms_factory.keys_wrapped());

        let decryption_config = DecryptionConfiguration::builder()
            .set_wrap_locally(true)
            .build();
        let decryption_properties = crypto_factory
            .file_decryption_properties(kms_config, decryption_config)
            .unwrap();

        let retrieved_footer_key = decryption_properties
            .footer_key(
                file_encryption_properties
                    .footer_key_metadata()
                    .map(|k| k.as_slice()),
            )
            .unwrap();
        assert_eq!(
            file_encryption_properties.footer_key(),
            retrieved_footer_key.as_slice()
        );
        assert_eq!(0, kms_factory.keys_unwrapped());
    }

    #[test]
    fn test_config_requires_column_keys_or_uniform() {
        let err = EncryptionConfigurationBuilder::new("kf".to_owned())
            .build()
            .unwrap_err();
        assert!(matches!(err, ParquetError::ConfigMissing(_)));

        let err = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_uniform_encryption()
            .set_column_keys("kc1:a".to_owned())
            .build()
            .unwrap_err();
        assert!(matches!(err, ParquetError::ConfigConflict(_)));
    }

    #[test]
    fn test_invalid_data_key_length() {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_uniform_encryption()
            .set_data_key_length_bits(512)
            .build()
            .unwrap();

        let crypto_factory = CryptoFactory::new(TestKmsClientFactory::with_default_keys());
        let err = crypto_factory
            .file_encryption_properties(kms_config, &encryption_config)
            .unwrap_err();
        assert!(matches!(err, ParquetError::InvalidKeyLength(512)));
    }

    #[test]
    fn test_parse_column_keys() {
        let mapping = parse_column_keys("kc1: a, b; kc2: c ;").unwrap();
        assert_eq!(
            mapping,
            vec![
                ("kc1".to_owned(), vec!["a".to_owned(), "b".to_owned()]),
                ("kc2".to_owned(), vec!["c".to_owned()]),
            ]
        );
    }

    #[test]
    fn test_parse_column_keys_errors() {
        let err = parse_column_keys("kc1").unwrap_err();
        assert!(matches!(err, ParquetError::MalformedColumnKeys(_)));

        let err = parse_column_keys(": a").unwrap_err();
        assert!(matches!(err, ParquetError::MalformedColumnKeys(_)));

        let err = parse_column_keys("kc1: a,,b").unwrap_err();
        assert!(matches!(err, ParquetError::MalformedColumnKeys(_)));

        let err = parse_column_keys(";;").unwrap_err();
        assert!(matches!(err, ParquetError::MalformedColumnKeys(_)));

        let err = parse_column_keys("kc1: a; kc2: a").unwrap_err();
        assert!(matches!(err, ParquetError::DuplicateColumnKey(column) if column == "a"));
    }

    #[test]
    fn test_key_encryption_key_caching() {
        let time_controller = mock_time::time_controller();

        let kms_config = Arc::new(KmsConnectionConfig::default());
        let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_double_wrapping(true)
            .set_column_keys("kc1:x0,x1;kc2:x2,x3".to_owned())
            .build()
            .unwrap();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());

        let file_encryption_properties = crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config)
            .unwrap();

        let footer_key_metadata = file_encryption_properties.footer_key_metadata().cloned();

        let get_new_decryption_properties = || {
            let decryption_config = DecryptionConfiguration::builder()
                .set_cache_lifetime(Some(Duration::from_secs(600)))
                .build();
            crypto_factory
                .file_decryption_properties(kms_config.clone(), decryption_config)
                .unwrap()
        };

        let retrieve_key = |props: &Arc<FileDecryptionProperties>| {
            props.footer_key(footer_key_metadata.as_deref()).unwrap();
        };

        assert_eq!(0, kms_factory.keys_unwrapped());

        let props = get_new_decryption_properties();
        retrieve_key(&props);
        assert_eq!(1, kms_factory.keys_unwrapped());

        // The unwrapped KEK is cached and shared with new decryption
        // properties under the same access token
        retrieve_key(&props);
        let props2 = get_new_decryption_properties();
        retrieve_key(&props2);
        assert_eq!(1, kms_factory.keys_unwrapped());

        // After the cache lifetime elapses, newly created decryption
        // properties use a fresh KEK cache
        time_controller.advance(Duration::from_secs(600));
        let props3 = get_new_decryption_properties();
        retrieve_key(&props3);
        assert_eq!(2, kms_factory.keys_unwrapped());

        // A different access token gets its own KEK cache
        kms_config.refresh_key_access_token("new_secret".to_owned());
        let props4 = get_new_decryption_properties();
        retrieve_key(&props4);
        assert_eq!(3, kms_factory.keys_unwrapped());
    }

    #[test]
    fn test_cache_invalidation_forces_kms_unwrap() {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_uniform_encryption()
            .set_double_wrapping(true)
            .build()
            .unwrap();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());

        let file_encryption_properties = crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config)
            .unwrap();
        let footer_key_metadata = file_encryption_properties.footer_key_metadata().cloned();

        let props = crypto_factory
            .file_decryption_properties(kms_config.clone(), Default::default())
            .unwrap();
        props.footer_key(footer_key_metadata.as_deref()).unwrap();
        assert_eq!(1, kms_factory.keys_unwrapped());

        // Invalidate all caches, simulating out-of-process key rotation; the
        // next unwrap must go back to the KMS
        crypto_factory.remove_cache_entries_for_all_tokens();
        let props = crypto_factory
            .file_decryption_properties(kms_config, Default::default())
            .unwrap();
        let key = props.footer_key(footer_key_metadata.as_deref()).unwrap();
        assert_eq!(key.as_slice(), file_encryption_properties.footer_key());
        assert_eq!(2, kms_factory.keys_unwrapped());
    }
}
