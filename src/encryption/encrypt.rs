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

//! Configuration and utilities for writing encrypted Parquet files.

use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;

use crate::basic::ParquetCipher;
use crate::encryption::ciphers::{BlockEncryptor, CtrBlockEncryptor, GcmBlockEncryptor};
use crate::errors::{ParquetError, Result};
use crate::file::metadata::{ColumnCryptoMetaData, EncryptionAlgorithm};

const AAD_FILE_UNIQUE_LENGTH: usize = 8;

fn check_key_length(key: &[u8]) -> Result<()> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        n => Err(ParquetError::InvalidKeyLength(n * 8)),
    }
}

/// An encryption key together with the key metadata to store in the file
#[derive(Clone, Debug, PartialEq)]
pub struct EncryptionKey {
    key: Vec<u8>,
    key_metadata: Option<Vec<u8>>,
}

impl EncryptionKey {
    /// Creates a key with no metadata
    pub fn new(key: Vec<u8>) -> EncryptionKey {
        Self {
            key,
            key_metadata: None,
        }
    }

    /// The raw key bytes
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The key metadata stored alongside encrypted modules, if any
    pub fn key_metadata(&self) -> Option<&Vec<u8>> {
        self.key_metadata.as_ref()
    }

    fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.key_metadata = Some(metadata);
        self
    }
}

/// `FileEncryptionProperties` hold the keys and AAD data required to encrypt
/// a Parquet file.
///
/// When no column keys are configured, uniform encryption is used and every
/// column is encrypted with the footer key. Otherwise only the configured
/// columns are encrypted, each with its own key, and the remaining columns
/// are left in plaintext.
#[derive(Clone, Debug, PartialEq)]
pub struct FileEncryptionProperties {
    encrypt_footer: bool,
    cipher: ParquetCipher,
    footer_key: EncryptionKey,
    column_keys: HashMap<String, EncryptionKey>,
    aad_prefix: Option<Vec<u8>>,
    aad_file_unique: Vec<u8>,
    file_aad: Vec<u8>,
    store_aad_prefix: bool,
}

impl FileEncryptionProperties {
    /// Returns a new [`FileEncryptionProperties`] builder encrypting with the
    /// given footer key
    pub fn builder(footer_key: Vec<u8>) -> EncryptionPropertiesBuilder {
        EncryptionPropertiesBuilder::new(footer_key)
    }

    /// Whether the footer itself is encrypted (`PARE` files). If false, the
    /// footer is written in plaintext and signed.
    pub fn encrypt_footer(&self) -> bool {
        self.encrypt_footer
    }

    /// The cipher used for the file's modules
    pub fn cipher(&self) -> ParquetCipher {
        self.cipher
    }

    /// AAD prefix and file-unique suffix concatenated
    pub fn file_aad(&self) -> &[u8] {
        &self.file_aad
    }

    /// The footer key bytes
    pub fn footer_key(&self) -> &[u8] {
        self.footer_key.key()
    }

    /// Metadata describing how to obtain the footer key when reading
    pub fn footer_key_metadata(&self) -> Option<&Vec<u8>> {
        self.footer_key.key_metadata()
    }

    /// Keys of columns encrypted with their own key, by dot-joined path
    pub fn column_keys(&self) -> &HashMap<String, EncryptionKey> {
        &self.column_keys
    }

    /// The AAD prefix if one was configured
    pub fn aad_prefix(&self) -> Option<&Vec<u8>> {
        self.aad_prefix.as_ref()
    }

    /// The encryption algorithm description stored in file metadata
    pub fn algorithm_metadata(&self) -> EncryptionAlgorithm {
        let supply_aad_prefix = self.aad_prefix.is_some() && !self.store_aad_prefix;
        EncryptionAlgorithm {
            cipher: self.cipher,
            aad_prefix: if self.store_aad_prefix {
                self.aad_prefix.clone()
            } else {
                None
            },
            aad_file_unique: self.aad_file_unique.clone(),
            supply_aad_prefix,
        }
    }
}

/// Builder for [`FileEncryptionProperties`]
pub struct EncryptionPropertiesBuilder {
    footer_key: EncryptionKey,
    column_keys: HashMap<String, EncryptionKey>,
    aad_prefix: Option<Vec<u8>>,
    cipher: ParquetCipher,
    encrypt_footer: bool,
    store_aad_prefix: bool,
}

impl EncryptionPropertiesBuilder {
    /// Creates a new builder using the provided footer key
    pub fn new(footer_key: Vec<u8>) -> EncryptionPropertiesBuilder {
        Self {
            footer_key: EncryptionKey::new(footer_key),
            column_keys: HashMap::default(),
            aad_prefix: None,
            cipher: ParquetCipher::AesGcmV1,
            encrypt_footer: true,
            store_aad_prefix: true,
        }
    }

    /// Write the footer in plaintext, signed with the footer key
    pub fn with_plaintext_footer(mut self, plaintext_footer: bool) -> Self {
        self.encrypt_footer = !plaintext_footer;
        self
    }

    /// Sets the cipher used for the file's modules
    pub fn with_algorithm(mut self, cipher: ParquetCipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Sets the key metadata stored for the footer key
    pub fn with_footer_key_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.footer_key = EncryptionKey::new(self.footer_key.key).with_metadata(metadata);
        self
    }

    /// Encrypts the given column with its own key
    pub fn with_column_key(mut self, column_path: &str, key: Vec<u8>) -> Self {
        self.column_keys
            .insert(column_path.to_owned(), EncryptionKey::new(key));
        self
    }

    /// Encrypts the given column with its own key, storing key metadata for
    /// readers
    pub fn with_column_key_and_metadata(
        mut self,
        column_path: &str,
        key: Vec<u8>,
        metadata: Vec<u8>,
    ) -> Self {
        self.column_keys.insert(
            column_path.to_owned(),
            EncryptionKey::new(key).with_metadata(metadata),
        );
        self
    }

    /// Sets the AAD prefix that binds ciphertext to this file's identity
    pub fn with_aad_prefix(mut self, aad_prefix: Vec<u8>) -> Self {
        self.aad_prefix = Some(aad_prefix);
        self
    }

    /// Whether the AAD prefix is stored in the file. When not stored, readers
    /// must supply the prefix out of band.
    pub fn with_aad_prefix_storage(mut self, store_aad_prefix: bool) -> Self {
        self.store_aad_prefix = store_aad_prefix;
        self
    }

    /// Finalizes the builder, drawing the file-unique AAD suffix
    pub fn build(self) -> Result<FileEncryptionProperties> {
        check_key_length(self.footer_key.key())?;
        for column_key in self.column_keys.values() {
            check_key_length(column_key.key())?;
        }

        let mut aad_file_unique = vec![0u8; AAD_FILE_UNIQUE_LENGTH];
        OsRng.fill_bytes(&mut aad_file_unique);

        let file_aad = match self.aad_prefix.as_ref() {
            None => aad_file_unique.clone(),
            Some(aad_prefix) => [aad_prefix.as_slice(), aad_file_unique.as_slice()].concat(),
        };

        Ok(FileEncryptionProperties {
            encrypt_footer: self.encrypt_footer,
            cipher: self.cipher,
            footer_key: self.footer_key,
            column_keys: self.column_keys,
            aad_prefix: self.aad_prefix,
            aad_file_unique,
            file_aad,
            store_aad_prefix: self.store_aad_prefix,
        })
    }
}

pub(crate) fn block_encryptor(
    cipher: ParquetCipher,
    key: &[u8],
    for_data: bool,
) -> Result<Arc<dyn BlockEncryptor>> {
    match (cipher, for_data) {
        (ParquetCipher::AesGcmCtrV1, true) => Ok(Arc::new(CtrBlockEncryptor::new(key)?)),
        _ => Ok(Arc::new(GcmBlockEncryptor::new(key)?)),
    }
}

/// Encrypts the modules of one file being written.
///
/// The footer encryptor is shared by all columns encrypted with the footer
/// key; column-keyed columns get their own per-column encryptors.
#[derive(Clone)]
pub(crate) struct FileEncryptor {
    properties: Arc<FileEncryptionProperties>,
    footer_metadata_encryptor: Arc<dyn BlockEncryptor>,
    footer_data_encryptor: Arc<dyn BlockEncryptor>,
}

impl FileEncryptor {
    pub(crate) fn new(properties: Arc<FileEncryptionProperties>) -> Result<Self> {
        let footer_metadata_encryptor =
            block_encryptor(properties.cipher(), properties.footer_key(), false)?;
        let footer_data_encryptor =
            block_encryptor(properties.cipher(), properties.footer_key(), true)?;
        Ok(Self {
            properties,
            footer_metadata_encryptor,
            footer_data_encryptor,
        })
    }

    pub(crate) fn properties(&self) -> &Arc<FileEncryptionProperties> {
        &self.properties
    }

    pub(crate) fn file_aad(&self) -> &[u8] {
        self.properties.file_aad()
    }

    pub(crate) fn footer_encryptor(&self) -> Arc<dyn BlockEncryptor> {
        self.footer_metadata_encryptor.clone()
    }

    /// Whether the given column is encrypted at all
    pub(crate) fn is_column_encrypted(&self, column_path: &str) -> bool {
        if self.properties.column_keys.is_empty() {
            // Uniform encryption
            true
        } else {
            self.properties.column_keys.contains_key(column_path)
        }
    }

    /// The crypto metadata recorded for the given column chunk, if the column
    /// is encrypted
    pub(crate) fn column_crypto_metadata(&self, column_path: &str) -> Option<ColumnCryptoMetaData> {
        if self.properties.column_keys.is_empty() {
            Some(ColumnCryptoMetaData::EncryptionWithFooterKey)
        } else {
            self.properties
                .column_keys
                .get(column_path)
                .map(|key| ColumnCryptoMetaData::EncryptionWithColumnKey {
                    path_in_schema: column_path.split('.').map(|s| s.to_owned()).collect(),
                    key_metadata: key.key_metadata().cloned(),
                })
        }
    }

    /// Returns (metadata encryptor, data encryptor) for an encrypted column
    pub(crate) fn column_encryptors(
        &self,
        column_path: &str,
    ) -> Result<Option<(Arc<dyn BlockEncryptor>, Arc<dyn BlockEncryptor>)>> {
        if self.properties.column_keys.is_empty() {
            return Ok(Some((
                self.footer_metadata_encryptor.clone(),
                self.footer_data_encryptor.clone(),
            )));
        }
        match self.properties.column_keys.get(column_path) {
            None => Ok(None),
            Some(column_key) => {
                let metadata_encryptor =
                    block_encryptor(self.properties.cipher(), column_key.key(), false)?;
                let data_encryptor =
                    block_encryptor(self.properties.cipher(), column_key.key(), true)?;
                Ok(Some((metadata_encryptor, data_encryptor)))
            }
        }
    }
}
