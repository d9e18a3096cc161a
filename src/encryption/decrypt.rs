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

//! Configuration and utilities for decryption of files using Parquet Modular
//! Encryption.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Formatter;
use std::io::Read;
use std::sync::Arc;

use crate::basic::ParquetCipher;
use crate::encryption::ciphers::{
    constant_time_eq, signed_footer_encrypt, BlockDecryptor, CtrBlockDecryptor,
    GcmBlockDecryptor, NONCE_LEN, TAG_LEN,
};
use crate::encryption::modules::{create_footer_aad, create_module_aad, ModuleType};
use crate::errors::{ParquetError, Result};

/// Size of the signature trailing a signed plaintext footer:
/// `nonce (12) || tag (16)`
pub(crate) const FOOTER_SIGNATURE_LEN: usize = NONCE_LEN + TAG_LEN;

/// Trait for retrieving an encryption key using the key's metadata.
///
/// At read time the reader may not know which columns are encrypted and which
/// keys were used; a `KeyRetriever` recovers keys on demand from the metadata
/// blobs stored in the file. The KMS-backed implementation is created through
/// [`CryptoFactory`](crate::encryption::key_management::crypto_factory::CryptoFactory);
/// custom implementations can map key metadata to keys in any other way.
pub trait KeyRetriever: Send + Sync {
    /// Retrieve a decryption key given the key metadata
    fn retrieve_key(&self, key_metadata: &[u8]) -> Result<Vec<u8>>;
}

/// Hook to accept or reject the AAD prefix of a file being read, e.g. to
/// check that the prefix matches the expected file identity.
pub trait AadPrefixVerifier: Send + Sync {
    /// Returns an error to reject the given AAD prefix
    fn verify(&self, aad_prefix: &[u8]) -> Result<()>;
}

#[derive(Clone, PartialEq)]
struct ExplicitDecryptionKeys {
    footer_key: Vec<u8>,
    column_keys: HashMap<String, Vec<u8>>,
}

#[derive(Clone)]
enum DecryptionKeys {
    Explicit(ExplicitDecryptionKeys),
    ViaRetriever(Arc<dyn KeyRetriever>),
}

impl PartialEq for DecryptionKeys {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DecryptionKeys::Explicit(keys), DecryptionKeys::Explicit(other_keys)) => {
                keys.footer_key == other_keys.footer_key
                    && keys.column_keys == other_keys.column_keys
            }
            (DecryptionKeys::ViaRetriever(_), DecryptionKeys::ViaRetriever(_)) => true,
            _ => false,
        }
    }
}

/// `FileDecryptionProperties` hold the keys and AAD data required to decrypt
/// a Parquet file.
///
/// # Examples
///
/// Decrypt a file where all metadata and data are encrypted with the footer
/// key:
/// ```
/// # use parquet_crypto::encryption::decrypt::FileDecryptionProperties;
/// let decryption_properties = FileDecryptionProperties::builder(b"0123456789012345".into())
///     .build()?;
/// # Ok::<(), parquet_crypto::errors::ParquetError>(())
/// ```
///
/// Decrypt a file where columns are encrypted with their own keys:
/// ```
/// # use parquet_crypto::encryption::decrypt::FileDecryptionProperties;
/// let decryption_properties = FileDecryptionProperties::builder(b"0123456789012345".into())
///     .with_column_key("x", b"1234567890123450".into())
///     .build()?;
/// # Ok::<(), parquet_crypto::errors::ParquetError>(())
/// ```
#[derive(Clone)]
pub struct FileDecryptionProperties {
    keys: DecryptionKeys,
    aad_prefix: Option<Vec<u8>>,
    aad_prefix_verifier: Option<Arc<dyn AadPrefixVerifier>>,
    footer_signature_verification: bool,
}

impl PartialEq for FileDecryptionProperties {
    fn eq(&self, other: &Self) -> bool {
        // The verifier hook does not participate in equality
        self.keys == other.keys
            && self.aad_prefix == other.aad_prefix
            && self.footer_signature_verification == other.footer_signature_verification
    }
}

impl std::fmt::Debug for FileDecryptionProperties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Never print key bytes
        write!(f, "FileDecryptionProperties {{ }}")
    }
}

impl FileDecryptionProperties {
    /// Returns a new builder using the provided footer key for footer
    /// decryption
    pub fn builder(footer_key: Vec<u8>) -> DecryptionPropertiesBuilder {
        DecryptionPropertiesBuilder::new(footer_key)
    }

    /// Returns a new builder that uses a [`KeyRetriever`] to obtain
    /// decryption keys based on key metadata
    pub fn with_key_retriever(
        key_retriever: Arc<dyn KeyRetriever>,
    ) -> DecryptionPropertiesBuilderWithRetriever {
        DecryptionPropertiesBuilderWithRetriever::new(key_retriever)
    }

    /// AAD prefix to use when the file does not store one
    pub fn aad_prefix(&self) -> Option<&Vec<u8>> {
        self.aad_prefix.as_ref()
    }

    /// Optional hook deciding whether an AAD prefix read from a file is
    /// acceptable
    pub fn aad_prefix_verifier(&self) -> Option<&Arc<dyn AadPrefixVerifier>> {
        self.aad_prefix_verifier.as_ref()
    }

    /// Whether signatures of plaintext footers are verified
    pub fn check_plaintext_footer_integrity(&self) -> bool {
        self.footer_signature_verification
    }

    /// Get the encryption key for decrypting a file's footer, and also column
    /// data if uniform encryption is used
    pub fn footer_key(&self, key_metadata: Option<&[u8]>) -> Result<Cow<'_, Vec<u8>>> {
        match &self.keys {
            DecryptionKeys::Explicit(keys) => Ok(Cow::Borrowed(&keys.footer_key)),
            DecryptionKeys::ViaRetriever(retriever) => {
                let key = retriever.retrieve_key(key_metadata.unwrap_or_default())?;
                Ok(Cow::Owned(key))
            }
        }
    }

    /// Get the column-specific key for decrypting column data and metadata
    pub fn column_key(
        &self,
        column_name: &str,
        key_metadata: Option<&[u8]>,
    ) -> Result<Cow<'_, Vec<u8>>> {
        match &self.keys {
            DecryptionKeys::Explicit(keys) => match keys.column_keys.get(column_name) {
                None => Err(general_err!(
                    "no column decryption key set for encrypted column '{}'",
                    column_name
                )),
                Some(key) => Ok(Cow::Borrowed(key)),
            },
            DecryptionKeys::ViaRetriever(retriever) => {
                let key = retriever.retrieve_key(key_metadata.unwrap_or_default())?;
                Ok(Cow::Owned(key))
            }
        }
    }

    /// The explicit column key configured for a column, if any
    pub(crate) fn explicit_column_key(&self, column_name: &str) -> Option<&Vec<u8>> {
        match &self.keys {
            DecryptionKeys::Explicit(keys) => keys.column_keys.get(column_name),
            DecryptionKeys::ViaRetriever(_) => None,
        }
    }

    pub(crate) fn has_key_retriever(&self) -> bool {
        matches!(&self.keys, DecryptionKeys::ViaRetriever(_))
    }
}

/// Builder for [`FileDecryptionProperties`] with explicitly provided keys
pub struct DecryptionPropertiesBuilder {
    footer_key: Vec<u8>,
    column_keys: HashMap<String, Vec<u8>>,
    aad_prefix: Option<Vec<u8>>,
    aad_prefix_verifier: Option<Arc<dyn AadPrefixVerifier>>,
    footer_signature_verification: bool,
}

impl DecryptionPropertiesBuilder {
    /// Creates a new builder using the provided footer key
    pub fn new(footer_key: Vec<u8>) -> DecryptionPropertiesBuilder {
        Self {
            footer_key,
            column_keys: HashMap::default(),
            aad_prefix: None,
            aad_prefix_verifier: None,
            footer_signature_verification: true,
        }
    }

    /// Finalizes the builder and returns the created
    /// [`FileDecryptionProperties`]
    pub fn build(self) -> Result<Arc<FileDecryptionProperties>> {
        let keys = DecryptionKeys::Explicit(ExplicitDecryptionKeys {
            footer_key: self.footer_key,
            column_keys: self.column_keys,
        });
        Ok(Arc::new(FileDecryptionProperties {
            keys,
            aad_prefix: self.aad_prefix,
            aad_prefix_verifier: self.aad_prefix_verifier,
            footer_signature_verification: self.footer_signature_verification,
        }))
    }

    /// Specify the expected AAD prefix to be used for decryption. This must
    /// be set if the file was written with an AAD prefix that is not stored
    /// in the file metadata.
    pub fn with_aad_prefix(mut self, value: Vec<u8>) -> Self {
        self.aad_prefix = Some(value);
        self
    }

    /// Install a hook that accepts or rejects AAD prefixes read from files
    pub fn with_aad_prefix_verifier(mut self, verifier: Arc<dyn AadPrefixVerifier>) -> Self {
        self.aad_prefix_verifier = Some(verifier);
        self
    }

    /// Specify the decryption key to use for a column
    pub fn with_column_key(mut self, column_name: &str, decryption_key: Vec<u8>) -> Self {
        self.column_keys
            .insert(column_name.to_string(), decryption_key);
        self
    }

    /// Disable verification of footer signatures for files that use plaintext
    /// footers. Signature verification is enabled by default.
    pub fn disable_footer_signature_verification(mut self) -> Self {
        self.footer_signature_verification = false;
        self
    }
}

/// Builder for [`FileDecryptionProperties`] that uses a [`KeyRetriever`]
pub struct DecryptionPropertiesBuilderWithRetriever {
    key_retriever: Arc<dyn KeyRetriever>,
    aad_prefix: Option<Vec<u8>>,
    aad_prefix_verifier: Option<Arc<dyn AadPrefixVerifier>>,
    footer_signature_verification: bool,
}

impl DecryptionPropertiesBuilderWithRetriever {
    /// Creates a new builder using the provided [`KeyRetriever`]
    pub fn new(key_retriever: Arc<dyn KeyRetriever>) -> DecryptionPropertiesBuilderWithRetriever {
        Self {
            key_retriever,
            aad_prefix: None,
            aad_prefix_verifier: None,
            footer_signature_verification: true,
        }
    }

    /// Finalizes the builder and returns the created
    /// [`FileDecryptionProperties`]
    pub fn build(self) -> Result<Arc<FileDecryptionProperties>> {
        let keys = DecryptionKeys::ViaRetriever(self.key_retriever);
        Ok(Arc::new(FileDecryptionProperties {
            keys,
            aad_prefix: self.aad_prefix,
            aad_prefix_verifier: self.aad_prefix_verifier,
            footer_signature_verification: self.footer_signature_verification,
        }))
    }

    /// Specify the expected AAD prefix to be used for decryption
    pub fn with_aad_prefix(mut self, value: Vec<u8>) -> Self {
        self.aad_prefix = Some(value);
        self
    }

    /// Install a hook that accepts or rejects AAD prefixes read from files
    pub fn with_aad_prefix_verifier(mut self, verifier: Arc<dyn AadPrefixVerifier>) -> Self {
        self.aad_prefix_verifier = Some(verifier);
        self
    }

    /// Disable verification of footer signatures for files that use plaintext
    /// footers
    pub fn disable_footer_signature_verification(mut self) -> Self {
        self.footer_signature_verification = false;
        self
    }
}

pub(crate) fn block_decryptor(
    cipher: ParquetCipher,
    key: &[u8],
    for_data: bool,
) -> Result<Arc<dyn BlockDecryptor>> {
    match (cipher, for_data) {
        (ParquetCipher::AesGcmCtrV1, true) => Ok(Arc::new(CtrBlockDecryptor::new(key)?)),
        _ => Ok(Arc::new(GcmBlockDecryptor::new(key)?)),
    }
}

/// Reads one framed encrypted module from `input` and decrypts it
pub(crate) fn read_and_decrypt<T: Read>(
    decryptor: &Arc<dyn BlockDecryptor>,
    input: &mut T,
    aad: &[u8],
) -> Result<Vec<u8>> {
    let mut len_bytes = [0; 4];
    input.read_exact(&mut len_bytes)?;
    let ciphertext_len = u32::from_le_bytes(len_bytes) as usize;
    let mut ciphertext = vec![0; 4 + ciphertext_len];
    ciphertext[..4].copy_from_slice(&len_bytes);
    input.read_exact(&mut ciphertext[4..])?;

    decryptor.decrypt(&ciphertext, aad)
}

/// Decrypts the modules of one file being read.
///
/// Holds the footer key and the file AAD; per-column decryptors are derived
/// from keys the metadata resolver obtains.
#[derive(Clone)]
pub(crate) struct FileDecryptor {
    properties: Arc<FileDecryptionProperties>,
    footer_metadata_decryptor: Arc<dyn BlockDecryptor>,
    footer_data_decryptor: Arc<dyn BlockDecryptor>,
    footer_key: Vec<u8>,
    cipher: ParquetCipher,
    file_aad: Vec<u8>,
}

impl std::fmt::Debug for FileDecryptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileDecryptor {{ }}")
    }
}

impl FileDecryptor {
    pub(crate) fn new(
        properties: &Arc<FileDecryptionProperties>,
        footer_key_metadata: Option<&[u8]>,
        aad_prefix: Vec<u8>,
        aad_file_unique: Vec<u8>,
        cipher: ParquetCipher,
    ) -> Result<Self> {
        let file_aad = [aad_prefix.as_slice(), aad_file_unique.as_slice()].concat();
        let footer_key = properties.footer_key(footer_key_metadata)?.into_owned();
        let footer_metadata_decryptor = block_decryptor(cipher, &footer_key, false)?;
        let footer_data_decryptor = block_decryptor(cipher, &footer_key, true)?;

        Ok(Self {
            properties: Arc::clone(properties),
            footer_metadata_decryptor,
            footer_data_decryptor,
            footer_key,
            cipher,
            file_aad,
        })
    }

    pub(crate) fn properties(&self) -> &Arc<FileDecryptionProperties> {
        &self.properties
    }

    pub(crate) fn cipher(&self) -> ParquetCipher {
        self.cipher
    }

    pub(crate) fn file_aad(&self) -> &[u8] {
        &self.file_aad
    }

    pub(crate) fn footer_decryptor(&self) -> Arc<dyn BlockDecryptor> {
        self.footer_metadata_decryptor.clone()
    }

    pub(crate) fn footer_data_decryptor(&self) -> Arc<dyn BlockDecryptor> {
        self.footer_data_decryptor.clone()
    }

    /// Builds the (metadata, data) decryptors for a column encrypted with its
    /// own key
    pub(crate) fn column_decryptors(
        &self,
        key: &[u8],
    ) -> Result<(Arc<dyn BlockDecryptor>, Arc<dyn BlockDecryptor>)> {
        Ok((
            block_decryptor(self.cipher, key, false)?,
            block_decryptor(self.cipher, key, true)?,
        ))
    }

    /// Verifies the trailing `nonce || tag` signature of a plaintext footer.
    ///
    /// The signature is recomputed by encrypting the serialized footer with
    /// the footer key under the stored nonce, and the tags are compared in
    /// constant time.
    pub(crate) fn verify_plaintext_footer_signature(
        &self,
        footer_and_signature: &[u8],
    ) -> Result<()> {
        if footer_and_signature.len() < FOOTER_SIGNATURE_LEN {
            return Err(ParquetError::AuthenticationFailed(
                "plaintext footer shorter than its signature".to_string(),
            ));
        }
        let (serialized_footer, signature) =
            footer_and_signature.split_at(footer_and_signature.len() - FOOTER_SIGNATURE_LEN);
        let nonce: &[u8; NONCE_LEN] = signature[..NONCE_LEN].try_into().unwrap();
        let tag = &signature[NONCE_LEN..];

        let aad = create_footer_aad(self.file_aad());
        let encrypted = signed_footer_encrypt(serialized_footer, &self.footer_key, &aad, nonce)?;
        let computed_tag = &encrypted[encrypted.len() - TAG_LEN..];

        if !constant_time_eq(computed_tag, tag) {
            return Err(ParquetError::AuthenticationFailed(
                "plaintext footer signature".to_string(),
            ));
        }
        Ok(())
    }
}

/// The context required to decrypt the modules of one column chunk: its
/// decryptors, its position within the file, and the file AAD.
#[derive(Clone)]
pub(crate) struct CryptoContext {
    pub(crate) row_group_ordinal: u16,
    pub(crate) column_ordinal: u16,
    pub(crate) page_ordinal: u16,
    pub(crate) dictionary_page: bool,
    // Separate data and metadata decryptors: in GCM-CTR mode page payloads
    // and page headers use different algorithms.
    data_decryptor: Arc<dyn BlockDecryptor>,
    metadata_decryptor: Arc<dyn BlockDecryptor>,
    file_aad: Vec<u8>,
}

impl CryptoContext {
    pub(crate) fn new(
        row_group_ordinal: u16,
        column_ordinal: u16,
        data_decryptor: Arc<dyn BlockDecryptor>,
        metadata_decryptor: Arc<dyn BlockDecryptor>,
        file_aad: Vec<u8>,
    ) -> Self {
        Self {
            row_group_ordinal,
            column_ordinal,
            page_ordinal: 0,
            dictionary_page: false,
            data_decryptor,
            metadata_decryptor,
            file_aad,
        }
    }

    pub(crate) fn with_page_ordinal(&self, page_ordinal: u16) -> Self {
        Self {
            page_ordinal,
            dictionary_page: false,
            ..self.clone()
        }
    }

    pub(crate) fn for_dictionary_page(&self) -> Self {
        Self {
            dictionary_page: true,
            ..self.clone()
        }
    }

    pub(crate) fn create_page_header_aad(&self) -> Vec<u8> {
        let module_type = if self.dictionary_page {
            ModuleType::DictionaryPageHeader
        } else {
            ModuleType::DataPageHeader
        };
        create_module_aad(
            &self.file_aad,
            module_type,
            self.row_group_ordinal,
            self.column_ordinal,
            self.page_ordinal,
        )
    }

    pub(crate) fn create_page_aad(&self) -> Vec<u8> {
        let module_type = if self.dictionary_page {
            ModuleType::DictionaryPage
        } else {
            ModuleType::DataPage
        };
        create_module_aad(
            &self.file_aad,
            module_type,
            self.row_group_ordinal,
            self.column_ordinal,
            self.page_ordinal,
        )
    }

    pub(crate) fn data_decryptor(&self) -> &Arc<dyn BlockDecryptor> {
        &self.data_decryptor
    }

    pub(crate) fn metadata_decryptor(&self) -> &Arc<dyn BlockDecryptor> {
        &self.metadata_decryptor
    }
}
