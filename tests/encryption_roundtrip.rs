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

//! End-to-end tests of writing and reading encrypted files.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parquet_crypto::basic::{PageType, ParquetCipher, Type};
use parquet_crypto::encryption::decrypt::FileDecryptionProperties;
use parquet_crypto::encryption::encrypt::FileEncryptionProperties;
use parquet_crypto::encryption::key_management::crypto_factory::{
    CryptoFactory, DecryptionConfiguration, EncryptionConfiguration,
};
use parquet_crypto::encryption::key_management::key_material_store::InMemoryKeyMaterialStore;
use parquet_crypto::encryption::key_management::kms::{
    InMemoryKms, KmsClient, KmsClientFactory, KmsClientRef, KmsConnectionConfig,
};
use parquet_crypto::errors::{ParquetError, Result};
use parquet_crypto::file::metadata::ColumnCryptoMetaData;
use parquet_crypto::file::properties::{ReaderProperties, WriterProperties};
use parquet_crypto::file::serialized_reader::SerializedFileReader;
use parquet_crypto::file::writer::{ColumnChunkPages, PagePayload, SerializedFileWriter};
use parquet_crypto::schema::types::{ColumnDescriptor, ColumnPath, SchemaDescriptor};

const COLUMN_A: &[i32] = &[1, 2, 3];
const COLUMN_B: &[i32] = &[10, 20, 30];

fn master_keys() -> HashMap<String, Vec<u8>> {
    let mut keys = HashMap::new();
    keys.insert("kf".to_owned(), vec![0u8; 16]);
    keys.insert("kcol".to_owned(), b"1234567890123450".to_vec());
    keys
}

fn two_column_schema() -> SchemaDescriptor {
    SchemaDescriptor::new(vec![
        ColumnDescriptor::new(ColumnPath::from("a"), Type::Int32),
        ColumnDescriptor::new(ColumnPath::from("b"), Type::Int32),
    ])
}

fn encode_values(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_values(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

fn single_page(values: &[i32]) -> ColumnChunkPages {
    ColumnChunkPages {
        dictionary_page: None,
        data_pages: vec![PagePayload {
            num_values: values.len() as i32,
            bytes: encode_values(values),
        }],
    }
}

fn write_two_column_file(encryption: Option<FileEncryptionProperties>) -> Bytes {
    write_file(
        two_column_schema(),
        vec![vec![single_page(COLUMN_A), single_page(COLUMN_B)]],
        encryption,
    )
}

fn write_file(
    schema: SchemaDescriptor,
    row_groups: Vec<Vec<ColumnChunkPages>>,
    encryption: Option<FileEncryptionProperties>,
) -> Bytes {
    let mut builder = WriterProperties::builder();
    if let Some(encryption) = encryption {
        builder = builder.with_file_encryption_properties(encryption);
    }
    let mut out = Vec::new();
    {
        let mut writer = SerializedFileWriter::new(&mut out, schema, builder.build()).unwrap();
        for row_group in row_groups {
            writer.write_row_group(row_group).unwrap();
        }
        writer.close().unwrap();
    }
    Bytes::from(out)
}

fn read_column_values(
    reader: &SerializedFileReader<Bytes>,
    row_group_idx: usize,
    column_idx: usize,
) -> Result<Vec<i32>> {
    let row_group = reader.get_row_group(row_group_idx)?;
    let mut page_reader = row_group.get_column_page_reader(column_idx)?;
    let mut values = Vec::new();
    while let Some(page) = page_reader.get_next_page()? {
        if page.page_type() == PageType::DataPage {
            values.extend(decode_values(&page.buf));
        }
    }
    Ok(values)
}

fn reader_properties(decryption: Arc<FileDecryptionProperties>) -> ReaderProperties {
    ReaderProperties::builder()
        .with_file_decryption_properties(decryption)
        .build()
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// KMS client factory that denies access to some master keys, for
/// hidden-column scenarios
struct DenyingKmsFactory {
    master_keys: HashMap<String, Vec<u8>>,
    denied: Vec<String>,
}

impl KmsClientFactory for DenyingKmsFactory {
    fn create_client(&self, _config: &KmsConnectionConfig) -> Result<KmsClientRef> {
        let kms = InMemoryKms::new(self.master_keys.clone());
        for key in &self.denied {
            kms.deny_key(key);
        }
        Ok(Arc::new(kms))
    }
}

/// KMS client factory counting the unwrap calls that reach the KMS
struct CountingKmsFactory {
    master_keys: HashMap<String, Vec<u8>>,
    unwraps: Arc<AtomicUsize>,
}

impl KmsClientFactory for CountingKmsFactory {
    fn create_client(&self, _config: &KmsConnectionConfig) -> Result<KmsClientRef> {
        Ok(Arc::new(CountingKmsClient {
            inner: InMemoryKms::new(self.master_keys.clone()),
            unwraps: self.unwraps.clone(),
        }))
    }
}

struct CountingKmsClient {
    inner: InMemoryKms,
    unwraps: Arc<AtomicUsize>,
}

impl KmsClient for CountingKmsClient {
    fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<String> {
        self.inner.wrap_key(key_bytes, master_key_identifier)
    }

    fn unwrap_key(&self, wrapped_key: &str, master_key_identifier: &str) -> Result<Vec<u8>> {
        self.unwraps.fetch_add(1, Ordering::SeqCst);
        self.inner.unwrap_key(wrapped_key, master_key_identifier)
    }
}

#[test]
fn test_plaintext_file_round_trip() {
    let file = write_two_column_file(None);
    assert_eq!(&file[file.len() - 4..], b"PAR1");
    assert_eq!(&file[..4], b"PAR1");

    let reader = SerializedFileReader::new(file).unwrap();
    assert_eq!(reader.num_row_groups(), 1);
    assert_eq!(reader.metadata().file_metadata().num_rows, 3);
    assert_eq!(reader.metadata().schema_descr().num_columns(), 2);

    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}

#[test]
fn test_encrypted_footer_uniform_encryption() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());

    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_uniform_encryption()
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();

    let file = write_two_column_file(Some(encryption));
    assert_eq!(&file[file.len() - 4..], b"PARE");
    // Page payloads must not appear in the clear
    assert_eq!(find_subsequence(&file, &encode_values(COLUMN_A)), None);

    let decryption = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();

    for column_idx in 0..2 {
        let crypto = &reader
            .metadata()
            .row_group(0)
            .unwrap()
            .column(column_idx)
            .unwrap()
            .crypto_metadata;
        assert_eq!(crypto, &Some(ColumnCryptoMetaData::EncryptionWithFooterKey));
    }

    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}

#[test]
fn test_encrypted_footer_requires_decryption_properties() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());
    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_uniform_encryption()
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config, &encryption_config)
        .unwrap();

    let file = write_two_column_file(Some(encryption));
    let err = SerializedFileReader::new(file).unwrap_err();
    assert!(matches!(err, ParquetError::NoFooterKey(_)));
}

#[test]
fn test_column_key_encryption() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());

    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_column_keys("kcol:a".to_owned())
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();

    let file = write_two_column_file(Some(encryption));

    let decryption = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();

    let row_group = reader.metadata().row_group(0).unwrap();
    // Column "a" carries its own key and stores its metadata encrypted
    let column_a = row_group.column(0).unwrap();
    assert!(matches!(
        column_a.crypto_metadata,
        Some(ColumnCryptoMetaData::EncryptionWithColumnKey { .. })
    ));
    assert!(column_a.encrypted_column_metadata.is_some());
    // The resolver has decrypted the column metadata
    assert!(column_a.meta_data.is_some());
    // Column "b" is not listed under a column key and stays plaintext
    assert!(row_group.column(1).unwrap().crypto_metadata.is_none());

    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}

#[test]
fn test_hidden_column() {
    // Write with full key access
    let write_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());
    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_column_keys("kcol:a".to_owned())
        .build()
        .unwrap();
    let encryption = write_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();
    let file = write_two_column_file(Some(encryption));

    // Read through a KMS that denies the column key
    let read_factory = CryptoFactory::new(DenyingKmsFactory {
        master_keys: master_keys(),
        denied: vec!["kcol".to_owned()],
    });
    let decryption = read_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();

    // The open succeeds
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();
    assert!(reader.metadata().hidden_column(0, 0).is_some());

    // Reading "b" succeeds
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);

    // Reading "a" reports the hidden column
    let err = read_column_values(&reader, 0, 0).unwrap_err();
    assert!(matches!(err, ParquetError::HiddenColumn { path } if path == "a"));
}

#[test]
fn test_footer_signature_tamper() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());
    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_uniform_encryption()
        .set_plaintext_footer(true)
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();

    let file = write_two_column_file(Some(encryption));
    assert_eq!(&file[file.len() - 4..], b"PAR1");

    let decryption = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();

    // The untampered footer verifies
    let reader = SerializedFileReader::new_with_properties(
        file.clone(),
        reader_properties(decryption.clone()),
    )
    .unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);

    // Flip one bit inside the serialized footer (the created_by string keeps
    // the footer decodable, but the signature no longer matches)
    let mut tampered = file.to_vec();
    let created_by_offset = find_subsequence(&tampered, b"parquet-crypto version").unwrap();
    tampered[created_by_offset] ^= 1;
    let err = SerializedFileReader::new_with_properties(
        Bytes::from(tampered),
        reader_properties(decryption.clone()),
    )
    .unwrap_err();
    assert!(matches!(err, ParquetError::AuthenticationFailed(_)));

    // Flipping a bit of the stored tag must fail as well
    let mut tampered = file.to_vec();
    let tag_offset = tampered.len() - 9;
    tampered[tag_offset] ^= 1;
    let err = SerializedFileReader::new_with_properties(
        Bytes::from(tampered),
        reader_properties(decryption),
    )
    .unwrap_err();
    assert!(matches!(err, ParquetError::AuthenticationFailed(_)));
}

#[test]
fn test_double_wrapping_survives_cache_invalidation() {
    let unwraps = Arc::new(AtomicUsize::new(0));
    let crypto_factory = CryptoFactory::new(CountingKmsFactory {
        master_keys: master_keys(),
        unwraps: unwraps.clone(),
    });
    let kms_config = Arc::new(KmsConnectionConfig::default());

    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_uniform_encryption()
        .set_double_wrapping(true)
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();
    let file = write_two_column_file(Some(encryption));

    let decryption = crypto_factory
        .file_decryption_properties(kms_config.clone(), DecryptionConfiguration::default())
        .unwrap();
    let reader = SerializedFileReader::new_with_properties(
        file.clone(),
        reader_properties(decryption),
    )
    .unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(unwraps.load(Ordering::SeqCst), 1);

    // Invalidate the KEK cache, simulating a fresh process; the unwrap path
    // must re-issue a KMS unwrap of the wrapped KEK and still succeed
    crypto_factory.remove_cache_entries_for_all_tokens();
    let decryption = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
    assert_eq!(unwraps.load(Ordering::SeqCst), 2);
}

#[test]
fn test_gcm_ctr_round_trip() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());
    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_uniform_encryption()
        .set_encryption_algorithm(ParquetCipher::AesGcmCtrV1)
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();

    let file = write_two_column_file(Some(encryption));
    assert_eq!(find_subsequence(&file, &encode_values(COLUMN_A)), None);

    let decryption = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}

#[test]
fn test_data_module_tamper_detected() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());
    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_uniform_encryption()
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();
    let file = write_two_column_file(Some(encryption));

    // Flip a bit inside the first page module of column "a" (right after the
    // leading magic)
    let mut tampered = file.to_vec();
    tampered[10] ^= 1;

    let decryption = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();
    let reader = SerializedFileReader::new_with_properties(
        Bytes::from(tampered),
        reader_properties(decryption),
    )
    .unwrap();

    let err = read_column_values(&reader, 0, 0).unwrap_err();
    assert!(matches!(err, ParquetError::AuthenticationFailed(_)));
    // Column "b" is bound to different AADs and still reads correctly
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}

#[test]
fn test_explicit_keys_with_stored_aad_prefix() {
    let footer_key = b"0123456789012345".to_vec();
    let encryption = FileEncryptionProperties::builder(footer_key.clone())
        .with_aad_prefix(b"file1".to_vec())
        .build()
        .unwrap();
    let file = write_two_column_file(Some(encryption));

    // The prefix is stored in the file, so decryption needs no configuration
    let decryption = FileDecryptionProperties::builder(footer_key.clone())
        .build()
        .unwrap();
    let reader = SerializedFileReader::new_with_properties(
        file.clone(),
        reader_properties(decryption),
    )
    .unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);

    // A configured prefix must match the stored one
    let decryption = FileDecryptionProperties::builder(footer_key)
        .with_aad_prefix(b"other".to_vec())
        .build()
        .unwrap();
    let err = SerializedFileReader::new_with_properties(file, reader_properties(decryption))
        .unwrap_err();
    assert!(matches!(err, ParquetError::AadPrefixMismatch));
}

#[test]
fn test_supplied_aad_prefix() {
    let footer_key = b"0123456789012345".to_vec();
    let encryption = FileEncryptionProperties::builder(footer_key.clone())
        .with_aad_prefix(b"file1".to_vec())
        .with_aad_prefix_storage(false)
        .build()
        .unwrap();
    let file = write_two_column_file(Some(encryption));

    // The prefix is not stored; the reader must be configured with it
    let decryption = FileDecryptionProperties::builder(footer_key.clone())
        .build()
        .unwrap();
    let err = SerializedFileReader::new_with_properties(
        file.clone(),
        reader_properties(decryption),
    )
    .unwrap_err();
    assert!(matches!(err, ParquetError::AadPrefixMissing));

    let decryption = FileDecryptionProperties::builder(footer_key)
        .with_aad_prefix(b"file1".to_vec())
        .build()
        .unwrap();
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}

#[test]
fn test_dictionary_pages_and_multiple_row_groups() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());
    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_uniform_encryption()
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();

    let column_with_dictionary = |dictionary: &[i32], pages: &[&[i32]]| ColumnChunkPages {
        dictionary_page: Some(PagePayload {
            num_values: dictionary.len() as i32,
            bytes: encode_values(dictionary),
        }),
        data_pages: pages
            .iter()
            .map(|values| PagePayload {
                num_values: values.len() as i32,
                bytes: encode_values(values),
            })
            .collect(),
    };

    let schema = SchemaDescriptor::new(vec![ColumnDescriptor::new(
        ColumnPath::from("a"),
        Type::Int32,
    )]);
    let file = write_file(
        schema,
        vec![
            vec![column_with_dictionary(&[7, 8], &[&[0, 1], &[1, 0]])],
            vec![column_with_dictionary(&[9], &[&[0]])],
        ],
        Some(encryption),
    );

    let decryption = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();
    assert_eq!(reader.num_row_groups(), 2);

    let mut page_reader = reader
        .get_row_group(0)
        .unwrap()
        .get_column_page_reader(0)
        .unwrap();
    let dictionary = page_reader.get_next_page().unwrap().unwrap();
    assert_eq!(dictionary.page_type(), PageType::DictionaryPage);
    assert_eq!(decode_values(&dictionary.buf), vec![7, 8]);
    let first = page_reader.get_next_page().unwrap().unwrap();
    assert_eq!(first.page_type(), PageType::DataPage);
    assert_eq!(decode_values(&first.buf), vec![0, 1]);
    let second = page_reader.get_next_page().unwrap().unwrap();
    assert_eq!(decode_values(&second.buf), vec![1, 0]);
    assert!(page_reader.get_next_page().unwrap().is_none());

    assert_eq!(read_column_values(&reader, 1, 0).unwrap(), vec![0]);
}

#[test]
fn test_external_key_material_store() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());
    let store = Arc::new(InMemoryKeyMaterialStore::new());

    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_column_keys("kcol:a".to_owned())
        .set_internal_key_material(false)
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties_with_key_material_store(
            kms_config.clone(),
            &encryption_config,
            Some(store.clone()),
        )
        .unwrap();

    // The key metadata stored in the file is only a reference into the store
    let footer_key_metadata =
        String::from_utf8(encryption.footer_key_metadata().unwrap().clone()).unwrap();
    assert!(footer_key_metadata.contains("keyReference"));
    assert!(!footer_key_metadata.contains("wrappedDEK"));

    let file = write_two_column_file(Some(encryption));

    let decryption = crypto_factory
        .file_decryption_properties_with_key_material_store(
            kms_config,
            DecryptionConfiguration::default(),
            Some(store),
        )
        .unwrap();
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}

#[test]
fn test_parquet_mr_dictionary_header_padding() {
    // Files claiming parquet-mr < 1.2.9 get their column chunk ranges padded
    // to cover the unaccounted dictionary page header; the pad bytes are
    // never interpreted as pages.
    let mut out = Vec::new();
    {
        let properties = WriterProperties::builder()
            .with_created_by("parquet-mr version 1.2.8 (build abc)".to_owned())
            .build();
        let mut writer =
            SerializedFileWriter::new(&mut out, two_column_schema(), properties).unwrap();
        writer
            .write_row_group(vec![single_page(COLUMN_A), single_page(COLUMN_B)])
            .unwrap();
        writer.close().unwrap();
    }

    let reader = SerializedFileReader::new(Bytes::from(out)).unwrap();
    assert!(reader
        .metadata()
        .writer_version()
        .has_missing_dictionary_header_size_bug());
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}

#[test]
fn test_reader_close_is_idempotent() {
    let file = write_two_column_file(None);
    let mut reader = SerializedFileReader::new(file).unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);

    reader.close();
    reader.close();

    // Metadata stays accessible, but row groups can no longer be read
    assert_eq!(reader.metadata().file_metadata().num_rows, 3);
    assert!(reader.get_row_group(0).is_err());
}

#[test]
fn test_plaintext_footer_keeps_pages_encrypted() {
    let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys()));
    let kms_config = Arc::new(KmsConnectionConfig::default());
    let encryption_config = EncryptionConfiguration::builder("kf".to_owned())
        .set_uniform_encryption()
        .set_plaintext_footer(true)
        .build()
        .unwrap();
    let encryption = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();

    let file = write_two_column_file(Some(encryption));
    // The footer is readable without keys...
    assert!(find_subsequence(&file, b"created_by").is_some());
    // ...but page payloads are not
    assert_eq!(find_subsequence(&file, &encode_values(COLUMN_A)), None);

    // Reading data still requires decryption properties
    let err = SerializedFileReader::new(file.clone()).unwrap_err();
    assert!(matches!(err, ParquetError::NoFooterKey(_)));

    let decryption = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();
    let reader =
        SerializedFileReader::new_with_properties(file, reader_properties(decryption)).unwrap();
    assert_eq!(read_column_values(&reader, 0, 0).unwrap(), COLUMN_A);
    assert_eq!(read_column_values(&reader, 0, 1).unwrap(), COLUMN_B);
}
