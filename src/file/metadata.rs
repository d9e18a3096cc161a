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

//! File metadata structures and the column-metadata resolver.
//!
//! [`FileMetaData`] and the types it contains mirror the on-disk metadata
//! model and travel through the [`MetadataCodec`](crate::codec::MetadataCodec)
//! seam. [`ParquetMetaData`] is the resolved in-memory view of one read
//! session: column metadata decrypted where needed, column keys materialized,
//! and columns whose keys are inaccessible marked hidden.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::basic::{Compression, Encoding, PageType, ParquetCipher, Type};
use crate::codec::MetadataCodec;
use crate::encryption::ciphers::BlockDecryptor;
use crate::encryption::decrypt::FileDecryptor;
use crate::encryption::modules::{create_module_aad, ModuleType};
use crate::errors::{ParquetError, Result};
use crate::schema::types::{ColumnPath, SchemaDescriptor};

/// The encryption algorithm and AAD metadata recorded in a file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptionAlgorithm {
    /// The cipher the file's modules are encrypted with
    pub cipher: ParquetCipher,
    /// AAD prefix, present only when the writer chose to store it
    pub aad_prefix: Option<Vec<u8>>,
    /// Random per-file AAD suffix
    pub aad_file_unique: Vec<u8>,
    /// True when the AAD prefix is not stored and readers must supply it
    pub supply_aad_prefix: bool,
}

/// Crypto metadata of one column chunk
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColumnCryptoMetaData {
    /// The column is encrypted with the footer key
    EncryptionWithFooterKey,
    /// The column is encrypted with a column-specific key
    EncryptionWithColumnKey {
        /// Path to the column in the schema
        path_in_schema: Vec<String>,
        /// Key metadata to retrieve the column key
        key_metadata: Option<Vec<u8>>,
    },
}

/// Crypto metadata written before the encrypted footer of `PARE` files
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileCryptoMetaData {
    /// Algorithm and AAD metadata of the file
    pub encryption_algorithm: EncryptionAlgorithm,
    /// Key metadata to retrieve the footer key
    pub key_metadata: Option<Vec<u8>>,
}

/// Metadata of one column chunk's pages and layout
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetaData {
    /// Physical type of the column values
    pub physical_type: Type,
    /// Encodings used by pages of this chunk
    pub encodings: Vec<Encoding>,
    /// Path of the column in the schema
    pub path_in_schema: Vec<String>,
    /// Compression codec applied to page payloads
    pub codec: Compression,
    /// Number of values in this chunk, across all data pages
    pub num_values: i64,
    /// Total byte size of the chunk's pages before compression and encryption
    pub total_uncompressed_size: i64,
    /// Total byte size of the chunk's pages as stored
    pub total_compressed_size: i64,
    /// File offset of the first data page
    pub data_page_offset: i64,
    /// File offset of the dictionary page, if the chunk has one
    pub dictionary_page_offset: Option<i64>,
}

/// Metadata of one column chunk within a row group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnChunkMetaData {
    /// File offset of the column chunk
    pub file_offset: i64,
    /// Column metadata; absent on disk when stored encrypted in
    /// `encrypted_column_metadata`
    pub meta_data: Option<ColumnMetaData>,
    /// How this column is encrypted, if at all
    pub crypto_metadata: Option<ColumnCryptoMetaData>,
    /// Column metadata encrypted with the column key
    pub encrypted_column_metadata: Option<Vec<u8>>,
}

impl ColumnChunkMetaData {
    /// The column's path within the schema
    pub fn column_path(&self) -> Option<ColumnPath> {
        if let Some(meta) = &self.meta_data {
            return Some(ColumnPath::new(meta.path_in_schema.clone()));
        }
        match &self.crypto_metadata {
            Some(ColumnCryptoMetaData::EncryptionWithColumnKey { path_in_schema, .. }) => {
                Some(ColumnPath::new(path_in_schema.clone()))
            }
            _ => None,
        }
    }

    /// Resolved column metadata; fails on columns whose key was inaccessible
    pub fn meta_data(&self) -> Result<&ColumnMetaData> {
        self.meta_data.as_ref().ok_or_else(|| {
            let path = self
                .column_path()
                .map(|p| p.string())
                .unwrap_or_else(|| "<unknown>".to_owned());
            ParquetError::HiddenColumn { path }
        })
    }

    /// Whether the chunk starts with a dictionary page
    pub fn has_dictionary_page(&self) -> bool {
        self.meta_data
            .as_ref()
            .is_some_and(|m| m.dictionary_page_offset.is_some())
    }
}

/// Metadata of one row group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowGroupMetaData {
    /// The column chunks of this row group, in schema order
    pub columns: Vec<ColumnChunkMetaData>,
    /// Total byte size of all uncompressed column data
    pub total_byte_size: i64,
    /// Number of rows in this row group
    pub num_rows: i64,
    /// Ordinal of this row group within the file
    pub ordinal: i16,
}

impl RowGroupMetaData {
    /// Number of column chunks
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns the metadata of the column chunk with the given ordinal
    pub fn column(&self, i: usize) -> Result<&ColumnChunkMetaData> {
        self.columns
            .get(i)
            .ok_or_else(|| general_err!("column ordinal {} out of bounds ({})", i, self.columns.len()))
    }
}

/// Header of a single page, stored before the page payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageHeader {
    /// The kind of page that follows
    pub page_type: PageType,
    /// Payload size before compression and encryption
    pub uncompressed_page_size: i32,
    /// Payload size as stored, including encryption framing
    pub compressed_page_size: i32,
    /// Number of values in the page
    pub num_values: i32,
}

/// File-level metadata, the root of the metadata tree stored in the footer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetaData {
    /// Format version
    pub version: i32,
    /// Total number of rows across all row groups
    pub num_rows: i64,
    /// Application that wrote the file, e.g. `parquet-mr version 1.2.9`
    pub created_by: Option<String>,
    /// The file's flattened schema
    pub schema_descr: SchemaDescriptor,
    /// Metadata of all row groups
    pub row_groups: Vec<RowGroupMetaData>,
    /// Present in plaintext footers of files with encrypted columns, and in
    /// signed plaintext footers
    pub encryption_algorithm: Option<EncryptionAlgorithm>,
    /// Key metadata of the footer signing key
    pub footer_signing_key_metadata: Option<Vec<u8>>,
}

/// Version of the application that wrote a file, parsed from `created_by`
/// strings of the form `application version x.y.z (build ...)`
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplicationVersion {
    /// Application name, e.g. `parquet-mr`
    pub application: String,
    /// Parsed `(major, minor, patch)` triple; None when unparseable
    pub version: Option<(u32, u32, u32)>,
}

impl ApplicationVersion {
    /// Parses a `created_by` string. Unknown or unparseable strings yield a
    /// version of None, which compares as older than everything.
    pub fn parse(created_by: Option<&str>) -> Self {
        let Some(created_by) = created_by else {
            return Self::default();
        };
        let mut parts = created_by.splitn(2, " version ");
        let application = parts.next().unwrap_or_default().trim().to_owned();
        let version = parts.next().and_then(|rest| {
            let version_str = rest.split_whitespace().next()?;
            // Drop any -SNAPSHOT/+build suffix of the last component
            let version_str = version_str
                .split(|c| c == '-' || c == '+')
                .next()
                .unwrap_or_default();
            let mut numbers = version_str.split('.');
            let major = numbers.next()?.parse().ok()?;
            let minor = numbers.next()?.parse().ok()?;
            let patch = numbers.next()?.parse().ok()?;
            Some((major, minor, patch))
        });
        Self {
            application,
            version,
        }
    }

    /// Whether this version is older than the given triple. Unparseable
    /// versions count as older.
    pub fn version_lt(&self, major: u32, minor: u32, patch: u32) -> bool {
        match self.version {
            None => true,
            Some(version) => version < (major, minor, patch),
        }
    }

    /// parquet-mr below 1.2.9 did not account for the dictionary page header
    /// in `total_compressed_size`; readers pad the column chunk range to
    /// compensate. Files from other writers are unaffected.
    pub fn has_missing_dictionary_header_size_bug(&self) -> bool {
        self.application == "parquet-mr" && self.version_lt(1, 2, 9)
    }
}

/// The resolved metadata of one file read session
pub struct ParquetMetaData {
    file_metadata: FileMetaData,
    writer_version: ApplicationVersion,
    file_decryptor: Option<FileDecryptor>,
    // Column keys materialized during resolution, shared by all page readers
    // of this session
    column_keys: HashMap<ColumnPath, Vec<u8>>,
    // Columns whose keys were inaccessible, by (row group, column) ordinal
    hidden_columns: HashMap<(usize, usize), ColumnPath>,
}

impl std::fmt::Debug for ParquetMetaData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetMetaData")
            .field("file_metadata", &self.file_metadata)
            .field("hidden_columns", &self.hidden_columns)
            .finish()
    }
}

impl ParquetMetaData {
    /// Resolves decoded file metadata into the in-memory view: decrypts
    /// per-column metadata, materializes column keys, and records hidden
    /// columns whose keys are denied.
    pub(crate) fn resolve(
        mut file_metadata: FileMetaData,
        file_decryptor: Option<FileDecryptor>,
        codec: &dyn MetadataCodec,
    ) -> Result<Self> {
        let writer_version = ApplicationVersion::parse(file_metadata.created_by.as_deref());
        let mut column_keys: HashMap<ColumnPath, Vec<u8>> = HashMap::new();
        let mut hidden_columns: HashMap<(usize, usize), ColumnPath> = HashMap::new();

        for (rg_idx, row_group) in file_metadata.row_groups.iter_mut().enumerate() {
            let row_group_ordinal = ordinal(rg_idx, "row group")?;
            for (col_idx, column) in row_group.columns.iter_mut().enumerate() {
                let column_ordinal = ordinal(col_idx, "column")?;
                match &column.crypto_metadata {
                    None => {
                        if column.meta_data.is_none() {
                            return Err(general_err!(
                                "column chunk {} of row group {} has neither plain nor encrypted metadata",
                                col_idx,
                                rg_idx
                            ));
                        }
                    }
                    Some(ColumnCryptoMetaData::EncryptionWithFooterKey) => {
                        if column.meta_data.is_some() {
                            continue;
                        }
                        let decryptor = required_decryptor(&file_decryptor)?;
                        let encrypted = required_encrypted_metadata(column, rg_idx, col_idx)?;
                        let aad = create_module_aad(
                            decryptor.file_aad(),
                            ModuleType::ColumnMetaData,
                            row_group_ordinal,
                            column_ordinal,
                            0,
                        );
                        let plain = decryptor.footer_decryptor().decrypt(encrypted, &aad)?;
                        column.meta_data = Some(codec.decode_column_metadata(&plain)?);
                    }
                    Some(ColumnCryptoMetaData::EncryptionWithColumnKey {
                        path_in_schema,
                        key_metadata,
                    }) => {
                        let decryptor = required_decryptor(&file_decryptor)?;
                        let column_path = ColumnPath::new(path_in_schema.clone());

                        let column_key = match resolve_column_key(
                            decryptor,
                            &column_path,
                            key_metadata.as_deref(),
                            &column_keys,
                        )? {
                            Some(key) => key,
                            None => {
                                // Encrypted, but the key is unavailable: the
                                // column stays hidden and the rest of the
                                // file remains readable
                                hidden_columns.insert((rg_idx, col_idx), column_path);
                                continue;
                            }
                        };

                        if column.meta_data.is_none() {
                            let encrypted = required_encrypted_metadata(column, rg_idx, col_idx)?;
                            let aad = create_module_aad(
                                decryptor.file_aad(),
                                ModuleType::ColumnMetaData,
                                row_group_ordinal,
                                column_ordinal,
                                0,
                            );
                            let (metadata_decryptor, _) = decryptor.column_decryptors(&column_key)?;
                            let plain = metadata_decryptor.decrypt(encrypted, &aad)?;
                            column.meta_data = Some(codec.decode_column_metadata(&plain)?);
                        }
                        column_keys.insert(column_path, column_key);
                    }
                }
            }
        }

        Ok(Self {
            file_metadata,
            writer_version,
            file_decryptor,
            column_keys,
            hidden_columns,
        })
    }

    /// File-level metadata
    pub fn file_metadata(&self) -> &FileMetaData {
        &self.file_metadata
    }

    /// The file's flattened schema
    pub fn schema_descr(&self) -> &SchemaDescriptor {
        &self.file_metadata.schema_descr
    }

    /// Version of the application that wrote the file
    pub fn writer_version(&self) -> &ApplicationVersion {
        &self.writer_version
    }

    /// Number of row groups
    pub fn num_row_groups(&self) -> usize {
        self.file_metadata.row_groups.len()
    }

    /// Metadata of the row group with the given ordinal
    pub fn row_group(&self, i: usize) -> Result<&RowGroupMetaData> {
        self.file_metadata.row_groups.get(i).ok_or_else(|| {
            general_err!(
                "row group ordinal {} out of bounds ({})",
                i,
                self.file_metadata.row_groups.len()
            )
        })
    }

    /// The path of a hidden column, if the given column is hidden
    pub fn hidden_column(&self, row_group_idx: usize, column_idx: usize) -> Option<&ColumnPath> {
        self.hidden_columns.get(&(row_group_idx, column_idx))
    }

    pub(crate) fn file_decryptor(&self) -> Option<&FileDecryptor> {
        self.file_decryptor.as_ref()
    }

    pub(crate) fn column_key(&self, column_path: &ColumnPath) -> Option<&Vec<u8>> {
        self.column_keys.get(column_path)
    }
}

fn ordinal(index: usize, what: &str) -> Result<u16> {
    u16::try_from(index)
        .map_err(|_| general_err!("encrypted files cannot have more than 65535 {}s", what))
}

fn required_decryptor(file_decryptor: &Option<FileDecryptor>) -> Result<&FileDecryptor> {
    file_decryptor.as_ref().ok_or_else(|| {
        general_err!("cannot decrypt column metadata without file decryption properties")
    })
}

fn required_encrypted_metadata<'a>(
    column: &'a ColumnChunkMetaData,
    rg_idx: usize,
    col_idx: usize,
) -> Result<&'a Vec<u8>> {
    column.encrypted_column_metadata.as_ref().ok_or_else(|| {
        general_err!(
            "encrypted column chunk {} of row group {} is missing its encrypted metadata",
            col_idx,
            rg_idx
        )
    })
}

/// Resolution order for column keys: explicit per-path overrides, then the
/// session's column-key cache, then the key retriever. A denied key yields
/// `None` rather than an error.
fn resolve_column_key(
    decryptor: &FileDecryptor,
    column_path: &ColumnPath,
    key_metadata: Option<&[u8]>,
    column_keys: &HashMap<ColumnPath, Vec<u8>>,
) -> Result<Option<Vec<u8>>> {
    let properties = decryptor.properties();
    let path_string = column_path.string();
    if let Some(key) = properties.explicit_column_key(&path_string) {
        return Ok(Some(key.clone()));
    }
    if let Some(key) = column_keys.get(column_path) {
        return Ok(Some(key.clone()));
    }
    if key_metadata.is_some() && properties.has_key_retriever() {
        return match properties.column_key(&path_string, key_metadata) {
            Ok(key) => Ok(Some(key.into_owned())),
            Err(ParquetError::KeyAccessDenied(_)) => Ok(None),
            Err(e) => Err(e),
        };
    }
    Ok(None)
}
