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

//! Reading files: metadata at open, then per-column page readers.
//!
//! Value decoding and decompression live outside this crate; pages surface as
//! decrypted byte payloads together with their headers.

use bytes::Bytes;
use std::sync::Arc;

use crate::basic::PageType;
use crate::codec::MetadataCodec;
use crate::encryption::ciphers::BlockDecryptor;
use crate::encryption::decrypt::{read_and_decrypt, CryptoContext};
use crate::errors::{ParquetError, Result};
use crate::file::footer;
use crate::file::metadata::{
    ColumnCryptoMetaData, PageHeader, ParquetMetaData, RowGroupMetaData,
};
use crate::file::properties::{ReaderProperties, ReaderPropertiesPtr};
use crate::file::reader::ChunkReader;
use crate::schema::types::ColumnPath;

// PARQUET-816: parquet-mr < 1.2.9 did not count the dictionary page header
// in total_compressed_size; pad the chunk range to compensate.
const MAX_DICT_HEADER_SIZE: i64 = 100;

/// A page read from a column chunk: its header and the decrypted (but still
/// compressed) payload
#[derive(Debug, Clone)]
pub struct Page {
    /// The decoded page header
    pub header: PageHeader,
    /// The page payload, decrypted; decompression is up to the caller
    pub buf: Bytes,
}

impl Page {
    /// The kind of this page
    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    /// Number of values in this page
    pub fn num_values(&self) -> i32 {
        self.header.num_values
    }
}

/// Reads a file's metadata eagerly at construction and serves row groups.
///
/// Dropping (or [`close`](Self::close)-ing) the reader releases the byte
/// source and all materialized column keys; closing twice is a no-op.
pub struct SerializedFileReader<R: ChunkReader> {
    chunk_reader: Option<Arc<R>>,
    metadata: Arc<ParquetMetaData>,
    properties: ReaderPropertiesPtr,
}

impl<R: ChunkReader> std::fmt::Debug for SerializedFileReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedFileReader").finish_non_exhaustive()
    }
}

impl<R: ChunkReader> SerializedFileReader<R> {
    /// Opens a file with default properties
    pub fn new(chunk_reader: R) -> Result<Self> {
        Self::new_with_properties(chunk_reader, ReaderProperties::default())
    }

    /// Opens a file, resolving all metadata eagerly
    pub fn new_with_properties(chunk_reader: R, properties: ReaderProperties) -> Result<Self> {
        let metadata = footer::parse_metadata(&chunk_reader, &properties)?;
        Ok(Self {
            chunk_reader: Some(Arc::new(chunk_reader)),
            metadata: Arc::new(metadata),
            properties: Arc::new(properties),
        })
    }

    /// The resolved metadata of this file
    pub fn metadata(&self) -> &ParquetMetaData {
        &self.metadata
    }

    /// Number of row groups
    pub fn num_row_groups(&self) -> usize {
        self.metadata.num_row_groups()
    }

    /// Returns a reader over the row group with the given ordinal
    pub fn get_row_group(&self, row_group_idx: usize) -> Result<RowGroupReader<R>> {
        let chunk_reader = self
            .chunk_reader
            .as_ref()
            .ok_or_else(|| general_err!("cannot read a row group from a closed file reader"))?;
        self.metadata.row_group(row_group_idx)?;
        Ok(RowGroupReader {
            chunk_reader: chunk_reader.clone(),
            metadata: self.metadata.clone(),
            properties: self.properties.clone(),
            row_group_idx,
        })
    }

    /// Releases the byte source. Idempotent.
    pub fn close(&mut self) {
        self.chunk_reader = None;
    }
}

/// Reads the column chunks of one row group
pub struct RowGroupReader<R: ChunkReader> {
    chunk_reader: Arc<R>,
    metadata: Arc<ParquetMetaData>,
    properties: ReaderPropertiesPtr,
    row_group_idx: usize,
}

impl<R: ChunkReader> RowGroupReader<R> {
    /// Metadata of this row group
    pub fn metadata(&self) -> &RowGroupMetaData {
        // Ordinal was validated when this reader was created
        self.metadata.row_group(self.row_group_idx).unwrap()
    }

    /// Number of column chunks in this row group
    pub fn num_columns(&self) -> usize {
        self.metadata().num_columns()
    }

    /// Returns a page reader over the column chunk with the given ordinal.
    ///
    /// Fails with [`ParquetError::HiddenColumn`] if the column's key was
    /// inaccessible when the file was opened; other columns stay readable.
    pub fn get_column_page_reader(&self, column_idx: usize) -> Result<SerializedPageReader> {
        if let Some(path) = self.metadata.hidden_column(self.row_group_idx, column_idx) {
            return Err(ParquetError::HiddenColumn {
                path: path.string(),
            });
        }

        let row_group = self.metadata.row_group(self.row_group_idx)?;
        let column = row_group.column(column_idx)?;
        let column_meta = column.meta_data()?;

        let mut col_start = column_meta.data_page_offset;
        if let Some(dictionary_page_offset) = column_meta.dictionary_page_offset {
            if dictionary_page_offset < col_start {
                col_start = dictionary_page_offset;
            }
        }

        let mut col_length = column_meta.total_compressed_size;
        if self
            .metadata
            .writer_version()
            .has_missing_dictionary_header_size_bug()
        {
            let bytes_remaining = self.chunk_reader.len() as i64 - (col_start + col_length);
            let padding = bytes_remaining.clamp(0, MAX_DICT_HEADER_SIZE);
            col_length += padding;
        }

        let chunk = self
            .chunk_reader
            .get_bytes(col_start as u64, col_length as usize)?;

        let crypto_context = self.column_crypto_context(column_idx, &column.crypto_metadata)?;

        Ok(SerializedPageReader {
            buf: chunk,
            offset: 0,
            values_read: 0,
            total_num_values: column_meta.num_values,
            next_is_dictionary: column_meta.dictionary_page_offset.is_some(),
            page_ordinal: 0,
            crypto_context,
            codec: self.properties.codec().clone(),
        })
    }

    fn column_crypto_context(
        &self,
        column_idx: usize,
        crypto_metadata: &Option<ColumnCryptoMetaData>,
    ) -> Result<Option<CryptoContext>> {
        let Some(crypto_metadata) = crypto_metadata else {
            return Ok(None);
        };
        let decryptor = self.metadata.file_decryptor().ok_or_else(|| {
            general_err!("encrypted column without file decryption properties")
        })?;
        let row_group_ordinal = u16::try_from(self.row_group_idx)
            .map_err(|_| general_err!("row group ordinal out of range"))?;
        let column_ordinal = u16::try_from(column_idx)
            .map_err(|_| general_err!("column ordinal out of range"))?;

        let (metadata_decryptor, data_decryptor) = match crypto_metadata {
            ColumnCryptoMetaData::EncryptionWithFooterKey => {
                (decryptor.footer_decryptor(), decryptor.footer_data_decryptor())
            }
            ColumnCryptoMetaData::EncryptionWithColumnKey { path_in_schema, .. } => {
                let path = ColumnPath::new(path_in_schema.clone());
                let key = self.metadata.column_key(&path).ok_or_else(|| {
                    ParquetError::HiddenColumn {
                        path: path.string(),
                    }
                })?;
                decryptor.column_decryptors(key)?
            }
        };

        Ok(Some(CryptoContext::new(
            row_group_ordinal,
            column_ordinal,
            data_decryptor,
            metadata_decryptor,
            decryptor.file_aad().to_vec(),
        )))
    }
}

/// Iterates the pages of one column chunk in file order.
///
/// The page ordinal increases strictly within the chunk: the dictionary page,
/// if present, is ordinal 0 and data pages follow. Pages must not be
/// reordered or skipped, since each AAD binds a page to its position.
pub struct SerializedPageReader {
    buf: Bytes,
    offset: usize,
    values_read: i64,
    total_num_values: i64,
    next_is_dictionary: bool,
    page_ordinal: u16,
    crypto_context: Option<CryptoContext>,
    codec: Arc<dyn MetadataCodec>,
}

impl SerializedPageReader {
    /// Reads the next page of the chunk, or `None` when all values have been
    /// read
    pub fn get_next_page(&mut self) -> Result<Option<Page>> {
        if self.values_read >= self.total_num_values {
            return Ok(None);
        }

        let context = self.crypto_context.as_ref().map(|context| {
            let context = context.with_page_ordinal(self.page_ordinal);
            if self.next_is_dictionary {
                context.for_dictionary_page()
            } else {
                context
            }
        });

        let header = match &context {
            Some(context) => {
                let mut cursor = std::io::Cursor::new(&self.buf[self.offset..]);
                let plaintext = read_and_decrypt(
                    context.metadata_decryptor(),
                    &mut cursor,
                    &context.create_page_header_aad(),
                )
                .map_err(|e| page_module_error(e, "page header"))?;
                self.offset += cursor.position() as usize;
                self.codec.decode_page_header(&plaintext)?.0
            }
            None => {
                let (header, consumed) = self.codec.decode_page_header(&self.buf[self.offset..])?;
                self.offset += consumed;
                header
            }
        };

        let stored_size = header.compressed_page_size as usize;
        if self.offset + stored_size > self.buf.len() {
            return Err(eof_err!(
                "page payload of {} bytes exceeds the column chunk",
                stored_size
            ));
        }
        let stored = self.buf.slice(self.offset..self.offset + stored_size);
        self.offset += stored_size;

        let buf = match &context {
            Some(context) => Bytes::from(
                context
                    .data_decryptor()
                    .decrypt(&stored, &context.create_page_aad())
                    .map_err(|e| page_module_error(e, "page payload"))?,
            ),
            None => stored,
        };

        if header.page_type == PageType::DataPage {
            self.values_read += header.num_values as i64;
        }
        self.next_is_dictionary = false;
        self.page_ordinal = self
            .page_ordinal
            .checked_add(1)
            .ok_or_else(|| general_err!("column chunk has more than 65535 pages"))?;

        Ok(Some(Page { header, buf }))
    }
}

fn page_module_error(error: ParquetError, module: &str) -> ParquetError {
    match error {
        ParquetError::AuthenticationFailed(_) => {
            ParquetError::AuthenticationFailed(module.to_string())
        }
        e => e,
    }
}
