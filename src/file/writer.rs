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

//! Writing files: the symmetric half of the encryption envelope.
//!
//! The writer takes pre-encoded page payloads (value encoding and compression
//! happen outside this crate), encrypts modules as configured, and produces
//! the three trailer layouts: plain, signed plaintext footer, and encrypted
//! footer.

use std::io::Write;
use std::sync::Arc;

use crate::basic::{Encoding, PageType};
use crate::encryption::ciphers::{
    random_nonce, signed_footer_encrypt, BlockEncryptor, NONCE_LEN, SIZE_LEN, TAG_LEN,
};
use crate::encryption::encrypt::FileEncryptor;
use crate::encryption::modules::{create_footer_aad, create_module_aad, ModuleType};
use crate::errors::Result;
use crate::file::metadata::{
    ColumnChunkMetaData, ColumnCryptoMetaData, ColumnMetaData, FileCryptoMetaData, FileMetaData,
    PageHeader, RowGroupMetaData,
};
use crate::file::properties::{WriterProperties, WriterPropertiesPtr};
use crate::file::{PARQUET_MAGIC, PARQUET_MAGIC_ENCRYPTED_FOOTER};
use crate::schema::types::SchemaDescriptor;

/// A sink that tracks the number of bytes written through it
pub struct TrackedWrite<W: Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> TrackedWrite<W> {
    /// Wraps a sink
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<W: Write> Write for TrackedWrite<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes_written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// One pre-encoded page payload
pub struct PagePayload {
    /// Number of values in the page
    pub num_values: i32,
    /// Encoded (and, per writer properties, compressed) page bytes
    pub bytes: Vec<u8>,
}

/// The pages of one column chunk to be written
pub struct ColumnChunkPages {
    /// Optional dictionary page, written first
    pub dictionary_page: Option<PagePayload>,
    /// Data pages in row order
    pub data_pages: Vec<PagePayload>,
}

/// Writes the Parquet file structure: magic, column chunks, footer, trailer
pub struct SerializedFileWriter<W: Write> {
    sink: TrackedWrite<W>,
    schema: SchemaDescriptor,
    properties: WriterPropertiesPtr,
    file_encryptor: Option<FileEncryptor>,
    row_groups: Vec<RowGroupMetaData>,
    num_rows: i64,
    closed: bool,
}

impl<W: Write> SerializedFileWriter<W> {
    /// Creates a writer over the given sink, writing the leading magic
    pub fn new(sink: W, schema: SchemaDescriptor, properties: WriterProperties) -> Result<Self> {
        let file_encryptor = match properties.file_encryption_properties() {
            Some(encryption_properties) => Some(FileEncryptor::new(Arc::new(
                encryption_properties.clone(),
            ))?),
            None => None,
        };

        let mut sink = TrackedWrite::new(sink);
        match &file_encryptor {
            Some(encryptor) if encryptor.properties().encrypt_footer() => {
                sink.write_all(&PARQUET_MAGIC_ENCRYPTED_FOOTER)?
            }
            _ => sink.write_all(&PARQUET_MAGIC)?,
        }

        Ok(Self {
            sink,
            schema,
            properties: Arc::new(properties),
            file_encryptor,
            row_groups: Vec::new(),
            num_rows: 0,
            closed: false,
        })
    }

    /// Appends one row group, one [`ColumnChunkPages`] per leaf column in
    /// schema order
    pub fn write_row_group(&mut self, columns: Vec<ColumnChunkPages>) -> Result<()> {
        if self.closed {
            return Err(general_err!("cannot write a row group to a closed writer"));
        }
        if columns.len() != self.schema.num_columns() {
            return Err(general_err!(
                "row group has {} columns but the schema has {}",
                columns.len(),
                self.schema.num_columns()
            ));
        }
        let row_group_ordinal = u16::try_from(self.row_groups.len())
            .map_err(|_| general_err!("files cannot have more than 65535 row groups"))?;

        let mut column_chunks = Vec::with_capacity(columns.len());
        let mut row_group_num_rows = 0i64;
        let mut total_byte_size = 0i64;

        for (column_idx, pages) in columns.into_iter().enumerate() {
            let chunk = self.write_column_chunk(
                row_group_ordinal,
                u16::try_from(column_idx)
                    .map_err(|_| general_err!("files cannot have more than 65535 columns"))?,
                pages,
            )?;
            let meta = chunk
                .meta_data
                .as_ref()
                .or(chunk.written_meta.as_ref())
                .expect("written chunk always has metadata");
            row_group_num_rows = row_group_num_rows.max(meta.num_values);
            total_byte_size += meta.total_uncompressed_size;
            column_chunks.push(ColumnChunkMetaData {
                file_offset: chunk.file_offset,
                meta_data: chunk.meta_data,
                crypto_metadata: chunk.crypto_metadata,
                encrypted_column_metadata: chunk.encrypted_column_metadata,
            });
        }

        self.num_rows += row_group_num_rows;
        self.row_groups.push(RowGroupMetaData {
            columns: column_chunks,
            total_byte_size,
            num_rows: row_group_num_rows,
            ordinal: row_group_ordinal as i16,
        });
        Ok(())
    }

    fn write_column_chunk(
        &mut self,
        row_group_ordinal: u16,
        column_ordinal: u16,
        pages: ColumnChunkPages,
    ) -> Result<WrittenChunk> {
        let column = self.schema.column(column_ordinal as usize)?;
        let physical_type = column.physical_type();
        let column_path = column.path().clone();
        let path_string = column_path.string();

        let encryptors = match &self.file_encryptor {
            Some(encryptor) => encryptor.column_encryptors(&path_string)?,
            None => None,
        };
        let file_aad = self
            .file_encryptor
            .as_ref()
            .map(|e| e.file_aad().to_vec())
            .unwrap_or_default();

        let col_start = self.sink.bytes_written() as i64;
        let mut total_uncompressed_size = 0i64;
        let mut num_values = 0i64;
        let mut page_ordinal: u16 = 0;

        let dictionary_page_offset = match pages.dictionary_page {
            None => None,
            Some(dictionary) => {
                let offset = self.sink.bytes_written() as i64;
                total_uncompressed_size += self.write_page(
                    PageType::DictionaryPage,
                    &dictionary,
                    &encryptors,
                    &file_aad,
                    row_group_ordinal,
                    column_ordinal,
                    page_ordinal,
                )?;
                page_ordinal += 1;
                Some(offset)
            }
        };

        let data_page_offset = self.sink.bytes_written() as i64;
        for page in &pages.data_pages {
            total_uncompressed_size += self.write_page(
                PageType::DataPage,
                page,
                &encryptors,
                &file_aad,
                row_group_ordinal,
                column_ordinal,
                page_ordinal,
            )?;
            page_ordinal = page_ordinal
                .checked_add(1)
                .ok_or_else(|| general_err!("column chunk has more than 65535 pages"))?;
            num_values += page.num_values as i64;
        }

        let total_compressed_size = self.sink.bytes_written() as i64 - col_start;
        let meta = ColumnMetaData {
            physical_type,
            encodings: vec![Encoding::Plain],
            path_in_schema: column_path.parts().to_vec(),
            codec: self.properties.compression(),
            num_values,
            total_uncompressed_size,
            total_compressed_size,
            data_page_offset,
            dictionary_page_offset,
        };

        let crypto_metadata = self
            .file_encryptor
            .as_ref()
            .and_then(|e| e.column_crypto_metadata(&path_string));

        // Columns with their own key store their metadata encrypted
        let (meta_data, written_meta, encrypted_column_metadata) = match &crypto_metadata {
            Some(ColumnCryptoMetaData::EncryptionWithColumnKey { .. }) => {
                let (metadata_encryptor, _) = encryptors
                    .as_ref()
                    .expect("column-keyed column always has encryptors");
                let encoded = self.properties.codec().encode_column_metadata(&meta)?;
                let aad = create_module_aad(
                    &file_aad,
                    ModuleType::ColumnMetaData,
                    row_group_ordinal,
                    column_ordinal,
                    0,
                );
                let encrypted = metadata_encryptor.encrypt(&encoded, &aad)?;
                (None, Some(meta), Some(encrypted))
            }
            _ => (Some(meta), None, None),
        };

        Ok(WrittenChunk {
            file_offset: col_start,
            meta_data,
            written_meta,
            crypto_metadata,
            encrypted_column_metadata,
        })
    }

    /// Writes one page (header then payload), returning the plaintext byte
    /// count that contributes to `total_uncompressed_size`
    #[allow(clippy::too_many_arguments)]
    fn write_page(
        &mut self,
        page_type: PageType,
        page: &PagePayload,
        encryptors: &Option<(Arc<dyn BlockEncryptor>, Arc<dyn BlockEncryptor>)>,
        file_aad: &[u8],
        row_group_ordinal: u16,
        column_ordinal: u16,
        page_ordinal: u16,
    ) -> Result<i64> {
        let codec = self.properties.codec().clone();

        let (payload_module, header_module) = match page_type {
            PageType::DataPage => (ModuleType::DataPage, ModuleType::DataPageHeader),
            PageType::DictionaryPage => {
                (ModuleType::DictionaryPage, ModuleType::DictionaryPageHeader)
            }
        };

        let stored_payload = match encryptors {
            Some((_, data_encryptor)) => {
                let aad = create_module_aad(
                    file_aad,
                    payload_module,
                    row_group_ordinal,
                    column_ordinal,
                    page_ordinal,
                );
                data_encryptor.encrypt(&page.bytes, &aad)?
            }
            None => page.bytes.clone(),
        };

        let header = PageHeader {
            page_type,
            uncompressed_page_size: page.bytes.len() as i32,
            compressed_page_size: stored_payload.len() as i32,
            num_values: page.num_values,
        };
        let encoded_header = codec.encode_page_header(&header)?;

        let stored_header = match encryptors {
            Some((metadata_encryptor, _)) => {
                let aad = create_module_aad(
                    file_aad,
                    header_module,
                    row_group_ordinal,
                    column_ordinal,
                    page_ordinal,
                );
                metadata_encryptor.encrypt(&encoded_header, &aad)?
            }
            None => encoded_header.clone(),
        };

        self.sink.write_all(&stored_header)?;
        self.sink.write_all(&stored_payload)?;

        Ok((encoded_header.len() + page.bytes.len()) as i64)
    }

    /// Writes the footer and trailer and flushes the sink. Closing twice is
    /// an error.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(general_err!("file writer is already closed"));
        }
        self.closed = true;

        let codec = self.properties.codec().clone();
        let mut file_metadata = FileMetaData {
            version: 1,
            num_rows: self.num_rows,
            created_by: Some(self.properties.created_by().to_owned()),
            schema_descr: self.schema.clone(),
            row_groups: std::mem::take(&mut self.row_groups),
            encryption_algorithm: None,
            footer_signing_key_metadata: None,
        };

        let footer_start = self.sink.bytes_written();
        match &self.file_encryptor {
            None => {
                let encoded = codec.encode_file_metadata(&file_metadata)?;
                self.sink.write_all(&encoded)?;
            }
            Some(encryptor) if encryptor.properties().encrypt_footer() => {
                let properties = encryptor.properties();
                let file_crypto_metadata = FileCryptoMetaData {
                    encryption_algorithm: properties.algorithm_metadata(),
                    key_metadata: properties.footer_key_metadata().cloned(),
                };
                let encoded_crypto = codec.encode_file_crypto_metadata(&file_crypto_metadata)?;
                let encoded_metadata = codec.encode_file_metadata(&file_metadata)?;

                let footer_aad = create_footer_aad(encryptor.file_aad());
                let encrypted_metadata =
                    encryptor.footer_encryptor().encrypt(&encoded_metadata, &footer_aad)?;

                self.sink.write_all(&encoded_crypto)?;
                self.sink.write_all(&encrypted_metadata)?;
            }
            Some(encryptor) => {
                // Plaintext footer of a file with encrypted columns: the
                // serialized footer is followed by its nonce and tag.
                let properties = encryptor.properties();
                file_metadata.encryption_algorithm = Some(properties.algorithm_metadata());
                file_metadata.footer_signing_key_metadata =
                    properties.footer_key_metadata().cloned();

                let encoded = codec.encode_file_metadata(&file_metadata)?;
                let footer_aad = create_footer_aad(encryptor.file_aad());
                let nonce = random_nonce();
                let encrypted = signed_footer_encrypt(
                    &encoded,
                    properties.footer_key(),
                    &footer_aad,
                    &nonce,
                )?;

                self.sink.write_all(&encoded)?;
                self.sink
                    .write_all(&encrypted[SIZE_LEN..SIZE_LEN + NONCE_LEN])?;
                self.sink.write_all(&encrypted[encrypted.len() - TAG_LEN..])?;
            }
        }

        let metadata_len = self.sink.bytes_written() - footer_start;
        let metadata_len = u32::try_from(metadata_len)
            .map_err(|_| general_err!("footer of {} bytes exceeds the trailer limit", metadata_len))?;
        self.sink.write_all(&metadata_len.to_le_bytes())?;
        match &self.file_encryptor {
            Some(encryptor) if encryptor.properties().encrypt_footer() => {
                self.sink.write_all(&PARQUET_MAGIC_ENCRYPTED_FOOTER)?
            }
            _ => self.sink.write_all(&PARQUET_MAGIC)?,
        }
        self.sink.flush()?;
        Ok(())
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.sink.bytes_written()
    }
}

impl<W: Write> Drop for SerializedFileWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            // The file is incomplete without its trailer; drop without close
            // leaves a truncated file, matching the behavior of aborting a
            // write.
            let _ = self.sink.flush();
        }
    }
}

struct WrittenChunk {
    file_offset: i64,
    meta_data: Option<ColumnMetaData>,
    // The plaintext metadata of column-keyed columns, kept for row-group
    // accounting after redaction
    written_meta: Option<ColumnMetaData>,
    crypto_metadata: Option<ColumnCryptoMetaData>,
    encrypted_column_metadata: Option<Vec<u8>>,
}
