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

//! The metadata wire-codec seam.
//!
//! The Parquet metadata structures are stored in Thrift compact protocol;
//! that codec is a collaborator outside this crate. The core invokes it
//! through [`MetadataCodec`] with caller-supplied buffers (post-decryption
//! for encrypted modules). Decoders report the number of bytes consumed:
//! self-delimiting decode is required where the metadata is followed by other
//! bytes, such as the 28-byte signature of signed plaintext footers.
//!
//! [`JsonMetadataCodec`] is the built-in implementation used by default and
//! in tests; it frames each structure as `length (4 LE) || JSON`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{ParquetError, Result};
use crate::file::metadata::{ColumnMetaData, FileCryptoMetaData, FileMetaData, PageHeader};

/// Encodes and decodes the metadata structures of a file.
///
/// Implementations must map an unrecognized encryption-algorithm tag to
/// [`ParquetError::UnsupportedAlgorithm`].
pub trait MetadataCodec: Send + Sync {
    /// Encodes file metadata for the footer
    fn encode_file_metadata(&self, metadata: &FileMetaData) -> Result<Vec<u8>>;

    /// Decodes file metadata from the start of `buf`, returning the decoded
    /// structure and the number of bytes consumed
    fn decode_file_metadata(&self, buf: &[u8]) -> Result<(FileMetaData, usize)>;

    /// Encodes the crypto metadata preceding an encrypted footer
    fn encode_file_crypto_metadata(&self, metadata: &FileCryptoMetaData) -> Result<Vec<u8>>;

    /// Decodes crypto metadata from the start of `buf`, returning the decoded
    /// structure and the number of bytes consumed
    fn decode_file_crypto_metadata(&self, buf: &[u8]) -> Result<(FileCryptoMetaData, usize)>;

    /// Encodes the column metadata of one column chunk
    fn encode_column_metadata(&self, metadata: &ColumnMetaData) -> Result<Vec<u8>>;

    /// Decodes the column metadata of one column chunk
    fn decode_column_metadata(&self, buf: &[u8]) -> Result<ColumnMetaData>;

    /// Encodes a page header
    fn encode_page_header(&self, header: &PageHeader) -> Result<Vec<u8>>;

    /// Decodes a page header from the start of `buf`, returning the decoded
    /// header and the number of bytes consumed
    fn decode_page_header(&self, buf: &[u8]) -> Result<(PageHeader, usize)>;
}

/// The built-in self-delimiting JSON metadata codec
#[derive(Debug, Default)]
pub struct JsonMetadataCodec;

const LENGTH_PREFIX: usize = 4;

impl JsonMetadataCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value)
            .map_err(|e| general_err!("could not encode metadata: {}", e))?;
        let mut buf = Vec::with_capacity(LENGTH_PREFIX + json.len());
        buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
        buf.extend_from_slice(&json);
        Ok(buf)
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<(T, usize)> {
        if buf.len() < LENGTH_PREFIX {
            return Err(eof_err!(
                "metadata buffer of {} bytes is shorter than its length prefix",
                buf.len()
            ));
        }
        let length = u32::from_le_bytes(buf[..LENGTH_PREFIX].try_into().unwrap()) as usize;
        let end = LENGTH_PREFIX
            .checked_add(length)
            .filter(|end| *end <= buf.len())
            .ok_or_else(|| {
                eof_err!(
                    "metadata length of {} bytes exceeds buffer of {} bytes",
                    length,
                    buf.len()
                )
            })?;
        let json = &buf[LENGTH_PREFIX..end];
        let value = serde_json::from_slice(json)
            .map_err(|e| map_metadata_decode_error(json, e))?;
        Ok((value, end))
    }
}

/// Distinguishes an unknown encryption-algorithm tag from other decode
/// failures, so that such files fail with `UnsupportedAlgorithm`.
fn map_metadata_decode_error(json: &[u8], error: serde_json::Error) -> ParquetError {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(json) {
        let cipher = value
            .get("encryption_algorithm")
            .and_then(|algorithm| algorithm.get("cipher"))
            .or_else(|| value.get("cipher"));
        if let Some(cipher) = cipher {
            let known = matches!(
                cipher.as_str(),
                Some("AesGcmV1") | Some("AesGcmCtrV1")
            );
            if !known {
                return ParquetError::UnsupportedAlgorithm(cipher.to_string());
            }
        }
    }
    general_err!("could not parse metadata: {}", error)
}

impl MetadataCodec for JsonMetadataCodec {
    fn encode_file_metadata(&self, metadata: &FileMetaData) -> Result<Vec<u8>> {
        self.encode(metadata)
    }

    fn decode_file_metadata(&self, buf: &[u8]) -> Result<(FileMetaData, usize)> {
        self.decode(buf)
    }

    fn encode_file_crypto_metadata(&self, metadata: &FileCryptoMetaData) -> Result<Vec<u8>> {
        self.encode(metadata)
    }

    fn decode_file_crypto_metadata(&self, buf: &[u8]) -> Result<(FileCryptoMetaData, usize)> {
        self.decode(buf)
    }

    fn encode_column_metadata(&self, metadata: &ColumnMetaData) -> Result<Vec<u8>> {
        self.encode(metadata)
    }

    fn decode_column_metadata(&self, buf: &[u8]) -> Result<ColumnMetaData> {
        Ok(self.decode(buf)?.0)
    }

    fn encode_page_header(&self, header: &PageHeader) -> Result<Vec<u8>> {
        self.encode(header)
    }

    fn decode_page_header(&self, buf: &[u8]) -> Result<(PageHeader, usize)> {
        self.decode(buf)
    }
}
