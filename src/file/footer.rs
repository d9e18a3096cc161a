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

//! Reading the file trailer and footer.
//!
//! The trailer is 8 bytes: `metadata_len (4 LE) || magic (4)`. `PAR1` marks a
//! plaintext footer (of an unencrypted file, or a signed one when columns are
//! encrypted); `PARE` marks an encrypted footer preceded by its
//! `FileCryptoMetaData`. A 64 KiB read-ahead from the end of the file avoids
//! a second read for ordinary footers.

use bytes::Bytes;

use crate::encryption::ciphers::BlockDecryptor;
use crate::encryption::decrypt::{
    FileDecryptionProperties, FileDecryptor, FOOTER_SIGNATURE_LEN,
};
use crate::encryption::modules::create_footer_aad;
use crate::errors::{ParquetError, Result};
use crate::file::metadata::{EncryptionAlgorithm, ParquetMetaData};
use crate::file::properties::ReaderProperties;
use crate::file::reader::ChunkReader;
use crate::file::{FOOTER_SIZE, PARQUET_MAGIC, PARQUET_MAGIC_ENCRYPTED_FOOTER};

// Minimize footer reads by reading 64 KiB from the end of the file
const DEFAULT_FOOTER_READ_SIZE: u64 = 64 * 1024;

/// Whether a trailer announces a plaintext or an encrypted footer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FooterKind {
    /// `PAR1`: plaintext footer, possibly signed
    Plaintext,
    /// `PARE`: footer encrypted with the footer key
    EncryptedFooter,
}

/// Decodes the 8-byte trailer, returning the metadata length and the footer
/// kind
pub fn decode_trailer(trailer: &[u8; FOOTER_SIZE]) -> Result<(usize, FooterKind)> {
    let kind = if trailer[4..] == PARQUET_MAGIC {
        FooterKind::Plaintext
    } else if trailer[4..] == PARQUET_MAGIC_ENCRYPTED_FOOTER {
        FooterKind::EncryptedFooter
    } else {
        return Err(ParquetError::BadMagic(trailer[4..].try_into().unwrap()));
    };
    let metadata_len = u32::from_le_bytes(trailer[..4].try_into().unwrap()) as usize;
    Ok((metadata_len, kind))
}

/// Reads and resolves the metadata of a file from its trailer.
///
/// All metadata resolution happens here, eagerly: footer decryption or
/// signature verification, AAD prefix policy, and per-column metadata
/// decryption. Columns whose keys are denied are recorded as hidden rather
/// than failing the open.
pub fn parse_metadata<R: ChunkReader>(
    chunk_reader: &R,
    properties: &ReaderProperties,
) -> Result<ParquetMetaData> {
    let file_size = chunk_reader.len();
    if file_size < FOOTER_SIZE as u64 {
        return Err(ParquetError::Truncated { file_size });
    }

    let footer_read_size = file_size.min(DEFAULT_FOOTER_READ_SIZE);
    let tail = chunk_reader.get_bytes(file_size - footer_read_size, footer_read_size as usize)?;

    let trailer: &[u8; FOOTER_SIZE] = tail[tail.len() - FOOTER_SIZE..].try_into().unwrap();
    let (metadata_len, kind) = decode_trailer(trailer)?;

    if (FOOTER_SIZE + metadata_len) as u64 > file_size {
        return Err(ParquetError::ShortMetadata {
            metadata_len: metadata_len as u64,
            file_size,
        });
    }

    // The tail window usually contains the whole footer already
    let metadata: Bytes = if footer_read_size as usize >= FOOTER_SIZE + metadata_len {
        tail.slice(tail.len() - FOOTER_SIZE - metadata_len..tail.len() - FOOTER_SIZE)
    } else {
        let metadata_start = file_size - (FOOTER_SIZE + metadata_len) as u64;
        chunk_reader.get_bytes(metadata_start, metadata_len)?
    };

    match kind {
        FooterKind::Plaintext => decode_plaintext_footer(&metadata, properties),
        FooterKind::EncryptedFooter => decode_encrypted_footer(&metadata, properties),
    }
}

fn decode_plaintext_footer(buf: &[u8], properties: &ReaderProperties) -> Result<ParquetMetaData> {
    let codec = properties.codec();
    let (file_metadata, consumed) = codec.decode_file_metadata(buf)?;

    let Some(algorithm) = file_metadata.encryption_algorithm.clone() else {
        // Unencrypted file
        return ParquetMetaData::resolve(file_metadata, None, codec.as_ref());
    };

    let decryption_properties = properties.file_decryption_properties().ok_or_else(|| {
        ParquetError::NoFooterKey(
            "file has encrypted columns but no decryption properties were provided".to_string(),
        )
    })?;

    let (aad_prefix, aad_file_unique) = resolve_file_aad(&algorithm, decryption_properties)?;
    let decryptor = footer_decryptor(
        decryption_properties,
        file_metadata.footer_signing_key_metadata.as_deref(),
        aad_prefix,
        aad_file_unique,
        &algorithm,
    )?;

    if decryption_properties.check_plaintext_footer_integrity() {
        if buf.len() - consumed != FOOTER_SIGNATURE_LEN {
            return Err(ParquetError::AuthenticationFailed(
                "plaintext footer without a footer signature".to_string(),
            ));
        }
        decryptor.verify_plaintext_footer_signature(&buf[..consumed + FOOTER_SIGNATURE_LEN])?;
    }

    ParquetMetaData::resolve(file_metadata, Some(decryptor), codec.as_ref())
}

fn decode_encrypted_footer(buf: &[u8], properties: &ReaderProperties) -> Result<ParquetMetaData> {
    let codec = properties.codec();
    let decryption_properties = properties.file_decryption_properties().ok_or_else(|| {
        ParquetError::NoFooterKey(
            "file has an encrypted footer but no decryption properties were provided".to_string(),
        )
    })?;

    let (file_crypto_metadata, consumed) = codec.decode_file_crypto_metadata(buf)?;
    let algorithm = &file_crypto_metadata.encryption_algorithm;

    let (aad_prefix, aad_file_unique) = resolve_file_aad(algorithm, decryption_properties)?;
    let decryptor = footer_decryptor(
        decryption_properties,
        file_crypto_metadata.key_metadata.as_deref(),
        aad_prefix,
        aad_file_unique,
        algorithm,
    )?;

    let footer_aad = create_footer_aad(decryptor.file_aad());
    let plaintext_metadata = decryptor
        .footer_decryptor()
        .decrypt(&buf[consumed..], &footer_aad)
        .map_err(|e| match e {
            ParquetError::AuthenticationFailed(_) => {
                ParquetError::AuthenticationFailed("file footer".to_string())
            }
            e => e,
        })?;

    let (file_metadata, _) = codec.decode_file_metadata(&plaintext_metadata)?;
    ParquetMetaData::resolve(file_metadata, Some(decryptor), codec.as_ref())
}

fn footer_decryptor(
    decryption_properties: &std::sync::Arc<FileDecryptionProperties>,
    footer_key_metadata: Option<&[u8]>,
    aad_prefix: Vec<u8>,
    aad_file_unique: Vec<u8>,
    algorithm: &EncryptionAlgorithm,
) -> Result<FileDecryptor> {
    FileDecryptor::new(
        decryption_properties,
        footer_key_metadata,
        aad_prefix,
        aad_file_unique,
        algorithm.cipher,
    )
    .map_err(|e| match e {
        ParquetError::KeyAccessDenied(key_id) => {
            ParquetError::NoFooterKey(format!("access to footer key '{key_id}' denied"))
        }
        e => e,
    })
}

/// Applies the AAD prefix policy and returns the `(prefix, file_unique)`
/// halves of the file AAD.
///
/// If the file declares `supply_aad_prefix`, the reader must be configured
/// with a prefix. If both the file and the reader carry a prefix they must be
/// byte-equal. An optional verifier hook may reject the effective prefix.
fn resolve_file_aad(
    algorithm: &EncryptionAlgorithm,
    decryption_properties: &FileDecryptionProperties,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let supplied_prefix = decryption_properties.aad_prefix();
    let stored_prefix = algorithm.aad_prefix.as_ref();

    let effective_prefix: Vec<u8> = if algorithm.supply_aad_prefix {
        match supplied_prefix {
            None => return Err(ParquetError::AadPrefixMissing),
            Some(prefix) => prefix.clone(),
        }
    } else {
        match (stored_prefix, supplied_prefix) {
            (Some(stored), Some(supplied)) if stored != supplied => {
                return Err(ParquetError::AadPrefixMismatch)
            }
            (None, Some(_)) => return Err(ParquetError::AadPrefixMismatch),
            (Some(stored), _) => stored.clone(),
            (None, None) => Vec::new(),
        }
    };

    if let Some(verifier) = decryption_properties.aad_prefix_verifier() {
        if !effective_prefix.is_empty() {
            verifier.verify(&effective_prefix)?;
        }
    }

    Ok((effective_prefix, algorithm.aad_file_unique.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::ParquetCipher;
    use crate::codec::{JsonMetadataCodec, MetadataCodec};
    use crate::file::metadata::FileMetaData;
    use crate::schema::types::SchemaDescriptor;

    fn empty_file_metadata() -> FileMetaData {
        FileMetaData {
            version: 1,
            num_rows: 0,
            created_by: None,
            schema_descr: SchemaDescriptor::new(vec![]),
            row_groups: vec![],
            encryption_algorithm: None,
            footer_signing_key_metadata: None,
        }
    }

    #[test]
    fn test_parse_metadata_smaller_than_trailer() {
        let data = Bytes::from_static(b"PAR1");
        let err = parse_metadata(&data, &ReaderProperties::default()).unwrap_err();
        assert!(matches!(err, ParquetError::Truncated { file_size: 4 }));
    }

    #[test]
    fn test_parse_metadata_corrupt_magic() {
        let data = Bytes::from(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let err = parse_metadata(&data, &ReaderProperties::default()).unwrap_err();
        assert!(matches!(err, ParquetError::BadMagic(_)));
    }

    #[test]
    fn test_parse_metadata_length_exceeds_file() {
        let data = Bytes::from(vec![255, 0, 0, 0, b'P', b'A', b'R', b'1']);
        let err = parse_metadata(&data, &ReaderProperties::default()).unwrap_err();
        assert!(matches!(
            err,
            ParquetError::ShortMetadata {
                metadata_len: 255,
                file_size: 8
            }
        ));
    }

    #[test]
    fn test_parse_plaintext_metadata() {
        let codec = JsonMetadataCodec;
        let encoded = codec.encode_file_metadata(&empty_file_metadata()).unwrap();

        let mut file = encoded.clone();
        file.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        file.extend_from_slice(&PARQUET_MAGIC);

        let metadata = parse_metadata(&Bytes::from(file), &ReaderProperties::default()).unwrap();
        assert_eq!(metadata.num_row_groups(), 0);
        assert_eq!(metadata.file_metadata().version, 1);
    }

    #[test]
    fn test_encrypted_footer_without_properties() {
        let data = Bytes::from(vec![0, 0, 0, 0, b'P', b'A', b'R', b'E']);
        let err = parse_metadata(&data, &ReaderProperties::default()).unwrap_err();
        assert!(matches!(err, ParquetError::NoFooterKey(_)));
    }

    #[test]
    fn test_aad_prefix_policy() {
        let algorithm = |stored: Option<&[u8]>, supply: bool| EncryptionAlgorithm {
            cipher: ParquetCipher::AesGcmV1,
            aad_prefix: stored.map(|p| p.to_vec()),
            aad_file_unique: b"unique00".to_vec(),
            supply_aad_prefix: supply,
        };
        let props_with_prefix = |prefix: Option<&[u8]>| {
            let builder = FileDecryptionProperties::builder(vec![0u8; 16]);
            match prefix {
                Some(prefix) => builder.with_aad_prefix(prefix.to_vec()),
                None => builder,
            }
            .build()
            .unwrap()
        };

        // Prefix stored in the file
        let (prefix, unique) =
            resolve_file_aad(&algorithm(Some(b"pre"), false), &props_with_prefix(None)).unwrap();
        assert_eq!(prefix, b"pre");
        assert_eq!(unique, b"unique00");

        // Prefix must be supplied but is not configured
        let err =
            resolve_file_aad(&algorithm(None, true), &props_with_prefix(None)).unwrap_err();
        assert!(matches!(err, ParquetError::AadPrefixMissing));

        // Supplied prefix fills in when the file stores none
        let (prefix, _) =
            resolve_file_aad(&algorithm(None, true), &props_with_prefix(Some(b"pre"))).unwrap();
        assert_eq!(prefix, b"pre");

        // Stored and supplied prefixes must agree
        let err = resolve_file_aad(
            &algorithm(Some(b"pre"), false),
            &props_with_prefix(Some(b"other")),
        )
        .unwrap_err();
        assert!(matches!(err, ParquetError::AadPrefixMismatch));
    }
}
