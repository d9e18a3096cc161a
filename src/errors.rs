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

//! Common errors and macros.
//!
//! Errors never carry key bytes, plaintext bytes or nonces; failures in the
//! crypto path reference key identifiers and column paths only.

use std::error::Error;
use std::{io, result, str};

/// Errors raised while reading, decrypting or configuring Parquet files
#[derive(Debug)]
pub enum ParquetError {
    /// The file is smaller than the 8-byte trailer
    Truncated {
        /// Observed file length in bytes
        file_size: u64,
    },
    /// The trailer magic is neither `PAR1` nor `PARE`
    BadMagic([u8; 4]),
    /// The metadata length recorded in the trailer exceeds the file length
    ShortMetadata {
        /// Metadata length recorded in the trailer
        metadata_len: u64,
        /// Observed file length in bytes
        file_size: u64,
    },
    /// The file declares an encryption algorithm this reader does not implement
    UnsupportedAlgorithm(String),
    /// An encryption key is not 128, 192 or 256 bits long
    InvalidKeyLength(usize),
    /// Key material JSON is missing fields, mistyped, or of an unknown version
    MalformedKeyMaterial(String),
    /// The `column_keys` configuration string does not follow
    /// `keyId1:colA,colB;keyId2:colC`
    MalformedColumnKeys(String),
    /// Mutually exclusive configuration options were both set
    ConfigConflict(String),
    /// A required configuration option is missing
    ConfigMissing(String),
    /// The same column appears under two different column keys
    DuplicateColumnKey(String),
    /// The footer key could not be determined
    NoFooterKey(String),
    /// The file was written with an externally supplied AAD prefix that the
    /// reader was not configured with
    AadPrefixMissing,
    /// The AAD prefix stored in the file differs from the configured one
    AadPrefixMismatch,
    /// An AEAD tag did not verify, or the plaintext footer signature does not
    /// match the footer contents
    AuthenticationFailed(String),
    /// The KMS client reported a failure
    KmsError(String),
    /// The KMS has no key with the requested master key identifier
    KeyNotFound(String),
    /// The KMS refused access to a key under the current access token
    KeyAccessDenied(String),
    /// A column is encrypted with a key the reader cannot obtain. Recoverable:
    /// other columns of the file stay readable.
    HiddenColumn {
        /// Dot-joined column path
        path: String,
    },
    /// General error, returned when code violates the normal workflow of
    /// working with Parquet files
    General(String),
    /// Returned when there are not enough bytes to decode
    EOF(String),
    /// An external error, e.g. from the byte source
    External(Box<dyn Error + Send + Sync>),
}

impl std::fmt::Display for ParquetError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self {
            ParquetError::Truncated { file_size } => {
                write!(
                    fmt,
                    "Parquet error: file size of {file_size} bytes is smaller than the file trailer"
                )
            }
            ParquetError::BadMagic(magic) => {
                write!(fmt, "Parquet error: corrupt trailer magic {magic:?}")
            }
            ParquetError::ShortMetadata {
                metadata_len,
                file_size,
            } => {
                write!(
                    fmt,
                    "Parquet error: reported metadata length of {metadata_len} bytes exceeds file of {file_size} bytes"
                )
            }
            ParquetError::UnsupportedAlgorithm(algorithm) => {
                write!(fmt, "Parquet error: unsupported encryption algorithm {algorithm}")
            }
            ParquetError::InvalidKeyLength(bits) => {
                write!(
                    fmt,
                    "Parquet error: invalid encryption key length of {bits} bits; supported lengths are 128, 192 and 256"
                )
            }
            ParquetError::MalformedKeyMaterial(message) => {
                write!(fmt, "Parquet error: malformed key material: {message}")
            }
            ParquetError::MalformedColumnKeys(message) => {
                write!(fmt, "Parquet error: malformed column keys property: {message}")
            }
            ParquetError::ConfigConflict(message) => {
                write!(fmt, "Parquet error: conflicting configuration: {message}")
            }
            ParquetError::ConfigMissing(message) => {
                write!(fmt, "Parquet error: missing configuration: {message}")
            }
            ParquetError::DuplicateColumnKey(column) => {
                write!(fmt, "Parquet error: multiple keys defined for column '{column}'")
            }
            ParquetError::NoFooterKey(message) => {
                write!(fmt, "Parquet error: no footer key: {message}")
            }
            ParquetError::AadPrefixMissing => {
                write!(
                    fmt,
                    "Parquet error: AAD prefix used for file encryption, but not stored in file and not supplied in decryption properties"
                )
            }
            ParquetError::AadPrefixMismatch => {
                write!(
                    fmt,
                    "Parquet error: AAD prefix in file and in decryption properties is not the same"
                )
            }
            ParquetError::AuthenticationFailed(module) => {
                write!(fmt, "Parquet error: authentication failed for {module}")
            }
            ParquetError::KmsError(message) => write!(fmt, "KMS error: {message}"),
            ParquetError::KeyNotFound(key_id) => {
                write!(fmt, "KMS error: key '{key_id}' not found")
            }
            ParquetError::KeyAccessDenied(key_id) => {
                write!(fmt, "KMS error: access to key '{key_id}' denied")
            }
            ParquetError::HiddenColumn { path } => {
                write!(fmt, "Parquet error: hidden column, path={path}")
            }
            ParquetError::General(message) => write!(fmt, "Parquet error: {message}"),
            ParquetError::EOF(message) => write!(fmt, "EOF: {message}"),
            ParquetError::External(e) => write!(fmt, "External: {e}"),
        }
    }
}

impl Error for ParquetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParquetError::External(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for ParquetError {
    fn from(e: io::Error) -> ParquetError {
        ParquetError::External(Box::new(e))
    }
}

impl From<str::Utf8Error> for ParquetError {
    fn from(e: str::Utf8Error) -> ParquetError {
        ParquetError::External(Box::new(e))
    }
}

/// A specialized `Result` for errors of this crate
pub type Result<T, E = ParquetError> = result::Result<T, E>;

// ----------------------------------------------------------------------
// Conversion from `ParquetError` to other types of `Error`s

impl From<ParquetError> for io::Error {
    fn from(e: ParquetError) -> Self {
        io::Error::other(e)
    }
}

// ----------------------------------------------------------------------
// Convenient macros for different errors

macro_rules! general_err {
    ($fmt:expr) => ($crate::errors::ParquetError::General($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => ($crate::errors::ParquetError::General(format!($fmt, $($args),*)));
}

macro_rules! eof_err {
    ($fmt:expr) => ($crate::errors::ParquetError::EOF($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => ($crate::errors::ParquetError::EOF(format!($fmt, $($args),*)));
}
