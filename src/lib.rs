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

//! A reader (and the matching writer surface) for the Parquet file structure
//! with full support for Parquet Modular Encryption.
//!
//! The crate covers the file trailer and footer, plaintext-footer signature
//! verification, per-module AES-GCM / AES-GCM-CTR decryption bound to
//! deterministic module AADs, and KMS-driven envelope key management with
//! single and double wrapping.
//!
//! Page *value* decoding, decompression and the metadata wire codec are
//! collaborator seams: pages surface as raw byte payloads together with a
//! per-column decryptor, and metadata structures travel through the
//! [`MetadataCodec`](codec::MetadataCodec) trait.
//!
//! # Reading an encrypted file
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use parquet_crypto::encryption::key_management::crypto_factory::{
//!     CryptoFactory, DecryptionConfiguration,
//! };
//! use parquet_crypto::encryption::key_management::kms::{
//!     InMemoryKms, KmsConnectionConfig,
//! };
//! use parquet_crypto::file::properties::ReaderProperties;
//!
//! # fn main() -> parquet_crypto::errors::Result<()> {
//! let mut master_keys = HashMap::new();
//! master_keys.insert("kf".to_owned(), b"0123456789012345".to_vec());
//!
//! let crypto_factory = CryptoFactory::new(InMemoryKms::factory(master_keys));
//! let kms_config = Arc::new(KmsConnectionConfig::default());
//! let decryption_properties = crypto_factory
//!     .file_decryption_properties(kms_config, DecryptionConfiguration::default())?;
//!
//! let properties = ReaderProperties::builder()
//!     .with_file_decryption_properties(decryption_properties)
//!     .build();
//! // SerializedFileReader::new(file, properties) ...
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[macro_use]
pub mod errors;
pub mod basic;
pub mod codec;
pub mod encryption;
pub mod file;
pub mod schema;
