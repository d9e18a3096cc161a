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

//! Encryption key management tools for Parquet.
//!
//! This module integrates with a Key Management Server (KMS) to read and
//! write encrypted Parquet files.
//!
//! Envelope encryption is used: files are encrypted with data encryption keys
//! (DEKs) that are randomly generated per file, and the DEKs are encrypted
//! with master keys managed by the KMS. With double wrapping (the default)
//! the DEKs are first encrypted with key encryption keys (KEKs) that are then
//! encrypted with master keys, so that the KMS wraps a handful of KEKs
//! instead of one DEK per column.
//!
//! Using this module requires a [`KmsClient`](kms::KmsClient) implementation
//! that talks to your organization's KMS. The
//! [`CryptoFactory`](crypto_factory::CryptoFactory) then turns declarative
//! [`EncryptionConfiguration`](crypto_factory::EncryptionConfiguration)s into
//! concrete file encryption and decryption properties, caching KMS clients
//! and KEKs per access token with a configurable lifetime.

pub mod crypto_factory;
mod key_encryption;
pub mod key_material;
pub mod key_material_store;
mod key_toolkit;
mod key_unwrapper;
mod key_wrapper;
pub mod kms;
#[cfg(test)]
mod test_kms;
mod two_level_cache;
