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

//! Encryption and decryption of data encryption keys (DEKs) with key
//! encryption keys (KEKs). The raw KEK id is bound as AAD.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;

use crate::encryption::key_management::key_toolkit;
use crate::errors::{ParquetError, Result};

/// Encrypts a DEK with a KEK using AES-GCM
pub(crate) fn encrypt_encryption_key(
    dek: &[u8],
    kek_id: &[u8],
    kek_bytes: &[u8],
) -> Result<String> {
    key_toolkit::encrypt_key_locally(dek, kek_bytes, kek_id)
}

/// Decrypts a DEK that has been encrypted with a KEK using AES-GCM.
/// `encoded_kek_id` is the base64 KEK id as stored in key material.
pub(crate) fn decrypt_encryption_key(
    wrapped_dek: &str,
    encoded_kek_id: &str,
    kek_bytes: &[u8],
) -> Result<Vec<u8>> {
    let kek_id = BASE64_STANDARD.decode(encoded_kek_id).map_err(|e| {
        ParquetError::MalformedKeyMaterial(format!(
            "could not base64 decode key encryption key id: {e}"
        ))
    })?;
    key_toolkit::decrypt_key_locally(wrapped_dek, kek_bytes, &kek_id)
}
