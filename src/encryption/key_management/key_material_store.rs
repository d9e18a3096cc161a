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

//! Storage of key material outside of the Parquet file.
//!
//! With external key material, the file only carries `keyReference` strings
//! and the serialized [`KeyMaterial`](super::key_material::KeyMaterial) JSON
//! lives in a sidecar, which enables master-key rotation without rewriting
//! data files. The sidecar backend (e.g. a distributed filesystem) is outside
//! this crate; [`InMemoryKeyMaterialStore`] serves tests and examples.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{ParquetError, Result};

/// Identifier under which footer key material is stored
pub const FOOTER_KEY_ID_IN_FILE: &str = "footerKey";
/// Prefix of identifiers under which column key material is stored
pub const COLUMN_KEY_ID_IN_FILE_PREFIX: &str = "columnKey";

/// A sidecar store for key material of one Parquet file
pub trait FileKeyMaterialStore: Send + Sync {
    /// Adds key material under the given in-file identifier
    fn add_key_material(&self, key_id_in_file: &str, key_material: &str) -> Result<()>;

    /// Returns the key material stored under the given in-file identifier
    fn get_key_material(&self, key_id_in_file: &str) -> Result<String>;

    /// Persists material added so far
    fn save_material(&self) -> Result<()>;
}

/// Key-material store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryKeyMaterialStore {
    material: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyMaterialStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileKeyMaterialStore for InMemoryKeyMaterialStore {
    fn add_key_material(&self, key_id_in_file: &str, key_material: &str) -> Result<()> {
        self.material
            .lock()
            .unwrap()
            .insert(key_id_in_file.to_owned(), key_material.to_owned());
        Ok(())
    }

    fn get_key_material(&self, key_id_in_file: &str) -> Result<String> {
        self.material
            .lock()
            .unwrap()
            .get(key_id_in_file)
            .cloned()
            .ok_or_else(|| {
                ParquetError::MalformedKeyMaterial(format!(
                    "no key material stored for reference '{key_id_in_file}'"
                ))
            })
    }

    fn save_material(&self) -> Result<()> {
        Ok(())
    }
}
