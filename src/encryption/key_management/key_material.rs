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

//! The serialized JSON key-material format and the KeyMetadata wrapper that
//! distinguishes internal from external key-material storage.

use serde::{Deserialize, Serialize};

use crate::errors::{ParquetError, Result};

const KEY_MATERIAL_TYPE: &str = "PKMT1";

fn default_internal_storage() -> bool {
    true
}

/// Serializable key material that describes a wrapped encryption key
/// and includes the metadata required to unwrap it.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyMaterial {
    /// The type of the key material.
    /// Currently only one type is supported: "PKMT1"
    #[serde(rename = "keyMaterialType")]
    pub key_material_type: String,

    /// Whether key material is stored inline in this JSON data or in an
    /// external file
    #[serde(rename = "internalStorage", default = "default_internal_storage")]
    pub internal_storage: bool,

    /// If internal storage is false, a reference to the external key material
    #[serde(rename = "keyReference", skip_serializing_if = "Option::is_none")]
    pub key_reference: Option<String>,

    /// Whether the material belongs to a file footer key
    #[serde(rename = "isFooterKey")]
    pub is_footer_key: bool,

    /// The KMS instance ID. Only written for footer key material
    #[serde(rename = "kmsInstanceID", skip_serializing_if = "Option::is_none")]
    pub kms_instance_id: Option<String>,

    /// The KMS instance URL. Only written for footer key material
    #[serde(rename = "kmsInstanceURL", skip_serializing_if = "Option::is_none")]
    pub kms_instance_url: Option<String>,

    /// An identifier for the master key used to generate the key material
    #[serde(rename = "masterKeyID")]
    pub master_key_id: String,

    /// The wrapped data encryption key, base64 encoded
    #[serde(rename = "wrappedDEK")]
    pub wrapped_dek: String,

    /// Whether double wrapping is used, where data encryption keys are wrapped
    /// with a key encryption key, which in turn is wrapped with the master key.
    /// If false (single wrapping), data encryption keys are wrapped directly
    /// with the master key.
    #[serde(rename = "doubleWrapping")]
    pub double_wrapping: bool,

    /// The identifier of the key encryption key used to wrap the data
    /// encryption key. Only written in double wrapping mode.
    #[serde(rename = "keyEncryptionKeyID", skip_serializing_if = "Option::is_none")]
    pub key_encryption_key_id: Option<String>,

    /// The wrapped key encryption key. Only written in double wrapping mode.
    #[serde(rename = "wrappedKEK", skip_serializing_if = "Option::is_none")]
    pub wrapped_kek: Option<String>,
}

impl KeyMaterial {
    /// Parses key material from its JSON representation
    pub fn deserialize(key_material: &str) -> Result<Self> {
        let material: KeyMaterial = serde_json::from_str(key_material).map_err(|e| {
            ParquetError::MalformedKeyMaterial(format!("error deserializing JSON: {e}"))
        })?;
        if material.key_material_type != KEY_MATERIAL_TYPE {
            return Err(ParquetError::MalformedKeyMaterial(format!(
                "unsupported key material type: {}",
                material.key_material_type
            )));
        }
        if material.double_wrapping
            && (material.key_encryption_key_id.is_none() || material.wrapped_kek.is_none())
        {
            return Err(ParquetError::MalformedKeyMaterial(
                "key uses double wrapping but key encryption key is not set".to_string(),
            ));
        }
        Ok(material)
    }

    /// Serializes key material to JSON
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            ParquetError::MalformedKeyMaterial(format!("error serializing to JSON: {e}"))
        })
    }
}

/// Builder for [`KeyMaterial`]
pub struct KeyMaterialBuilder {
    is_footer_key: bool,
    kms_instance_id: Option<String>,
    kms_instance_url: Option<String>,
    master_key_id: Option<String>,
    wrapped_dek: Option<String>,
    double_wrapping: bool,
    key_encryption_key_id: Option<String>,
    wrapped_kek: Option<String>,
}

impl KeyMaterialBuilder {
    /// Starts building material for a footer key; footer material records the
    /// KMS instance it was created against.
    pub fn for_footer_key(kms_instance_id: String, kms_instance_url: String) -> Self {
        Self {
            is_footer_key: true,
            kms_instance_id: Some(kms_instance_id),
            kms_instance_url: Some(kms_instance_url),
            master_key_id: None,
            wrapped_dek: None,
            double_wrapping: false,
            key_encryption_key_id: None,
            wrapped_kek: None,
        }
    }

    /// Starts building material for a column key
    pub fn for_column_key() -> Self {
        Self {
            is_footer_key: false,
            kms_instance_id: None,
            kms_instance_url: None,
            master_key_id: None,
            wrapped_dek: None,
            double_wrapping: false,
            key_encryption_key_id: None,
            wrapped_kek: None,
        }
    }

    /// Records a data key wrapped directly with the master key
    pub fn with_single_wrapped_key(mut self, master_key_id: String, wrapped_dek: String) -> Self {
        self.double_wrapping = false;
        self.master_key_id = Some(master_key_id);
        self.wrapped_dek = Some(wrapped_dek);
        self
    }

    /// Records a data key wrapped with a key encryption key, itself wrapped
    /// with the master key
    pub fn with_double_wrapped_key(
        mut self,
        master_key_id: String,
        key_encryption_key_id: String,
        wrapped_kek: String,
        wrapped_dek: String,
    ) -> Self {
        self.double_wrapping = true;
        self.master_key_id = Some(master_key_id);
        self.key_encryption_key_id = Some(key_encryption_key_id);
        self.wrapped_kek = Some(wrapped_kek);
        self.wrapped_dek = Some(wrapped_dek);
        self
    }

    /// Finalizes the key material
    pub fn build(self) -> Result<KeyMaterial> {
        if let (Some(master_key_id), Some(wrapped_dek)) = (self.master_key_id, self.wrapped_dek) {
            Ok(KeyMaterial {
                key_material_type: KEY_MATERIAL_TYPE.to_string(),
                internal_storage: true,
                key_reference: None,
                is_footer_key: self.is_footer_key,
                kms_instance_id: self.kms_instance_id,
                kms_instance_url: self.kms_instance_url,
                master_key_id,
                wrapped_dek,
                double_wrapping: self.double_wrapping,
                key_encryption_key_id: self.key_encryption_key_id,
                wrapped_kek: self.wrapped_kek,
            })
        } else {
            Err(general_err!("wrapped key not set when building key material"))
        }
    }
}

/// The key-metadata blob stored in a file, wrapping either inline key
/// material or a reference into an external key-material store.
#[derive(Debug, PartialEq)]
pub enum KeyMetadata {
    /// The key material is embedded in the metadata blob itself
    Internal(KeyMaterial),
    /// The key material lives in an external store under this reference
    External {
        /// Identifier of the material within the external store
        key_reference: String,
    },
}

#[derive(Deserialize)]
struct StorageProbe {
    #[serde(rename = "keyMaterialType")]
    key_material_type: String,
    #[serde(rename = "internalStorage", default = "default_internal_storage")]
    internal_storage: bool,
    #[serde(rename = "keyReference")]
    key_reference: Option<String>,
}

#[derive(Serialize)]
struct ExternalKeyMetadata<'a> {
    #[serde(rename = "keyMaterialType")]
    key_material_type: &'a str,
    #[serde(rename = "internalStorage")]
    internal_storage: bool,
    #[serde(rename = "keyReference")]
    key_reference: &'a str,
}

impl KeyMetadata {
    /// Parses a key-metadata blob as read from a file
    pub fn parse(key_metadata: &[u8]) -> Result<Self> {
        let key_metadata = std::str::from_utf8(key_metadata).map_err(|e| {
            ParquetError::MalformedKeyMaterial(format!("key metadata is not UTF-8: {e}"))
        })?;
        let probe: StorageProbe = serde_json::from_str(key_metadata).map_err(|e| {
            ParquetError::MalformedKeyMaterial(format!("error deserializing JSON: {e}"))
        })?;
        if probe.key_material_type != KEY_MATERIAL_TYPE {
            return Err(ParquetError::MalformedKeyMaterial(format!(
                "unsupported key material type: {}",
                probe.key_material_type
            )));
        }
        if probe.internal_storage {
            Ok(KeyMetadata::Internal(KeyMaterial::deserialize(key_metadata)?))
        } else {
            match probe.key_reference {
                Some(key_reference) => Ok(KeyMetadata::External { key_reference }),
                None => Err(ParquetError::MalformedKeyMaterial(
                    "external key material without a key reference".to_string(),
                )),
            }
        }
    }

    /// Serializes the key-metadata blob referencing externally stored material
    pub fn create_serialized_for_external_material(key_reference: &str) -> Result<String> {
        serde_json::to_string(&ExternalKeyMetadata {
            key_material_type: KEY_MATERIAL_TYPE,
            internal_storage: false,
            key_reference,
        })
        .map_err(|e| {
            ParquetError::MalformedKeyMaterial(format!("error serializing to JSON: {e}"))
        })
    }
}
