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

//! Reader and writer properties.

use std::sync::Arc;

use crate::basic::Compression;
use crate::codec::{JsonMetadataCodec, MetadataCodec};
use crate::encryption::decrypt::FileDecryptionProperties;
use crate::encryption::encrypt::FileEncryptionProperties;

/// Reference counted reader properties
pub type ReaderPropertiesPtr = Arc<ReaderProperties>;

/// Properties of one read session
pub struct ReaderProperties {
    codec: Arc<dyn MetadataCodec>,
    file_decryption_properties: Option<Arc<FileDecryptionProperties>>,
}

impl Default for ReaderProperties {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ReaderProperties {
    /// Returns a new builder with default values
    pub fn builder() -> ReaderPropertiesBuilder {
        ReaderPropertiesBuilder::new()
    }

    /// The metadata codec used to decode footer and page structures
    pub fn codec(&self) -> &Arc<dyn MetadataCodec> {
        &self.codec
    }

    /// Decryption properties for encrypted files, if configured
    pub fn file_decryption_properties(&self) -> Option<&Arc<FileDecryptionProperties>> {
        self.file_decryption_properties.as_ref()
    }
}

/// Builder for [`ReaderProperties`]
pub struct ReaderPropertiesBuilder {
    codec: Arc<dyn MetadataCodec>,
    file_decryption_properties: Option<Arc<FileDecryptionProperties>>,
}

impl ReaderPropertiesBuilder {
    fn new() -> Self {
        Self {
            codec: Arc::new(JsonMetadataCodec),
            file_decryption_properties: None,
        }
    }

    /// Finalizes the builder
    pub fn build(self) -> ReaderProperties {
        ReaderProperties {
            codec: self.codec,
            file_decryption_properties: self.file_decryption_properties,
        }
    }

    /// Replaces the metadata codec
    pub fn with_codec(mut self, codec: Arc<dyn MetadataCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the decryption properties for reading encrypted files
    pub fn with_file_decryption_properties(
        mut self,
        file_decryption_properties: Arc<FileDecryptionProperties>,
    ) -> Self {
        self.file_decryption_properties = Some(file_decryption_properties);
        self
    }
}

/// Reference counted writer properties
pub type WriterPropertiesPtr = Arc<WriterProperties>;

/// Properties of one write session
pub struct WriterProperties {
    codec: Arc<dyn MetadataCodec>,
    compression: Compression,
    created_by: String,
    file_encryption_properties: Option<FileEncryptionProperties>,
}

impl Default for WriterProperties {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WriterProperties {
    /// Returns a new builder with default values
    pub fn builder() -> WriterPropertiesBuilder {
        WriterPropertiesBuilder::new()
    }

    /// The metadata codec used to encode footer and page structures
    pub fn codec(&self) -> &Arc<dyn MetadataCodec> {
        &self.codec
    }

    /// Compression codec recorded for page payloads
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// The `created_by` string written into file metadata
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Encryption properties for writing encrypted files, if configured
    pub fn file_encryption_properties(&self) -> Option<&FileEncryptionProperties> {
        self.file_encryption_properties.as_ref()
    }
}

/// Builder for [`WriterProperties`]
pub struct WriterPropertiesBuilder {
    codec: Arc<dyn MetadataCodec>,
    compression: Compression,
    created_by: String,
    file_encryption_properties: Option<FileEncryptionProperties>,
}

impl WriterPropertiesBuilder {
    fn new() -> Self {
        Self {
            codec: Arc::new(JsonMetadataCodec),
            compression: Compression::Uncompressed,
            created_by: format!("parquet-crypto version {}", env!("CARGO_PKG_VERSION")),
            file_encryption_properties: None,
        }
    }

    /// Finalizes the builder
    pub fn build(self) -> WriterProperties {
        WriterProperties {
            codec: self.codec,
            compression: self.compression,
            created_by: self.created_by,
            file_encryption_properties: self.file_encryption_properties,
        }
    }

    /// Replaces the metadata codec
    pub fn with_codec(mut self, codec: Arc<dyn MetadataCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the compression codec recorded for page payloads
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Overrides the `created_by` string written into file metadata
    pub fn with_created_by(mut self, created_by: String) -> Self {
        self.created_by = created_by;
        self
    }

    /// Sets the encryption properties for writing an encrypted file
    pub fn with_file_encryption_properties(
        mut self,
        file_encryption_properties: FileEncryptionProperties,
    ) -> Self {
        self.file_encryption_properties = Some(file_encryption_properties);
        self
    }
}
