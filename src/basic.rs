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

//! Basic enums mirrored from the Parquet metadata model.
//!
//! Only the tags needed by the file-structure and encryption engines are
//! defined here; value decoding and decompression live outside this crate.

use serde::{Deserialize, Serialize};

/// Physical type of column values
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Type {
    /// Boolean values
    Boolean,
    /// 32-bit signed integers
    Int32,
    /// 64-bit signed integers
    Int64,
    /// 32-bit floating point values
    Float,
    /// 64-bit floating point values
    Double,
    /// Variable-length byte arrays
    ByteArray,
    /// Fixed-length byte arrays
    FixedLenByteArray,
}

/// Encoding of values within a page.
///
/// The page payload stays opaque to this crate; the tag is carried through
/// the metadata for the value decoders.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Encoding {
    /// Values laid out back to back
    Plain,
    /// Dictionary indices into a plain-encoded dictionary page
    PlainDictionary,
    /// Run-length / bit-packed hybrid
    Rle,
}

/// Compression codec applied to page payloads before encryption
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Compression {
    /// No compression
    #[default]
    Uncompressed,
    /// Snappy compression
    Snappy,
    /// Gzip compression
    Gzip,
    /// Zstandard compression
    Zstd,
}

/// Page kind tag carried in page headers
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PageType {
    /// A page of column values
    DataPage,
    /// The dictionary for the column chunk; at most one per chunk, always
    /// first
    DictionaryPage,
}

/// The cipher a file (or module) is encrypted with
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ParquetCipher {
    /// AES-GCM for every module
    AesGcmV1,
    /// AES-GCM for metadata modules, AES-CTR for page payloads
    AesGcmCtrV1,
}
