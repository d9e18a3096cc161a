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

//! APIs for reading and writing the Parquet file structure.
//!
//! [`footer`] classifies and decodes the file trailer, [`metadata`] holds the
//! decoded metadata model, and [`serialized_reader`] / [`writer`] read and
//! write row groups module by module.

pub mod footer;
pub mod metadata;
pub mod properties;
pub mod reader;
pub mod serialized_reader;
pub mod writer;

/// The length of the parquet trailer in bytes: metadata length plus magic
pub const FOOTER_SIZE: usize = 8;
/// Magic of plaintext-footer files
pub const PARQUET_MAGIC: [u8; 4] = [b'P', b'A', b'R', b'1'];
/// Magic of encrypted-footer files
pub const PARQUET_MAGIC_ENCRYPTED_FOOTER: [u8; 4] = [b'P', b'A', b'R', b'E'];
