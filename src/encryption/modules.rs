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

//! Module types and additional authenticated data (AAD) construction.
//!
//! Every encrypted region of a file (a "module") is bound to its position by
//! an AAD of the form
//! `file_aad || module_type || row_group_ordinal || column_ordinal || page_ordinal`,
//! with ordinals encoded as 16-bit little-endian and the trailing fields the
//! module type does not use left out.

/// The kind of an encrypted module within a file
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ModuleType {
    /// File footer (FileMetaData)
    Footer = 0,
    /// Column chunk metadata
    ColumnMetaData = 1,
    /// Data page payload
    DataPage = 2,
    /// Dictionary page payload
    DictionaryPage = 3,
    /// Data page header
    DataPageHeader = 4,
    /// Dictionary page header
    DictionaryPageHeader = 5,
    /// Column index
    ColumnIndex = 6,
    /// Offset index
    OffsetIndex = 7,
}

/// Creates the AAD for the file footer module
pub fn create_footer_aad(file_aad: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(file_aad.len() + 1);
    aad.extend_from_slice(file_aad);
    aad.push(ModuleType::Footer as u8);
    aad
}

/// Creates the AAD for a module of the given type.
///
/// The ordinals a module type does not use are ignored: the footer uses none,
/// column-level modules use the row group and column ordinals, and page-level
/// modules additionally use the page ordinal. Within a column chunk the
/// dictionary page, if present, is page ordinal 0 and data pages follow.
pub fn create_module_aad(
    file_aad: &[u8],
    module_type: ModuleType,
    row_group_ordinal: u16,
    column_ordinal: u16,
    page_ordinal: u16,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(file_aad.len() + 7);
    aad.extend_from_slice(file_aad);
    aad.push(module_type as u8);
    match module_type {
        ModuleType::Footer => {}
        ModuleType::ColumnMetaData | ModuleType::ColumnIndex | ModuleType::OffsetIndex => {
            aad.extend_from_slice(&row_group_ordinal.to_le_bytes());
            aad.extend_from_slice(&column_ordinal.to_le_bytes());
        }
        ModuleType::DataPage
        | ModuleType::DictionaryPage
        | ModuleType::DataPageHeader
        | ModuleType::DictionaryPageHeader => {
            aad.extend_from_slice(&row_group_ordinal.to_le_bytes());
            aad.extend_from_slice(&column_ordinal.to_le_bytes());
            aad.extend_from_slice(&page_ordinal.to_le_bytes());
        }
    }
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footer_aad() {
        assert_eq!(create_footer_aad(b"f0u123"), b"f0u123\x00");
        assert_eq!(
            create_module_aad(b"f0u123", ModuleType::Footer, 7, 7, 7),
            b"f0u123\x00"
        );
    }

    #[test]
    fn test_column_metadata_aad() {
        let aad = create_module_aad(b"f0u123", ModuleType::ColumnMetaData, 1, 258, 7);
        assert_eq!(aad, b"f0u123\x01\x01\x00\x02\x01");
    }

    #[test]
    fn test_data_page_aad() {
        let aad = create_module_aad(b"f0u123", ModuleType::DataPage, 0, 1, 2);
        assert_eq!(aad, b"f0u123\x02\x00\x00\x01\x00\x02\x00");
    }

    #[test]
    fn test_aad_is_deterministic() {
        let a = create_module_aad(b"prefixunique", ModuleType::DictionaryPageHeader, 3, 4, 0);
        let b = create_module_aad(b"prefixunique", ModuleType::DictionaryPageHeader, 3, 4, 0);
        assert_eq!(a, b);
    }
}
