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

//! Column paths and the flattened schema descriptor.

use serde::{Deserialize, Serialize};

use crate::basic::Type;
use crate::errors::Result;

/// Path to a column within the schema, e.g. `a.b.c` for nested fields
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnPath {
    parts: Vec<String>,
}

impl ColumnPath {
    /// Creates a new column path from a vector of field names
    pub fn new(parts: Vec<String>) -> Self {
        ColumnPath { parts }
    }

    /// Returns the path as a dot-joined string, e.g. `a.b.c`
    pub fn string(&self) -> String {
        self.parts.join(".")
    }

    /// Returns the individual path segments
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl std::fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.string())
    }
}

impl From<&str> for ColumnPath {
    fn from(single_path: &str) -> Self {
        ColumnPath {
            parts: single_path.split('.').map(|s| s.to_string()).collect(),
        }
    }
}

impl From<Vec<String>> for ColumnPath {
    fn from(parts: Vec<String>) -> Self {
        ColumnPath { parts }
    }
}

/// Descriptor of a single leaf column
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    path: ColumnPath,
    physical_type: Type,
}

impl ColumnDescriptor {
    /// Creates a new descriptor for a leaf column
    pub fn new(path: ColumnPath, physical_type: Type) -> Self {
        Self {
            path,
            physical_type,
        }
    }

    /// The path of this column within the schema
    pub fn path(&self) -> &ColumnPath {
        &self.path
    }

    /// The physical type of this column's values
    pub fn physical_type(&self) -> Type {
        self.physical_type
    }
}

/// Flattened schema: the ordered list of leaf columns of a file
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    columns: Vec<ColumnDescriptor>,
}

impl SchemaDescriptor {
    /// Creates a schema descriptor from its leaf columns
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    /// Number of leaf columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns the descriptor of the leaf column with the given ordinal
    pub fn column(&self, i: usize) -> Result<&ColumnDescriptor> {
        self.columns
            .get(i)
            .ok_or_else(|| general_err!("column ordinal {} out of bounds ({})", i, self.columns.len()))
    }

    /// All leaf columns in schema order
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Returns the ordinal of the column with the given path, if any
    pub fn index_of(&self, path: &ColumnPath) -> Option<usize> {
        self.columns.iter().position(|c| c.path() == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_path_string() {
        let path = ColumnPath::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(path.string(), "a.b.c");
        assert_eq!(ColumnPath::from("a.b.c"), path);
    }

    #[test]
    fn test_schema_index_of() {
        let schema = SchemaDescriptor::new(vec![
            ColumnDescriptor::new(ColumnPath::from("a"), Type::Int32),
            ColumnDescriptor::new(ColumnPath::from("b"), Type::Int64),
        ]);
        assert_eq!(schema.index_of(&ColumnPath::from("b")), Some(1));
        assert_eq!(schema.index_of(&ColumnPath::from("c")), None);
        assert_eq!(schema.column(0).unwrap().physical_type(), Type::Int32);
        assert!(schema.column(2).is_err());
    }
}
