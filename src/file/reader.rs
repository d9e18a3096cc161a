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

//! The random-access byte-source abstraction files are read through.

use bytes::Bytes;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::errors::{ParquetError, Result};

/// Length of a byte source
pub trait Length {
    /// Returns the amount of bytes available
    fn len(&self) -> u64;

    /// Whether the source is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A random-access source of file bytes.
///
/// Multiple readers may request overlapping ranges; implementations must be
/// usable from several threads. I/O suspension, caching and prefetching
/// happen behind this trait.
pub trait ChunkReader: Length + Send + Sync {
    /// The concrete sequential reader returned by [`get_read`](Self::get_read)
    type T: Read;

    /// Returns a reader positioned at `start`
    fn get_read(&self, start: u64) -> Result<Self::T>;

    /// Returns `length` bytes starting at `start`
    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes>;
}

impl Length for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }
}

impl ChunkReader for Bytes {
    type T = bytes::buf::Reader<Bytes>;

    fn get_read(&self, start: u64) -> Result<Self::T> {
        if start > Bytes::len(self) as u64 {
            return Err(eof_err!(
                "read offset {} exceeds source of {} bytes",
                start,
                Bytes::len(self)
            ));
        }
        Ok(bytes::Buf::reader(self.slice(start as usize..)))
    }

    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes> {
        let start = start as usize;
        if start + length > Bytes::len(self) {
            return Err(eof_err!(
                "requested range [{}, {}) exceeds source of {} bytes",
                start,
                start + length,
                Bytes::len(self)
            ));
        }
        Ok(self.slice(start..start + length))
    }
}

impl Length for File {
    fn len(&self) -> u64 {
        self.metadata().map(|m| m.len()).unwrap_or(0)
    }
}

impl ChunkReader for File {
    type T = BufReader<File>;

    fn get_read(&self, start: u64) -> Result<Self::T> {
        let mut file = self.try_clone()?;
        file.seek(SeekFrom::Start(start))?;
        Ok(BufReader::new(file))
    }

    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes> {
        let mut buffer = vec![0u8; length];
        let mut reader = self.get_read(start)?;
        reader
            .read_exact(&mut buffer)
            .map_err(|e| ParquetError::External(Box::new(e)))?;
        Ok(buffer.into())
    }
}
