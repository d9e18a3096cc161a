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

//! A KMS client factory for tests that records client creations and counts
//! wrap/unwrap calls reaching the KMS.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::encryption::key_management::kms::{
    InMemoryKms, KmsClient, KmsClientFactory, KmsClientRef, KmsConnectionConfig,
};
use crate::errors::Result;

pub(crate) struct TestKmsClientFactory {
    master_keys: HashMap<String, Vec<u8>>,
    invocations: Mutex<Vec<String>>,
    keys_wrapped: Arc<AtomicUsize>,
    keys_unwrapped: Arc<AtomicUsize>,
}

impl TestKmsClientFactory {
    /// Creates a factory over the key set used throughout the tests
    pub(crate) fn with_default_keys() -> Self {
        let mut keys = HashMap::default();
        keys.insert("kf".to_owned(), b"0123456789012345".to_vec());
        keys.insert("kc1".to_owned(), b"1234567890123450".to_vec());
        keys.insert("kc2".to_owned(), b"1234567890123451".to_vec());
        Self {
            master_keys: keys,
            invocations: Mutex::new(Vec::new()),
            keys_wrapped: Arc::new(AtomicUsize::new(0)),
            keys_unwrapped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Access tokens used for the clients created so far
    pub(crate) fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    /// Number of wrap calls that reached the KMS
    pub(crate) fn keys_wrapped(&self) -> usize {
        self.keys_wrapped.load(Ordering::SeqCst)
    }

    /// Number of unwrap calls that reached the KMS
    pub(crate) fn keys_unwrapped(&self) -> usize {
        self.keys_unwrapped.load(Ordering::SeqCst)
    }
}

impl KmsClientFactory for TestKmsClientFactory {
    fn create_client(&self, kms_connection_config: &KmsConnectionConfig) -> Result<KmsClientRef> {
        self.invocations
            .lock()
            .unwrap()
            .push(kms_connection_config.key_access_token());
        Ok(Arc::new(TrackingKmsClient {
            inner: InMemoryKms::new(self.master_keys.clone()),
            keys_wrapped: self.keys_wrapped.clone(),
            keys_unwrapped: self.keys_unwrapped.clone(),
        }))
    }
}

struct TrackingKmsClient {
    inner: InMemoryKms,
    keys_wrapped: Arc<AtomicUsize>,
    keys_unwrapped: Arc<AtomicUsize>,
}

impl KmsClient for TrackingKmsClient {
    fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<String> {
        self.keys_wrapped.fetch_add(1, Ordering::SeqCst);
        self.inner.wrap_key(key_bytes, master_key_identifier)
    }

    fn unwrap_key(&self, wrapped_key: &str, master_key_identifier: &str) -> Result<Vec<u8>> {
        self.keys_unwrapped.fetch_add(1, Ordering::SeqCst);
        self.inner.unwrap_key(wrapped_key, master_key_identifier)
    }

    fn get_master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        // Master key fetches for local wrapping are not counted as wrap
        // traffic
        self.inner.get_master_key(master_key_identifier)
    }
}
