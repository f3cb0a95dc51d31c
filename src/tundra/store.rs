// SPDX-License-Identifier: Apache-2.0

//! The external blob datastore contract (spec §4.6/§6): where a frozen
//! key's `DUMP` payload ends up, and where `ensure_ks` fetches it back
//! from on a cache miss.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

pub trait BlobStore: Send + Sync {
    fn put<'a>(
        &'a self,
        key: &'a [u8],
        blob: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// `None` if the datastore has never seen this key.
    fn get<'a>(
        &'a self,
        key: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>>;

    fn delete<'a>(&'a self, key: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
