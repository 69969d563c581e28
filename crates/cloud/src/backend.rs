//! The execution boundary between lazy queries and their values.

use std::future::Future;

use crate::error::Result;
use crate::expr::Expression;
use crate::objects::ComputedObject;

/// Something that can evaluate an encoded [`Expression`] to JSON.
///
/// [`EeClient`](crate::ee_client::EeClient) evaluates remotely over HTTP,
/// [`MemoryCatalog`](crate::memory::MemoryCatalog) evaluates in-process.
pub trait ComputeBackend {
    fn compute(&self, expression: &Expression)
        -> impl Future<Output = Result<serde_json::Value>> + Send;
}

/// Evaluate a lazy handle and return its JSON value.
pub async fn get_info<B, O>(backend: &B, object: &O) -> Result<serde_json::Value>
where
    B: ComputeBackend + ?Sized,
    O: ComputedObject,
{
    backend.compute(&object.encode()).await
}
