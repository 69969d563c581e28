//! Authentication traits and implementations for the catalog service.

pub mod bearer;
mod none;

pub use bearer::BearerAuth;
pub use none::NoAuth;

use crate::error::Result;

/// Trait for signing HTTP requests to the catalog service.
///
/// Implementations add authentication headers (e.g. OAuth bearer tokens)
/// to outgoing requests before they are sent.
pub trait CloudAuth: Send + Sync {
    /// Sign a request by adding authentication headers.
    ///
    /// `url` is the full request URL, `headers` is a mutable list where
    /// auth headers should be appended.
    fn sign_request(
        &self,
        url: &str,
        method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()>;
}
