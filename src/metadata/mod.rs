//! Registry metadata model and fetchers

pub mod model;
pub mod pypi;

pub use model::{Downloads, PackageInfo, PackageMetadata, ReleaseFile};
pub use pypi::PypiClient;

use crate::error::Result;
use async_trait::async_trait;

/// Source of registry metadata for an exact package name.
///
/// Implementations report a missing package as
/// [`AuditError::PackageNotFound`](crate::AuditError::PackageNotFound) and
/// transport problems as network errors. The tree auditor treats both as an
/// unresolvable node, never as a malicious one.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<PackageMetadata>;
}
