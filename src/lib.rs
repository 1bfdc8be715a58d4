//! `dbpf-rs` provides functionality for reading, editing and writing DBPF resource packages, the
//! container format used by life-simulation game mods.
//!
//! With dbpf-rs, you can:
//!
//! - Open a package from disk or memory and look up resources by their type/group/instance key.
//! - Read resource payloads lazily, decompressing them on demand.
//! - Add, replace and remove resources, then save the package back in one atomic rewrite.
//! - Register typed codecs for resource types and let a [dispatcher::ResourceDispatcher] turn raw
//!   resource bytes into live, editable values. Unknown types always fall back to a raw codec
//!   that preserves their bytes exactly.
//!
//! ```
//! # use dbpf_rs::resource::package::Package;
//! # use dbpf_rs::resource::resource_key::ResourceKey;
//! # use dbpf_rs::resource::package::SaveOptions;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = ResourceKey::new(0x220557DA, 0, 0x0123_4567_89AB_CDEF);
//!
//! let mut package = Package::create_empty();
//! package.add_resource(key, b"hello".to_vec(), true)?;
//!
//! let bytes = package.to_bytes(&SaveOptions::new().with_timestamp(0))?;
//! let reopened = Package::from_memory(bytes)?;
//! assert_eq!(reopened.read_resource(&key)?, b"hello");
//! # Ok(())
//! # }
//! ```

use std::fmt;

pub mod codec;
pub mod compression;
pub mod dispatcher;
pub mod registry;
pub mod resource;
pub mod utils;

pub use codec::{CodecError, FieldError, FieldKey, ResourceCodec, TypedValue};
pub use dispatcher::{DispatchError, LoadedResource, ResourceDispatcher};
pub use registry::{CodecFactory, ResourceTypeRegistry};
pub use resource::package::{Package, PackageError};
pub use resource::resource_key::ResourceKey;

/// The codec API level a caller asks resources to be decoded for.
///
/// Codecs receive it on every parse so a single codec can keep serving older callers
/// after its in-memory representation grows.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion(pub u32);

impl ApiVersion {
    pub const CURRENT: ApiVersion = ApiVersion(1);
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api v{}", self.0)
    }
}
