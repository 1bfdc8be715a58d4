//! Turns raw package resources into live codec instances.

use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use thiserror::Error;

use crate::codec::{CodecError, ResourceCodec};
use crate::registry::{CodecFactory, ResourceTypeRegistry};
use crate::resource::index_entry::ResourceIndexEntry;
use crate::resource::package::{Package, PackageError};
use crate::resource::resource_key::ResourceKey;
use crate::ApiVersion;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Package error: {0}")]
    PackageError(#[from] PackageError),

    #[error("Codec {codec} failed to parse {key}: {source}")]
    CodecParseFailure {
        key: ResourceKey,
        codec: &'static str,
        #[source]
        source: CodecError,
    },

    #[error("Failed to serialize {key}: {source}")]
    CodecSerializeFailure {
        key: ResourceKey,
        #[source]
        source: CodecError,
    },
}

impl DispatchError {
    /// The resource the error is about, if it is about a single one.
    pub fn key(&self) -> Option<ResourceKey> {
        match self {
            DispatchError::CodecParseFailure { key, .. }
            | DispatchError::CodecSerializeFailure { key, .. } => Some(*key),
            DispatchError::PackageError(PackageError::ResourceNotFound(key))
            | DispatchError::PackageError(PackageError::ResourceTooLarge(key))
            | DispatchError::PackageError(PackageError::CorruptIndex { key, .. }) => Some(*key),
            DispatchError::PackageError(_) => None,
        }
    }
}

/// A decoded resource together with the bytes it was decoded from.
#[derive(Debug)]
pub struct LoadedResource {
    key: ResourceKey,
    codec: Box<dyn ResourceCodec>,
    original: Vec<u8>,
}

impl LoadedResource {
    pub fn key(&self) -> ResourceKey {
        self.key
    }

    pub fn codec(&self) -> &dyn ResourceCodec {
        self.codec.as_ref()
    }

    pub fn codec_mut(&mut self) -> &mut dyn ResourceCodec {
        self.codec.as_mut()
    }

    /// The decompressed bytes the codec was parsed from.
    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    pub fn serialize(&self) -> Result<Vec<u8>, DispatchError> {
        self.codec
            .serialize()
            .map_err(|source| DispatchError::CodecSerializeFailure {
                key: self.key,
                source,
            })
    }

    /// Whether the codec no longer serializes to the bytes it was loaded from.
    pub fn is_modified(&self) -> Result<bool, DispatchError> {
        Ok(self.serialize()? != self.original)
    }

    /// Serializes the resource back into `package` under its key.
    pub fn store(&self, package: &mut Package, compress: bool) -> Result<(), DispatchError> {
        let data = self.serialize()?;
        package.add_resource(self.key, data, compress)?;
        Ok(())
    }

    pub fn into_codec(self) -> Box<dyn ResourceCodec> {
        self.codec
    }

    /// Drops the codec and the buffered original bytes.
    pub fn release(self) {
        tracing::trace!("Releasing {}", self.key);
    }
}

/// The outcome of decoding many resources at once.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub loaded: Vec<LoadedResource>,
    pub failures: Vec<(ResourceKey, DispatchError)>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Decodes package resources with the codecs of a [ResourceTypeRegistry].
///
/// A codec that fails to parse a resource is reported as [DispatchError::CodecParseFailure], the
/// dispatcher never quietly substitutes the fallback codec. Callers that want the raw bytes of a
/// resource a codec cannot handle ask for it with [ResourceDispatcher::get_default_resource], or
/// switch the whole dispatcher to the fallback with [ResourceDispatcher::with_always_default].
#[derive(Clone, Debug)]
pub struct ResourceDispatcher {
    registry: Arc<ResourceTypeRegistry>,
    always_default: bool,
}

impl ResourceDispatcher {
    pub fn new(registry: Arc<ResourceTypeRegistry>) -> Self {
        Self {
            registry,
            always_default: false,
        }
    }

    /// Bypasses every type-specific codec in favor of the fallback.
    pub fn with_always_default(mut self, always_default: bool) -> Self {
        self.always_default = always_default;
        self
    }

    pub fn is_always_default(&self) -> bool {
        self.always_default
    }

    pub fn registry(&self) -> &Arc<ResourceTypeRegistry> {
        &self.registry
    }

    fn factory_for(&self, type_id: u32) -> CodecFactory {
        if self.always_default {
            self.registry.fallback()
        } else {
            self.registry.resolve(type_id)
        }
    }

    fn load_with(
        &self,
        factory: CodecFactory,
        package: &Package,
        entry: &ResourceIndexEntry,
        api_version: ApiVersion,
    ) -> Result<LoadedResource, DispatchError> {
        let original = package.read_resource_entry(entry)?;
        tracing::trace!("Decoding {} with {}", entry.key, factory.type_name());

        let codec = factory
            .parse(api_version, &original)
            .map_err(|source| DispatchError::CodecParseFailure {
                key: entry.key,
                codec: factory.type_name(),
                source,
            })?;

        Ok(LoadedResource {
            key: entry.key,
            codec,
            original,
        })
    }

    /// Reads the resource described by `entry` and decodes it with the codec registered for its
    /// type.
    pub fn get_resource(
        &self,
        package: &Package,
        entry: &ResourceIndexEntry,
        api_version: ApiVersion,
    ) -> Result<LoadedResource, DispatchError> {
        let factory = self.factory_for(entry.key.resource_type);
        self.load_with(factory, package, entry, api_version)
    }

    pub fn get_resource_by_key(
        &self,
        package: &Package,
        key: &ResourceKey,
        api_version: ApiVersion,
    ) -> Result<LoadedResource, DispatchError> {
        let entry = package
            .find(key)
            .ok_or(PackageError::ResourceNotFound(*key))?;
        self.get_resource(package, entry, api_version)
    }

    /// Reads the resource with the fallback codec, whatever its type.
    pub fn get_default_resource(
        &self,
        package: &Package,
        entry: &ResourceIndexEntry,
        api_version: ApiVersion,
    ) -> Result<LoadedResource, DispatchError> {
        self.load_with(self.registry.fallback(), package, entry, api_version)
    }

    /// An empty codec instance for a new resource of `type_id`.
    pub fn create_new_resource(&self, type_id: u32, api_version: ApiVersion) -> Box<dyn ResourceCodec> {
        self.factory_for(type_id).create(api_version)
    }

    /// Decodes every live resource of `type_id`.
    ///
    /// Resources that fail are collected in [BatchResult::failures] rather than aborting the batch.
    pub fn get_resources_of_type(
        &self,
        package: &Package,
        type_id: u32,
        api_version: ApiVersion,
    ) -> BatchResult {
        let entries = package
            .entries()
            .filter(|entry| entry.key.resource_type == type_id)
            .collect::<Vec<_>>();

        #[cfg(feature = "rayon")]
        let results = entries
            .into_par_iter()
            .map(|entry| (entry.key, self.get_resource(package, entry, api_version)))
            .collect::<Vec<_>>();

        #[cfg(not(feature = "rayon"))]
        let results = entries
            .into_iter()
            .map(|entry| (entry.key, self.get_resource(package, entry, api_version)))
            .collect::<Vec<_>>();

        let mut batch = BatchResult::default();
        for (key, result) in results {
            match result {
                Ok(resource) => batch.loaded.push(resource),
                Err(e) => {
                    tracing::warn!("Failed to load {key}: {e}");
                    batch.failures.push((key, e));
                }
            }
        }
        batch
    }
}
