//! Maps resource type ids to the codecs that understand them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use itertools::Itertools;

use crate::codec::clip_header::ClipHeader;
use crate::codec::raw_resource::RawResource;
use crate::codec::{CodecError, ResourceCodec};
use crate::ApiVersion;

/// Builds codec instances of one concrete type, either empty or from resource bytes.
#[derive(Copy, Clone)]
pub struct CodecFactory {
    type_name: &'static str,
    create: fn(ApiVersion) -> Box<dyn ResourceCodec>,
    parse: fn(ApiVersion, &[u8]) -> Result<Box<dyn ResourceCodec>, CodecError>,
}

fn create_boxed<C: ResourceCodec + 'static>(api_version: ApiVersion) -> Box<dyn ResourceCodec> {
    Box::new(C::create(api_version))
}

fn parse_boxed<C: ResourceCodec + 'static>(
    api_version: ApiVersion,
    bytes: &[u8],
) -> Result<Box<dyn ResourceCodec>, CodecError> {
    Ok(Box::new(C::parse(api_version, bytes)?))
}

impl CodecFactory {
    pub fn of<C: ResourceCodec + 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<C>(),
            create: create_boxed::<C>,
            parse: parse_boxed::<C>,
        }
    }

    /// The Rust type the factory builds, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn create(&self, api_version: ApiVersion) -> Box<dyn ResourceCodec> {
        (self.create)(api_version)
    }

    pub fn parse(
        &self,
        api_version: ApiVersion,
        bytes: &[u8],
    ) -> Result<Box<dyn ResourceCodec>, CodecError> {
        (self.parse)(api_version, bytes)
    }
}

impl fmt::Debug for CodecFactory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CodecFactory({})", self.type_name)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Registration {
    pub factory: CodecFactory,
    pub priority: i32,
    /// Registration order, later registrations win priority ties.
    pub sequence: u64,
}

impl Registration {
    fn precedence(&self) -> (i32, u64) {
        (self.priority, self.sequence)
    }
}

#[derive(Default)]
struct RegistryTable {
    by_type: HashMap<u32, Vec<Registration>>,
    next_sequence: u64,
}

/// Which codec handles which resource type.
///
/// Several factories may claim the same type id. The one with the highest priority wins, and
/// among equal priorities the one registered last. Types nobody claimed resolve to the fallback
/// factory, which keeps resources as opaque bytes, so resolution never fails.
///
/// Registration takes a write lock and may happen while other threads resolve.
pub struct ResourceTypeRegistry {
    table: RwLock<RegistryTable>,
    fallback: CodecFactory,
}

impl ResourceTypeRegistry {
    /// Nominal priority of the fallback. It only answers for types without any registration.
    pub const FALLBACK_PRIORITY: i32 = -1000;

    /// An empty registry; every type resolves to the fallback.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(RegistryTable::default()),
            fallback: CodecFactory::of::<RawResource>(),
        }
    }

    /// A registry with the codecs this crate ships.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_codec::<ClipHeader>(ClipHeader::TYPE_ID, 0);
        registry
    }

    pub fn register(&self, type_id: u32, factory: CodecFactory, priority: i32) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let sequence = table.next_sequence;
        table.next_sequence += 1;

        tracing::debug!(
            "Registering {} for type 0x{type_id:08X} with priority {priority}",
            factory.type_name()
        );
        table.by_type.entry(type_id).or_default().push(Registration {
            factory,
            priority,
            sequence,
        });
    }

    pub fn register_codec<C: ResourceCodec + 'static>(&self, type_id: u32, priority: i32) {
        self.register(type_id, CodecFactory::of::<C>(), priority)
    }

    /// The factory for `type_id`, or the fallback if no codec claims it.
    pub fn resolve(&self, type_id: u32) -> CodecFactory {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_type
            .get(&type_id)
            .and_then(|registrations| registrations.iter().max_by_key(|r| r.precedence()))
            .map_or(self.fallback, |registration| registration.factory)
    }

    pub fn fallback(&self) -> CodecFactory {
        self.fallback
    }

    pub fn is_registered(&self, type_id: u32) -> bool {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_type.contains_key(&type_id)
    }

    /// Every type id with at least one registered codec, ascending. The fallback is not a type.
    pub fn enumerate_known_types(&self) -> Vec<u32> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_type.keys().copied().sorted().collect()
    }

    /// Registrations for `type_id`, ordered with the one `resolve` picks first.
    pub fn registrations(&self, type_id: u32) -> Vec<Registration> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_type
            .get(&type_id)
            .map(|registrations| {
                registrations
                    .iter()
                    .copied()
                    .sorted_by_key(|r| std::cmp::Reverse(r.precedence()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for ResourceTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResourceTypeRegistry")
            .field("known_types", &self.enumerate_known_types().len())
            .field("fallback", &self.fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_resolves_to_fallback() {
        let registry = ResourceTypeRegistry::new();
        let factory = registry.resolve(0xDEADBEEF);
        assert_eq!(factory.type_name(), registry.fallback().type_name());
        assert_eq!(
            factory.create(ApiVersion::CURRENT).codec_name(),
            RawResource::NAME
        );
    }

    #[test]
    fn test_defaults_register_clip_header() {
        let registry = ResourceTypeRegistry::with_defaults();
        assert_eq!(registry.enumerate_known_types(), vec![ClipHeader::TYPE_ID]);
        assert_eq!(
            registry
                .resolve(ClipHeader::TYPE_ID)
                .create(ApiVersion::CURRENT)
                .codec_name(),
            ClipHeader::NAME
        );
    }

    #[test]
    fn test_registrations_are_ordered_by_precedence() {
        let registry = ResourceTypeRegistry::new();
        registry.register_codec::<ClipHeader>(1, 5);
        registry.register_codec::<RawResource>(1, 5);
        registry.register_codec::<ClipHeader>(1, -3);

        let priorities = registry
            .registrations(1)
            .iter()
            .map(|r| (r.priority, r.sequence))
            .collect::<Vec<_>>();
        assert_eq!(priorities, vec![(5, 1), (5, 0), (-3, 2)]);
        assert!(registry.registrations(2).is_empty());
    }

    #[test]
    fn test_enumerate_excludes_fallback_and_sorts() {
        let registry = ResourceTypeRegistry::new();
        assert!(registry.enumerate_known_types().is_empty());
        registry.register_codec::<RawResource>(30, 0);
        registry.register_codec::<RawResource>(10, 0);
        registry.register_codec::<RawResource>(20, 0);
        registry.register_codec::<RawResource>(10, 1);
        assert_eq!(registry.enumerate_known_types(), vec![10, 20, 30]);
    }
}
