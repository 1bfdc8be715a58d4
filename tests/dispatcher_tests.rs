mod common;

use std::sync::Arc;

use common::{RawPackage, RawRecord};
use dbpf_rs::codec::clip_header::ClipHeader;
use dbpf_rs::codec::{ResourceCodec, TypedValue};
use dbpf_rs::dispatcher::{DispatchError, ResourceDispatcher};
use dbpf_rs::registry::ResourceTypeRegistry;
use dbpf_rs::resource::package::{Package, SaveOptions};
use dbpf_rs::resource::resource_key::ResourceKey;
use dbpf_rs::ApiVersion;

const UNKNOWN_TYPE: u32 = 0x00B2D882;

fn clip(duration: f32, rig_name: &str) -> Vec<u8> {
    ClipHeader {
        duration,
        rig_name: rig_name.to_string(),
        ..ClipHeader::default()
    }
    .serialize()
    .unwrap_or_default()
}

fn dispatcher() -> ResourceDispatcher {
    ResourceDispatcher::new(Arc::new(ResourceTypeRegistry::with_defaults()))
}

#[test]
fn test_unknown_type_round_trips_through_fallback() -> Result<(), Box<dyn std::error::Error>> {
    let opaque = (0..=255u8).rev().collect::<Vec<_>>();
    let raw = RawPackage::new().with(RawRecord::new(UNKNOWN_TYPE, 7, 42, &opaque));
    let mut package = Package::from_memory(raw.build())?;
    let key = ResourceKey::new(UNKNOWN_TYPE, 7, 42);

    let resource = dispatcher().get_resource_by_key(&package, &key, ApiVersion::CURRENT)?;
    assert_eq!(resource.codec().codec_name(), "raw");
    assert!(!resource.is_modified()?);

    resource.store(&mut package, false)?;
    let saved = Package::from_memory(package.to_bytes(&SaveOptions::new())?)?;
    assert_eq!(saved.read_resource(&key)?, opaque);
    Ok(())
}

#[test]
fn test_clip_header_from_package() -> Result<(), Box<dyn std::error::Error>> {
    let key = ResourceKey::new(ClipHeader::TYPE_ID, 0, 0x1234);
    let mut package = Package::create_empty();
    package.add_resource(key, clip(2.5, "adult"), true)?;

    let resource = dispatcher().get_resource_by_key(&package, &key, ApiVersion::CURRENT)?;
    let codec = resource.codec();
    assert_eq!(codec.get_field("version".into())?, TypedValue::integer(7, "u32"));
    assert_eq!(codec.get_field("duration".into())?.as_f64(), Some(2.5));
    assert_eq!(codec.get_field("rig_name".into())?.as_str(), Some("adult"));
    assert_eq!(resource.serialize()?, resource.original_bytes());
    Ok(())
}

#[test]
fn test_batch_reports_partial_success() -> Result<(), Box<dyn std::error::Error>> {
    common::init_tracing();
    let mut package = Package::create_empty();
    for instance in 0..8u64 {
        let key = ResourceKey::new(ClipHeader::TYPE_ID, 0, instance);
        let data = if instance % 3 == 0 {
            b"broken".to_vec()
        } else {
            clip(instance as f32, "")
        };
        package.add_resource(key, data, instance % 2 == 0)?;
    }
    package.add_resource(ResourceKey::new(UNKNOWN_TYPE, 0, 0), vec![1], false)?;

    let batch = dispatcher().get_resources_of_type(&package, ClipHeader::TYPE_ID, ApiVersion::CURRENT);
    assert!(!batch.is_complete());
    assert_eq!(batch.loaded.len(), 5);

    let mut failed = batch.failures.iter().map(|(key, _)| key.instance).collect::<Vec<_>>();
    failed.sort();
    assert_eq!(failed, vec![0, 3, 6]);
    for (key, error) in &batch.failures {
        assert!(matches!(error, DispatchError::CodecParseFailure { .. }));
        assert_eq!(error.key(), Some(*key));
    }
    Ok(())
}

#[test]
fn test_explicit_fallback_retry_after_parse_failure() -> Result<(), Box<dyn std::error::Error>> {
    let key = ResourceKey::new(ClipHeader::TYPE_ID, 0, 1);
    let mut package = Package::create_empty();
    package.add_resource(key, b"not a clip".to_vec(), false)?;
    let entry = package.find(&key).ok_or("missing entry")?;

    let dispatcher = dispatcher();
    assert!(dispatcher
        .get_resource(&package, entry, ApiVersion::CURRENT)
        .is_err());

    let raw = dispatcher.get_default_resource(&package, entry, ApiVersion::CURRENT)?;
    assert_eq!(raw.serialize()?, b"not a clip");

    let recovery = dispatcher.clone().with_always_default(true);
    assert!(recovery.is_always_default());
    assert!(recovery.get_resource(&package, entry, ApiVersion::CURRENT).is_ok());
    Ok(())
}

#[test]
fn test_missing_resource_is_a_package_error() {
    let package = Package::create_empty();
    let result = dispatcher().get_resource_by_key(
        &package,
        &ResourceKey::new(ClipHeader::TYPE_ID, 0, 1),
        ApiVersion::CURRENT,
    );
    assert!(matches!(result, Err(DispatchError::PackageError(_))));
}
