#![cfg(feature = "serde")]

use dbpf_rs::resource::resource_key::ResourceKey;

#[test]
fn test_key_serializes_as_hex() -> Result<(), Box<dyn std::error::Error>> {
    let key = ResourceKey::new(0x034AEECB, 0x80000001, 0x00B2D882BEEF);
    let json = serde_json::to_string(&key)?;
    assert_eq!(
        json.to_lowercase(),
        r#"{"resource_type":"0x034aeecb","resource_group":"0x80000001","instance":"0x000000b2d882beef"}"#
    );

    let parsed: ResourceKey = serde_json::from_str(&json)?;
    assert_eq!(parsed, key);
    Ok(())
}
