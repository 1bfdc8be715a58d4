use crate::codec::{CodecError, FieldError, FieldKey, FieldValue, ResourceCodec, TypedValue};
use crate::ApiVersion;

/// Opaque resource bytes.
///
/// The codec of last resort: it accepts any input and serializes it back unchanged, so resources
/// of unknown types survive a load/save cycle byte for byte.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResource {
    pub data: Vec<u8>,
}

impl RawResource {
    pub const NAME: &'static str = "raw";
    const FIELDS: &'static [&'static str] = &["data"];
}

impl ResourceCodec for RawResource {
    fn parse(_api_version: ApiVersion, bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            data: bytes.to_vec(),
        })
    }

    fn create(_api_version: ApiVersion) -> Self {
        Self::default()
    }

    fn codec_name(&self) -> &'static str {
        Self::NAME
    }

    fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.data.clone())
    }

    fn field_names(&self) -> Vec<String> {
        Self::FIELDS.iter().map(|f| f.to_string()).collect()
    }

    fn get_field(&self, key: FieldKey) -> Result<TypedValue, FieldError> {
        key.resolve(Self::FIELDS)?;
        Ok(TypedValue::bytes(self.data.clone()))
    }

    fn set_field(&mut self, key: FieldKey, value: TypedValue) -> Result<(), FieldError> {
        let index = key.resolve(Self::FIELDS)?;
        let actual = value.value.kind();
        match value.value {
            FieldValue::Bytes(data) => {
                self.data = data;
                Ok(())
            }
            _ => Err(FieldError::TypeMismatch {
                field: Self::FIELDS[index].to_string(),
                expected: "bytes",
                actual,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_resource_preserves_bytes() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        let raw = RawResource::parse(ApiVersion::CURRENT, &bytes).unwrap();
        assert_eq!(raw.serialize().unwrap(), bytes);
        assert_eq!(raw.get_field(FieldKey::Index(0)).unwrap().as_bytes(), Some(&bytes[..]));
    }

    #[test]
    fn test_raw_resource_set_field() {
        let mut raw = RawResource::create(ApiVersion::CURRENT);
        raw.set_field("data".into(), TypedValue::bytes(vec![1, 2, 3]))
            .unwrap();
        assert_eq!(raw.serialize().unwrap(), vec![1, 2, 3]);

        assert!(matches!(
            raw.set_field("data".into(), TypedValue::integer(1, "u32")),
            Err(FieldError::TypeMismatch { expected: "bytes", .. })
        ));
        assert_eq!(raw.field_names(), vec!["data".to_string()]);
    }
}
