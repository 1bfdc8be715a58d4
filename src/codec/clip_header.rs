//! Animation clip header resources.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::codec::{
    expect_f32, expect_u32, CodecError, FieldError, FieldKey, FieldValue, ResourceCodec,
    TypedValue,
};
use crate::ApiVersion;

/// The header of an animation clip: timing, root transform and the rig the clip animates.
///
/// Layout, little-endian:
/// `version: u32, flags: u32, duration: f32, rotation: [f32; 4], translation: [f32; 3]`,
/// followed from version 5 upward by a u32-length-prefixed ASCII rig name.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipHeader {
    pub version: u32,
    pub flags: u32,
    /// Clip length in seconds.
    pub duration: f32,
    /// Quaternion, x y z w.
    pub rotation: [f32; 4],
    pub translation: [f32; 3],
    pub rig_name: String,
}

impl ClipHeader {
    pub const TYPE_ID: u32 = 0xBC4A5044;
    pub const NAME: &'static str = "clip_header";

    /// First version carrying a rig name.
    pub const RIG_NAME_MIN_VERSION: u32 = 5;
    pub const CURRENT_VERSION: u32 = 7;

    const FIXED_SIZE: usize = 40;

    const FIELDS: &'static [&'static str] = &[
        "version",
        "flags",
        "duration",
        "rotation_x",
        "rotation_y",
        "rotation_z",
        "rotation_w",
        "translation_x",
        "translation_y",
        "translation_z",
        "rig_name",
    ];

    pub fn has_rig_name(&self) -> bool {
        self.version >= Self::RIG_NAME_MIN_VERSION
    }

    fn read_rig_name(reader: &mut Cursor<&[u8]>) -> Result<String, CodecError> {
        let length = reader.read_u32::<LittleEndian>()? as usize;
        let remaining = reader.get_ref().len() - reader.position() as usize;
        if length > remaining {
            return Err(CodecError::InvalidData(format!(
                "rig name of {length} bytes, only {remaining} left"
            )));
        }

        let mut name = vec![0; length];
        reader.read_exact(&mut name)?;
        if !name.is_ascii() {
            return Err(CodecError::InvalidData("rig name is not ASCII".to_string()));
        }
        Ok(name.into_iter().map(char::from).collect())
    }

    fn f32_field(value: f32) -> TypedValue {
        TypedValue::float(f64::from(value), "f32")
    }
}

impl Default for ClipHeader {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            flags: 0,
            duration: 0.0,
            rotation: [0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
            rig_name: String::new(),
        }
    }
}

impl ResourceCodec for ClipHeader {
    fn parse(_api_version: ApiVersion, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Cursor::new(bytes);

        let version = reader.read_u32::<LittleEndian>()?;
        let flags = reader.read_u32::<LittleEndian>()?;
        let duration = reader.read_f32::<LittleEndian>()?;
        let mut rotation = [0.0; 4];
        reader.read_f32_into::<LittleEndian>(&mut rotation)?;
        let mut translation = [0.0; 3];
        reader.read_f32_into::<LittleEndian>(&mut translation)?;

        let rig_name = if version >= Self::RIG_NAME_MIN_VERSION {
            Self::read_rig_name(&mut reader)?
        } else {
            String::new()
        };

        let consumed = reader.position() as usize;
        if consumed != bytes.len() {
            return Err(CodecError::TrailingBytes {
                expected: consumed,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            version,
            flags,
            duration,
            rotation,
            translation,
            rig_name,
        })
    }

    fn create(_api_version: ApiVersion) -> Self {
        Self::default()
    }

    fn codec_name(&self) -> &'static str {
        Self::NAME
    }

    fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        if !self.has_rig_name() && !self.rig_name.is_empty() {
            return Err(CodecError::InvalidData(format!(
                "version {} cannot store a rig name",
                self.version
            )));
        }

        let mut out = Vec::with_capacity(Self::FIXED_SIZE + 4 + self.rig_name.len());
        out.write_u32::<LittleEndian>(self.version)?;
        out.write_u32::<LittleEndian>(self.flags)?;
        out.write_f32::<LittleEndian>(self.duration)?;
        for value in self.rotation.iter().chain(self.translation.iter()) {
            out.write_f32::<LittleEndian>(*value)?;
        }

        if self.has_rig_name() {
            let length = u32::try_from(self.rig_name.len())
                .map_err(|_| CodecError::InvalidData("rig name is too long".to_string()))?;
            out.write_u32::<LittleEndian>(length)?;
            out.extend_from_slice(self.rig_name.as_bytes());
        }

        Ok(out)
    }

    fn field_names(&self) -> Vec<String> {
        Self::FIELDS.iter().map(|f| f.to_string()).collect()
    }

    fn get_field(&self, key: FieldKey) -> Result<TypedValue, FieldError> {
        Ok(match key.resolve(Self::FIELDS)? {
            0 => TypedValue::integer(i64::from(self.version), "u32"),
            1 => TypedValue::integer(i64::from(self.flags), "u32"),
            2 => Self::f32_field(self.duration),
            i @ 3..=6 => Self::f32_field(self.rotation[i - 3]),
            i @ 7..=9 => Self::f32_field(self.translation[i - 7]),
            _ => TypedValue::string(self.rig_name.clone()),
        })
    }

    fn set_field(&mut self, key: FieldKey, value: TypedValue) -> Result<(), FieldError> {
        let index = key.resolve(Self::FIELDS)?;
        let field = Self::FIELDS[index];

        match index {
            0 => self.version = expect_u32(field, &value)?,
            1 => self.flags = expect_u32(field, &value)?,
            2 => self.duration = expect_f32(field, &value)?,
            i @ 3..=6 => self.rotation[i - 3] = expect_f32(field, &value)?,
            i @ 7..=9 => self.translation[i - 7] = expect_f32(field, &value)?,
            _ => {
                let actual = value.value.kind();
                let FieldValue::String(name) = value.value else {
                    return Err(FieldError::TypeMismatch {
                        field: field.to_string(),
                        expected: "string",
                        actual,
                    });
                };
                if !name.is_ascii() {
                    return Err(FieldError::InvalidValue {
                        field: field.to_string(),
                        reason: "rig names are ASCII".to_string(),
                    });
                }
                if !name.is_empty() && !self.has_rig_name() {
                    return Err(FieldError::InvalidValue {
                        field: field.to_string(),
                        reason: format!("version {} has no rig name", self.version),
                    });
                }
                self.rig_name = name;
            }
        }
        Ok(())
    }
}
