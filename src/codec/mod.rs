//! The contract between the package layer and type-specific resource codecs.
//!
//! A codec turns the decompressed bytes of one resource into an editable value and back. Besides
//! its own typed API, every codec exposes its content as an ordered list of named fields, so
//! generic tooling can inspect and edit resources it knows nothing about.

use std::fmt::Debug;
use std::io;

use thiserror::Error;

use crate::ApiVersion;

pub mod clip_header;
pub mod raw_resource;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Unsupported version {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Expected {expected} bytes, got {actual}")]
    TrailingBytes { expected: usize, actual: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("No field named {0}")]
    UnknownField(String),

    #[error("Field index {index} is out of range, there are {count} fields")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Field {field} holds a {expected}, got a {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Value {value} does not fit field {field}")]
    ValueOutOfRange { field: String, value: String },

    #[error("Invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Addresses a codec field by name or by position in [ResourceCodec::field_names].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldKey<'a> {
    Name(&'a str),
    Index(usize),
}

impl FieldKey<'_> {
    /// Resolves the key against a codec's field list.
    pub fn resolve(&self, fields: &[&str]) -> Result<usize, FieldError> {
        match *self {
            FieldKey::Name(name) => fields
                .iter()
                .position(|field| *field == name)
                .ok_or_else(|| FieldError::UnknownField(name.to_string())),
            FieldKey::Index(index) if index < fields.len() => Ok(index),
            FieldKey::Index(index) => Err(FieldError::IndexOutOfRange {
                index,
                count: fields.len(),
            }),
        }
    }
}

impl<'a> From<&'a str> for FieldKey<'a> {
    fn from(name: &'a str) -> Self {
        FieldKey::Name(name)
    }
}

impl From<usize> for FieldKey<'_> {
    fn from(index: usize) -> Self {
        FieldKey::Index(index)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Bool(_) => "bool",
        }
    }
}

/// A field value plus the logical type it has inside the resource, e.g. `u32` or `f32`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedValue {
    pub value: FieldValue,
    pub type_name: &'static str,
}

impl TypedValue {
    pub fn integer(value: i64, type_name: &'static str) -> Self {
        Self {
            value: FieldValue::Integer(value),
            type_name,
        }
    }

    pub fn float(value: f64, type_name: &'static str) -> Self {
        Self {
            value: FieldValue::Float(value),
            type_name,
        }
    }

    pub fn string<S: Into<String>>(value: S) -> Self {
        Self {
            value: FieldValue::String(value.into()),
            type_name: "string",
        }
    }

    pub fn bytes(value: Vec<u8>) -> Self {
        Self {
            value: FieldValue::Bytes(value),
            type_name: "bytes",
        }
    }

    pub fn bool(value: bool) -> Self {
        Self {
            value: FieldValue::Bool(value),
            type_name: "bool",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            FieldValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// Floats, and integers widened to a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            FieldValue::Float(value) => Some(value),
            FieldValue::Integer(value) => Some(value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            FieldValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            FieldValue::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            FieldValue::Bool(value) => Some(value),
            _ => None,
        }
    }
}

/// A parsed, editable resource.
///
/// `parse` and `create` construct concrete codecs; everything else is usable through
/// `Box<dyn ResourceCodec>`.
pub trait ResourceCodec: Debug + Send + Sync {
    /// Parses the decompressed bytes of a resource.
    fn parse(api_version: ApiVersion, bytes: &[u8]) -> Result<Self, CodecError>
    where
        Self: Sized;

    /// An empty instance for authoring a new resource.
    fn create(api_version: ApiVersion) -> Self
    where
        Self: Sized;

    fn codec_name(&self) -> &'static str;

    fn serialize(&self) -> Result<Vec<u8>, CodecError>;

    fn field_names(&self) -> Vec<String>;

    fn get_field(&self, key: FieldKey) -> Result<TypedValue, FieldError>;

    fn set_field(&mut self, key: FieldKey, value: TypedValue) -> Result<(), FieldError>;

    fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names().iter().position(|field| field == name)
    }
}

pub(crate) fn expect_integer(field: &str, value: &TypedValue) -> Result<i64, FieldError> {
    value.as_i64().ok_or_else(|| FieldError::TypeMismatch {
        field: field.to_string(),
        expected: "integer",
        actual: value.value.kind(),
    })
}

pub(crate) fn expect_u32(field: &str, value: &TypedValue) -> Result<u32, FieldError> {
    let integer = expect_integer(field, value)?;
    u32::try_from(integer).map_err(|_| FieldError::ValueOutOfRange {
        field: field.to_string(),
        value: integer.to_string(),
    })
}

pub(crate) fn expect_f32(field: &str, value: &TypedValue) -> Result<f32, FieldError> {
    value
        .as_f64()
        .map(|float| float as f32)
        .ok_or_else(|| FieldError::TypeMismatch {
            field: field.to_string(),
            expected: "float",
            actual: value.value.kind(),
        })
}
