//! Body decoding.
//!
//! A [`BodyDecoder`] turns raw bytes into a `serde_json::Value` and hands it
//! to a [`DecodeTarget`], which deserializes it into the destination field.
//! Strict decoders can ask the target for its declared field names to reject
//! unknown members.

use serde::de::{self, DeserializeOwned, Visitor};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Not well-formed input.
    Syntax,
    /// Strict mode saw a member the destination does not declare.
    UnknownField,
    /// Strict mode saw bytes after the first complete value.
    TrailingData,
    /// Well-formed, but does not fit the destination type.
    Type,
}

/// Body decoding failure. Always fatal to the bind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid request body: {message}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub message: String,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_unknown_field(&self) -> bool {
        self.kind == DecodeErrorKind::UnknownField
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        let kind = match err.classify() {
            serde_json::error::Category::Data => DecodeErrorKind::Type,
            _ => DecodeErrorKind::Syntax,
        };
        Self::new(kind, err.to_string())
    }
}

/// The body field being decoded.
pub trait DecodeTarget {
    fn accept(&mut self, value: Value) -> Result<(), serde_json::Error>;

    /// Top-level member names the destination declares, when it is a plain struct.
    fn field_names(&self) -> Option<&'static [&'static str]>;
}

/// Converts a raw body into the body field.
pub trait BodyDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], target: &mut dyn DecodeTarget) -> Result<(), DecodeError>;
}

/// JSON body decoder.
///
/// Lenient mode decodes the first complete value and ignores anything after
/// it. Strict mode rejects trailing data and unknown top-level members.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder {
    strict: bool,
}

impl JsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }
}

impl BodyDecoder for JsonDecoder {
    fn decode(&self, bytes: &[u8], target: &mut dyn DecodeTarget) -> Result<(), DecodeError> {
        let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<Value>();
        let value = match stream.next() {
            Some(Ok(value)) => value,
            Some(Err(err)) => return Err(err.into()),
            None => {
                return Err(DecodeError::new(
                    DecodeErrorKind::Syntax,
                    "expected a JSON value",
                ))
            }
        };

        if self.strict {
            let rest = &bytes[stream.byte_offset()..];
            if rest.iter().any(|b| !b.is_ascii_whitespace()) {
                return Err(DecodeError::new(
                    DecodeErrorKind::TrailingData,
                    "unexpected data after the JSON value",
                ));
            }
            if let (Value::Object(members), Some(known)) = (&value, target.field_names()) {
                if let Some(unknown) = members.keys().find(|k| !known.contains(&k.as_str())) {
                    return Err(DecodeError::new(
                        DecodeErrorKind::UnknownField,
                        format!("unknown field `{unknown}`"),
                    ));
                }
            }
        }

        target.accept(value).map_err(DecodeError::from)
    }
}

/// [`DecodeTarget`] over a plain `T` field.
pub struct FieldTarget<'a, T>(pub &'a mut T);

impl<T: DeserializeOwned> DecodeTarget for FieldTarget<'_, T> {
    fn accept(&mut self, value: Value) -> Result<(), serde_json::Error> {
        *self.0 = serde_json::from_value(value)?;
        Ok(())
    }

    fn field_names(&self) -> Option<&'static [&'static str]> {
        struct_fields::<T>()
    }
}

/// [`DecodeTarget`] over an `Option<T>` field; a decoded value is stored as `Some`.
pub struct OptionalTarget<'a, T>(pub &'a mut Option<T>);

impl<T: DeserializeOwned> DecodeTarget for OptionalTarget<'_, T> {
    fn accept(&mut self, value: Value) -> Result<(), serde_json::Error> {
        *self.0 = Some(serde_json::from_value(value)?);
        Ok(())
    }

    fn field_names(&self) -> Option<&'static [&'static str]> {
        struct_fields::<T>()
    }
}

/// Field names serde would accept for `T`, if `T` deserializes as a struct.
///
/// Asks `T`'s `Deserialize` impl to drive a recording deserializer that records
/// the `fields` list passed to `deserialize_struct` and then bails out.
/// Types that go through `deserialize_map` (maps, `#[serde(flatten)]`) or
/// anything else report `None`.
pub fn struct_fields<T: DeserializeOwned>() -> Option<&'static [&'static str]> {
    let mut fields = None;
    if T::deserialize(FieldRecorder {
        fields: &mut fields,
    })
    .is_ok()
    {
        return None;
    }
    fields
}

#[derive(Debug)]
struct RecordingDone;

impl fmt::Display for RecordingDone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("field recording finished")
    }
}

impl std::error::Error for RecordingDone {}

impl de::Error for RecordingDone {
    fn custom<M: fmt::Display>(_msg: M) -> Self {
        RecordingDone
    }
}

struct FieldRecorder<'a> {
    fields: &'a mut Option<&'static [&'static str]>,
}

impl<'de> de::Deserializer<'de> for FieldRecorder<'_> {
    type Error = RecordingDone;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, RecordingDone> {
        Err(RecordingDone)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, RecordingDone> {
        *self.fields = Some(fields);
        Err(RecordingDone)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}
