//! Pre-pass rejecting floats JSON cannot represent.
//!
//! `serde_json` writes NaN and infinities as `null`, which silently changes
//! the payload. [`FiniteFloats`] walks a value without producing output and
//! fails on the first non-finite float, map keys and values alike.

use serde::Serialize;
use serde::de::value::Error as CheckError;
use serde::ser::{self, Error as _};

type CheckResult = Result<(), CheckError>;

/// Output-less serializer that only inspects floats.
pub(super) struct FiniteFloats;

fn check(value: f64) -> CheckResult {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CheckError::custom(format_args!(
            "{value} cannot be represented in JSON"
        )))
    }
}

macro_rules! accept {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, _: $ty) -> CheckResult {
                Ok(())
            }
        )*
    };
}

impl ser::Serializer for FiniteFloats {
    type Ok = ();
    type Error = CheckError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    accept! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    }

    fn serialize_f32(self, v: f32) -> CheckResult {
        check(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> CheckResult {
        check(v)
    }

    fn serialize_none(self) -> CheckResult {
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> CheckResult {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> CheckResult {
        Ok(())
    }

    fn serialize_newtype_struct<T>(self, _: &'static str, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, CheckError> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, CheckError> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, CheckError> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, CheckError> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, CheckError> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, CheckError> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, CheckError> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_element<T>(&mut self, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_element<T>(&mut self, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T>(&mut self, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T>(&mut self, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_key<T>(&mut self, key: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        key.serialize(FiniteFloats)
    }

    fn serialize_value<T>(&mut self, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T>(&mut self, _: &'static str, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T>(&mut self, _: &'static str, value: &T) -> CheckResult
    where
        T: ?Sized + Serialize,
    {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}
