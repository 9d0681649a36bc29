use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Display case of a hex-string value. The case tag is carried so a value
/// extracted with `X<n>` renders back in upper case; equality ignores it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum HexCase {
    Lower,
    Upper,
}

/// A single decoded datum. Integer-backed encodings top out at 128 bits;
/// byte-backed values are unbounded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    UInt(u128),
    SInt(i128),
    F32(OrderedFloat<f32>),
    F64(OrderedFloat<f64>),
    Hex(String, HexCase),
    Bin(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn f32(v: f32) -> Self {
        Value::F32(OrderedFloat(v))
    }
    pub fn f64(v: f64) -> Self {
        Value::F64(OrderedFloat(v))
    }

    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Value::UInt(u) => Some(*u),
            Value::SInt(s) if *s >= 0 => Some(*s as u128),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_uint().and_then(|u| u64::try_from(u).ok())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Short name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::UInt(_) => "uint",
            Value::SInt(_) => "sint",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Hex(..) => "hex",
            Value::Bin(_) => "bin",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl From<u128> for Value {
    fn from(u: u128) -> Self {
        Value::UInt(u)
    }
}
impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u as u128)
    }
}
impl From<i128> for Value {
    fn from(s: i128) -> Self {
        Value::SInt(s)
    }
}
impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}
impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

fn hex_digits_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes()
            .zip(b.bytes())
            .all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

fn hex_decodes_to(h: &str, b: &[u8]) -> bool {
    if h.len() % 2 != 0 || h.len() / 2 != b.len() {
        return false;
    }
    h.as_bytes()
        .chunks(2)
        .zip(b.iter())
        .all(|(pair, byte)| match (
            (pair[0] as char).to_digit(16),
            (pair[1] as char).to_digit(16),
        ) {
            (Some(hi), Some(lo)) => ((hi << 4) | lo) as u8 == *byte,
            _ => false,
        })
}

// Equality is numeric across the integer variants and across the float
// variants, content-based (case-blind) for hex, and representation-aware
// between hex strings and raw bytes. Everything else only matches its own
// variant. Consistent enough for Eq: reflexive via OrderedFloat, symmetric
// and transitive by construction.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (UInt(a), UInt(b)) => a == b,
            (SInt(a), SInt(b)) => a == b,
            (UInt(a), SInt(b)) | (SInt(b), UInt(a)) => {
                *b >= 0 && *a == *b as u128
            }
            (F32(a), F32(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (F32(a), F64(b)) | (F64(b), F32(a)) => {
                OrderedFloat(a.0 as f64) == *b
            }
            (Hex(a, _), Hex(b, _)) => hex_digits_eq(a, b),
            (Bin(a), Bin(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Hex(h, _), Bytes(b)) | (Bytes(b), Hex(h, _)) => hex_decodes_to(h, b),
            _ => false,
        }
    }
}
impl Eq for Value {}
