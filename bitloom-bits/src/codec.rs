use crate::convert::min_bits;
use bitloom_base::{err, HexCase, Result, Value};

/// Wire encodings a value token can ask for. `Char` is `Bytes` except that
/// the endian-swap-all setting leaves it alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    UInt,
    SInt,
    F32,
    F64,
    HexLower,
    HexUpper,
    Bin,
    Bytes,
    Char,
}

fn check_fit(u: u128, bits: u64) -> Result<()> {
    if min_bits(u) > bits {
        return Err(err(format!(
            "value needs {} bits but the token is {} bits wide",
            min_bits(u),
            bits
        )));
    }
    Ok(())
}

fn uint_bytes(u: u128, bits: u64) -> Vec<u8> {
    let n_bytes = bits.div_ceil(8);
    (0..n_bytes)
        .rev()
        .map(|i| (u >> (8 * i)) as u8)
        .collect()
}

/// Interpret a raw unsigned integer of `bits` width as a typed value.
pub fn decode_uint(u: u128, bits: u64, enc: Encoding) -> Result<Value> {
    match enc {
        Encoding::UInt => Ok(Value::UInt(u)),
        Encoding::SInt => {
            if bits == 0 {
                return Err(err("signed values need at least one bit"));
            }
            if bits == 128 {
                return Ok(Value::SInt(u as i128));
            }
            // Two's complement at the token width; the high-bit case stays
            // inside u128 so widths up to 127 cannot overflow.
            let v = if (u >> (bits - 1)) & 1 == 1 {
                -(((1u128 << bits) - u) as i128)
            } else {
                u as i128
            };
            Ok(Value::SInt(v))
        }
        Encoding::F32 => {
            if bits != 32 {
                return Err(err("single precision floats must be 32 bits"));
            }
            Ok(Value::f32(f32::from_bits(u as u32)))
        }
        Encoding::F64 => {
            if bits != 64 {
                return Err(err("double precision floats must be 64 bits"));
            }
            Ok(Value::f64(f64::from_bits(u as u64)))
        }
        Encoding::HexLower => {
            let digits = bits.div_ceil(4) as usize;
            Ok(Value::Hex(format!("{:0width$x}", u, width = digits), HexCase::Lower))
        }
        Encoding::HexUpper => {
            let digits = bits.div_ceil(4) as usize;
            Ok(Value::Hex(format!("{:0width$X}", u, width = digits), HexCase::Upper))
        }
        Encoding::Bin => Ok(Value::Bin(format!("{:0width$b}", u, width = bits as usize))),
        Encoding::Bytes | Encoding::Char => Ok(Value::Bytes(uint_bytes(u, bits))),
    }
}

/// Encode a typed value back into the raw unsigned integer a `bits`-wide
/// token writes. Exact inverse of [`decode_uint`] for matching arguments.
pub fn encode_uint(v: &Value, bits: u64, enc: Encoding) -> Result<u128> {
    match enc {
        Encoding::UInt => {
            let u = v
                .as_uint()
                .ok_or_else(|| err(format!("expected an unsigned value, got {}", v.kind_name())))?;
            check_fit(u, bits)?;
            Ok(u)
        }
        Encoding::SInt => {
            let s = match v {
                Value::SInt(s) => *s,
                Value::UInt(u) => i128::try_from(*u)
                    .map_err(|_| err("unsigned value too large for a signed token"))?,
                other => {
                    return Err(err(format!("expected a signed value, got {}", other.kind_name())))
                }
            };
            if bits == 0 {
                return Err(err("signed values need at least one bit"));
            }
            if bits == 128 {
                return Ok(s as u128);
            }
            let lo = -(1i128 << (bits - 1));
            let hi = (1i128 << (bits - 1)) - 1;
            if s < lo || s > hi {
                return Err(err(format!("{} does not fit in {} signed bits", s, bits)));
            }
            // Reinterpret and mask to the token width; correct for either
            // sign without leaving u128.
            Ok((s as u128) & ((1u128 << bits) - 1))
        }
        Encoding::F32 => match v {
            Value::F32(f) => Ok(f.0.to_bits() as u128),
            other => Err(err(format!("expected an f32 value, got {}", other.kind_name()))),
        },
        Encoding::F64 => match v {
            Value::F64(f) => Ok(f.0.to_bits() as u128),
            other => Err(err(format!("expected an f64 value, got {}", other.kind_name()))),
        },
        Encoding::HexLower | Encoding::HexUpper => match v {
            Value::Hex(s, _) => {
                let u = u128::from_str_radix(s, 16)
                    .map_err(|_| err(format!("bad hex string {:?}", s)))?;
                check_fit(u, bits)?;
                Ok(u)
            }
            other => Err(err(format!("expected a hex value, got {}", other.kind_name()))),
        },
        Encoding::Bin => match v {
            Value::Bin(s) => {
                let u = u128::from_str_radix(s, 2)
                    .map_err(|_| err(format!("bad binary string {:?}", s)))?;
                check_fit(u, bits)?;
                Ok(u)
            }
            other => Err(err(format!("expected a binary value, got {}", other.kind_name()))),
        },
        Encoding::Bytes | Encoding::Char => match v {
            Value::Bytes(b) => {
                if b.len() > 16 {
                    return Err(err("byte value exceeds the 128-bit value limit"));
                }
                let mut u = 0u128;
                for byte in b {
                    u = (u << 8) | *byte as u128;
                }
                check_fit(u, bits)?;
                Ok(u)
            }
            other => Err(err(format!("expected a bytes value, got {}", other.kind_name()))),
        },
    }
}
