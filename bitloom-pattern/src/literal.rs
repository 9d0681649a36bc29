use bitloom_base::{fail, ErrorKind, Result, Value};

// The expression grammar for `=expr;` and `!#"L"=expr;` is deliberately
// small and closed: integers (decimal or 0x hex, optionally negative),
// floats, quoted byte strings and quoted text. No variable references, no
// operators. Anything else is rejected at tokenize time.

fn bad(s: &str) -> bitloom_base::Error {
    fail(ErrorKind::InvalidPattern, format!("bad literal expression {:?}", s))
}

fn unescape(s: &str, raw: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut it = s.bytes();
    while let Some(b) = it.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match it.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'"') => out.push(b'"'),
            Some(b'x') => {
                let hi = it.next().and_then(|c| (c as char).to_digit(16));
                let lo = it.next().and_then(|c| (c as char).to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(((hi << 4) | lo) as u8),
                    _ => return Err(bad(raw)),
                }
            }
            _ => return Err(bad(raw)),
        }
    }
    Ok(out)
}

fn quoted_body<'a>(s: &'a str, raw: &str) -> Result<&'a str> {
    if s.len() < 2 || !s.ends_with('"') {
        return Err(bad(raw));
    }
    Ok(&s[..s.len() - 1])
}

/// Parse one literal of the fixed expression grammar into a [`Value`].
pub fn parse_literal(expr: &str) -> Result<Value> {
    let s = expr.trim();
    if s.is_empty() {
        return Err(bad(expr));
    }
    if let Some(rest) = s.strip_prefix("b\"") {
        return Ok(Value::Bytes(unescape(quoted_body(rest, expr)?, expr)?));
    }
    if let Some(rest) = s.strip_prefix('"') {
        return Ok(Value::Bytes(unescape(quoted_body(rest, expr)?, expr)?));
    }
    let (neg, mag) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if mag.is_empty() || !mag.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(bad(expr));
    }
    if let Some(hex) = mag.strip_prefix("0x").or_else(|| mag.strip_prefix("0X")) {
        let u = u128::from_str_radix(hex, 16).map_err(|_| bad(expr))?;
        return if neg {
            Ok(Value::SInt(-i128::try_from(u).map_err(|_| bad(expr))?))
        } else {
            Ok(Value::UInt(u))
        };
    }
    if mag.contains(['.', 'e', 'E']) {
        let f: f64 = s.parse().map_err(|_| bad(expr))?;
        return Ok(Value::f64(f));
    }
    let u: u128 = mag.parse().map_err(|_| bad(expr))?;
    if neg {
        Ok(Value::SInt(-i128::try_from(u).map_err(|_| bad(expr))?))
    } else {
        Ok(Value::UInt(u))
    }
}
