use crate::literal::parse_literal;
use crate::{Count, JumpKind, ModKind, Op, OpKind, SettingMode};
use bitloom_base::{fail, Error, ErrorKind, Result};
use bitloom_bits::Encoding;
use tracing::debug;

struct Scan<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scan<'a> {
    fn bad(&self, at: usize, what: &str) -> Error {
        let tail: String = String::from_utf8_lossy(&self.src[at..]).chars().take(20).collect();
        fail(
            ErrorKind::InvalidPattern,
            format!("{} at position {}: {:?}...", what, at, tail),
        )
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8, at: usize) -> Result<()> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.bad(at, &format!("expected {:?}", b as char)))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn digits(&mut self, at: usize) -> Result<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.bad(at, "expected a number"));
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .expect("digits are ascii")
            .parse()
            .map_err(|_| self.bad(at, "number out of range"))
    }

    /// Consume up to and including the delimiter, returning the text before it.
    fn until(&mut self, delim: u8, at: usize) -> Result<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == delim {
                let body = std::str::from_utf8(&self.src[start..self.pos])
                    .map_err(|_| self.bad(at, "pattern is not valid utf-8"))?;
                self.pos += 1;
                return Ok(body);
            }
            self.pos += 1;
        }
        Err(self.bad(at, &format!("unterminated token, expected {:?}", delim as char)))
    }

    fn tok(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn label(&mut self, at: usize) -> Result<String> {
        let name = self.until(b'"', at)?;
        if name.is_empty() {
            return Err(self.bad(at, "empty label name"));
        }
        Ok(name.to_string())
    }

    fn hex_literal(&mut self, at: usize) -> Result<Vec<u8>> {
        let digits = self.until(b'"', at)?;
        if digits.is_empty() || digits.len() % 2 != 0 {
            return Err(self.bad(at, "marker literal needs an even count of hex digits"));
        }
        digits
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                let hi = (pair[0] as char).to_digit(16);
                let lo = (pair[1] as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => Ok(((hi << 4) | lo) as u8),
                    _ => Err(self.bad(at, "marker literal is not hex")),
                }
            })
            .collect()
    }

    /// Width of an integer-backed value token; capped at 128 bits.
    fn int_width(&mut self, at: usize) -> Result<u64> {
        let n = self.digits(at)?;
        if n > 128 {
            return Err(self.bad(at, "integer-backed widths are limited to 128 bits"));
        }
        Ok(n)
    }

    /// Width of a byte-backed value token; whole-byte widths are unbounded,
    /// anything else must fit the 128-bit integer path.
    fn byte_width(&mut self, at: usize) -> Result<u64> {
        let n = self.digits(at)?;
        if n % 8 != 0 && n > 128 {
            return Err(self.bad(at, "fractional-byte widths are limited to 128 bits"));
        }
        Ok(n)
    }

    /// The `<n>` or `$` after a `r<m>.` / `i<m>.` / `p<m>.` prefix.
    fn size_or_rest(&mut self, at: usize) -> Result<Option<u64>> {
        if self.eat(b'$') {
            Ok(None)
        } else {
            Ok(Some(self.digits(at)?))
        }
    }

    fn mod_tok(&mut self, kind: ModKind, at: usize) -> Result<OpKind> {
        if self.eat(b'$') {
            return Ok(OpKind::Mod { bits: None, kind });
        }
        let m = self.digits(at)?;
        if self.eat(b'.') {
            Ok(OpKind::ModOff { offset: m, bits: self.size_or_rest(at)?, kind })
        } else {
            Ok(OpKind::Mod { bits: Some(m), kind })
        }
    }

    fn setting(&mut self, at: usize) -> Result<SettingMode> {
        match self.peek() {
            Some(b'y') => {
                self.pos += 1;
                Ok(SettingMode::On)
            }
            Some(b'n') => {
                self.pos += 1;
                Ok(SettingMode::Off)
            }
            Some(b't') => {
                self.pos += 1;
                Ok(SettingMode::Toggle)
            }
            _ => Err(self.bad(at, "settings take one of y, n, t")),
        }
    }
}

/// Compile a pattern string into the op tree the maker executes.
pub fn compile(pattern: &str) -> Result<Vec<Op>> {
    let mut s = Scan { src: pattern.as_bytes(), pos: 0 };
    // Repetition groups under construction; index 0 is the top level.
    let mut frames: Vec<Vec<Op>> = vec![Vec::new()];

    loop {
        s.skip_ws();
        let at = s.pos;
        let Some(c) = s.peek() else { break };
        s.pos += 1;

        let kind = match c {
            b'[' => Some(OpKind::NestOpen),
            b']' => Some(OpKind::NestClose),
            b'{' => {
                frames.push(Vec::new());
                None
            }
            b'}' => {
                if frames.len() < 2 {
                    return Err(s.bad(at, "unmatched }"));
                }
                let body = frames.pop().expect("checked above");
                let count = if s.eat(b'$') {
                    Count::Unbounded
                } else {
                    Count::Times(s.digits(at)?)
                };
                let tok = s.tok(at);
                debug!(target: "bitloom", "token {:?} ({} ops)", tok, body.len());
                frames
                    .last_mut()
                    .expect("top level frame always present")
                    .push(Op { tok, kind: OpKind::Repeat { count, body } });
                None
            }
            b'u' => Some(OpKind::Value { bits: s.int_width(at)?, enc: Encoding::UInt }),
            b's' => Some(OpKind::Value { bits: s.int_width(at)?, enc: Encoding::SInt }),
            b'x' => Some(OpKind::Value { bits: s.int_width(at)?, enc: Encoding::HexLower }),
            b'X' => Some(OpKind::Value { bits: s.int_width(at)?, enc: Encoding::HexUpper }),
            b'b' => Some(OpKind::Value { bits: s.int_width(at)?, enc: Encoding::Bin }),
            b'f' => {
                let bits = s.digits(at)?;
                let enc = match bits {
                    32 => Encoding::F32,
                    64 => Encoding::F64,
                    _ => return Err(s.bad(at, "float widths are 32 or 64")),
                };
                Some(OpKind::Value { bits, enc })
            }
            b'B' => {
                if s.eat(b'$') {
                    Some(OpKind::TakeAll { enc: Encoding::Bytes })
                } else {
                    Some(OpKind::Value { bits: s.byte_width(at)?, enc: Encoding::Bytes })
                }
            }
            b'C' => {
                if s.eat(b'$') {
                    Some(OpKind::TakeAll { enc: Encoding::Char })
                } else {
                    Some(OpKind::Value { bits: s.byte_width(at)?, enc: Encoding::Char })
                }
            }
            b'z' => Some(OpKind::Zeros { bits: s.digits(at)? }),
            b'o' => Some(OpKind::Ones { bits: s.digits(at)? }),
            b'n' => Some(OpKind::Next { bits: s.digits(at)? }),
            b'r' => Some(s.mod_tok(ModKind::Reverse, at)?),
            b'i' => Some(s.mod_tok(ModKind::Invert, at)?),
            b'p' => {
                let m = s.digits(at)?;
                s.expect(b'.', at)?;
                Some(OpKind::ModOff { offset: m, bits: s.size_or_rest(at)?, kind: ModKind::Pull })
            }
            b'e' => {
                let bits = s.digits(at)?;
                if bits % 8 != 0 {
                    return Err(fail(
                        ErrorKind::EndianWidth,
                        format!("endian swap width {} is not a multiple of 8", bits),
                    ));
                }
                Some(OpKind::Mod { bits: Some(bits), kind: ModKind::EndianSwap })
            }
            b'R' => Some(OpKind::SetAll { kind: ModKind::Reverse, mode: s.setting(at)? }),
            b'I' => Some(OpKind::SetAll { kind: ModKind::Invert, mode: s.setting(at)? }),
            b'E' => Some(OpKind::SetAll { kind: ModKind::EndianSwap, mode: s.setting(at)? }),
            b'#' => {
                if s.eat(b'"') {
                    Some(OpKind::SetLabel(s.label(at)?))
                } else if s.eat(b'#') {
                    while !matches!(s.peek(), None | Some(b'\n')) {
                        s.pos += 1;
                    }
                    None
                } else {
                    return Err(s.bad(at, "expected #\"label\" or ## comment"));
                }
            }
            b'!' => {
                s.expect(b'#', at)?;
                s.expect(b'"', at)?;
                let label = s.label(at)?;
                s.skip_ws();
                s.expect(b'=', at)?;
                let value = parse_literal(s.until(b';', at)?)?;
                Some(OpKind::DefLabel(label, value))
            }
            b'=' => {
                if s.eat(b'#') {
                    s.expect(b'"', at)?;
                    Some(OpKind::MatchLabel(s.label(at)?))
                } else {
                    Some(OpKind::Assert(parse_literal(s.until(b';', at)?)?))
                }
            }
            b'm' => {
                let start = s.eat(b'^');
                if !start {
                    s.expect(b'$', at)?;
                }
                s.expect(b'"', at)?;
                let lit = s.hex_literal(at)?;
                Some(if start { OpKind::MarkerStart(lit) } else { OpKind::MarkerEnd(lit) })
            }
            b'j' => {
                let kind = match s.peek() {
                    Some(b's') => Some(JumpKind::Start),
                    Some(b'f') => Some(JumpKind::Forward),
                    Some(b'b') => Some(JumpKind::Backward),
                    Some(b'e') => Some(JumpKind::End),
                    Some(b'$') => None,
                    _ => return Err(s.bad(at, "expected js/jf/jb/je/j$")),
                };
                s.pos += 1;
                match kind {
                    Some(kind) => Some(OpKind::Jump { bits: s.digits(at)?, kind }),
                    None => Some(OpKind::JumpEnd(s.digits(at)? as usize)),
                }
            }
            _ => return Err(s.bad(at, "unknown token")),
        };

        if let Some(kind) = kind {
            let tok = s.tok(at);
            debug!(target: "bitloom", "token {:?}", tok);
            frames
                .last_mut()
                .expect("top level frame always present")
                .push(Op { tok, kind });
        }
    }

    if frames.len() != 1 {
        return Err(fail(ErrorKind::InvalidPattern, "unterminated { repetition"));
    }
    Ok(frames.pop().expect("top level frame"))
}
