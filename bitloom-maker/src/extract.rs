use crate::state::{Core, JumpFrame, LabelBinding, LogKind, MarkerFrame};
use crate::Maker;
use bitloom_base::{err, fail, ErrorKind, Node, Result, Value};
use bitloom_bits::{decode_uint, invert_bytes, reverse_bytes, BitBuf, Encoding, Whence};
use bitloom_pattern::{compile, Count, JumpKind, ModKind, Op, OpKind, SettingMode};
use tracing::debug;

/// The extraction-direction maker: executes patterns against a byte stream,
/// consuming bits and growing a data tree, a flat value stream and the
/// structure pattern that ties them together.
#[derive(Debug)]
pub struct Extractor {
    pub(crate) core: Core,
    tree_open: Vec<Vec<Node>>,
    stream: Vec<Value>,
    structure: String,
}

impl Extractor {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Extractor {
            core: Core::new(BitBuf::new(data.into())),
            tree_open: vec![Vec::new()],
            stream: Vec::new(),
            structure: String::new(),
        }
    }

    /// Check nesting balance and seal the maker. Called by [`crate::extract`];
    /// calling twice is an error.
    pub fn finalize(&mut self) -> Result<()> {
        self.core.check_not_finalized()?;
        if self.tree_open.len() != 1 {
            return Err(fail(ErrorKind::Nesting, "a \"[\" was never closed"));
        }
        self.core.finalized = true;
        Ok(())
    }

    pub fn data_tree(&self) -> &[Node] {
        self.tree_open.first().expect("root list always present")
    }

    pub fn into_data_tree(mut self) -> Vec<Node> {
        std::mem::take(self.tree_open.first_mut().expect("root list always present"))
    }

    pub fn data_stream(&self) -> &[Value] {
        &self.stream
    }

    pub fn structure_pattern(&self) -> &str {
        &self.structure
    }

    // Data insertion: every extracted value lands in the per-call record,
    // the data tree, the flat stream and the structure pattern at once.

    fn insert_leaf(&mut self, v: Value) {
        self.core.rec_push(Node::Leaf(v.clone()));
        self.tree_open
            .last_mut()
            .expect("tree stack is never empty")
            .push(Node::Leaf(v.clone()));
        self.structure.push('.');
        self.stream.push(v.clone());
        self.core.last = Some(Node::Leaf(v));
        self.core.last_tree_index = Some(self.core.index_stack.clone());
        *self.core.index_stack.last_mut().expect("index stack") += 1;
    }

    fn nest_open(&mut self) {
        self.core.rec_nest_open();
        self.tree_open.push(Vec::new());
        self.structure.push('[');
        self.core.index_stack.push(0);
    }

    fn nest_close(&mut self) -> Result<()> {
        if self.tree_open.len() < 2 {
            return Err(fail(ErrorKind::Nesting, "a \"]\" has no matching \"[\""));
        }
        let inner = self.tree_open.pop().expect("depth checked");
        self.tree_open
            .last_mut()
            .expect("depth checked")
            .push(Node::List(inner));
        let record = self.core.rec_nest_close();
        self.core.last = Some(Node::List(record));
        self.structure.push(']');
        self.core.index_stack.pop();
        *self.core.index_stack.last_mut().expect("index stack") += 1;
        Ok(())
    }

    // Bit consumption.

    /// Apply the whole-stream settings in declaration order to the next
    /// `n` bits, logging each as a modification operation.
    fn apply_settings(&mut self, n: u64, enc: Encoding) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let pos = self.core.bits.tell();
        if self.core.set.reverse {
            let g = self.core.new_group();
            self.core.bits.reverse(Some(n))?;
            self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(n))?;
        }
        if self.core.set.invert {
            let g = self.core.new_group();
            self.core.bits.invert(Some(n))?;
            self.core.push_rec(g, LogKind::Invert, pos, 0, Some(n))?;
        }
        if self.core.set.endian && enc != Encoding::Char {
            self.endian_swap(n)?;
        }
        Ok(())
    }

    /// An endian swap is one whole-span reversal plus a reversal of each
    /// byte, which nets out to swapping byte order.
    fn endian_swap(&mut self, n: u64) -> Result<()> {
        if n % 8 != 0 {
            return Err(fail(
                ErrorKind::EndianWidth,
                format!("endian swap width {} is not a multiple of 8", n),
            ));
        }
        let pos = self.core.bits.tell();
        let g = self.core.new_group();
        self.core.bits.reverse(Some(n))?;
        self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(n))?;
        let mut i = 0;
        while i < n {
            self.core.bits.seek((pos + i) as i64, Whence::Set)?;
            self.core.bits.reverse(Some(8))?;
            self.core.push_rec(g, LogKind::Reverse, pos, i, Some(8))?;
            i += 8;
        }
        self.core.bits.seek(pos as i64, Whence::Set)?;
        Ok(())
    }

    /// Read `n` bits through the 128-bit integer path, settings applied.
    fn consume_uint(&mut self, tok: &str, n: u64, enc: Encoding) -> Result<u128> {
        self.apply_settings(n, enc)?;
        let (u, got) = self.core.bits.read(n as i64)?;
        if got != n {
            return Err(fail(
                ErrorKind::IncompleteData,
                format!("{}: wanted {} bits, buffer had {}", tok, n, got),
            ));
        }
        Ok(u)
    }

    /// Read `n` bits (a whole number of bytes) as raw bytes, settings
    /// applied. Used for wide byte tokens and marker literals.
    fn consume_span(&mut self, tok: &str, n: u64, enc: Encoding) -> Result<Vec<u8>> {
        self.apply_settings(n, enc)?;
        if self.core.bits.tell() + n > self.core.bits.bit_len() {
            return Err(fail(
                ErrorKind::IncompleteData,
                format!("{}: wanted {} bits past the end of the buffer", tok, n),
            ));
        }
        self.core.bits.read_span(n)
    }

    /// The triple-reversal pull: rotate the `n` bits sitting `m` bits ahead
    /// back to the cursor. A `None` size means to-end; the computed size is
    /// then inserted as a data value so construction can recover it.
    fn pull(&mut self, m: u64, n: Option<u64>) -> Result<u64> {
        let pos = self.core.bits.tell();
        let len = self.core.bits.bit_len();
        let n = match n {
            Some(n) => n,
            None => {
                if pos + m > len {
                    return Err(fail(
                        ErrorKind::IncompleteData,
                        format!("pull offset {} runs past the end of the buffer", m),
                    ));
                }
                let n = len - pos - m;
                self.insert_leaf(Value::UInt(n as u128));
                n
            }
        };
        let g = self.core.new_group();
        self.core.bits.reverse(Some(m + n))?;
        self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(m + n))?;
        self.core.bits.reverse(Some(n))?;
        self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(n))?;
        self.core.bits.seek((pos + n) as i64, Whence::Set)?;
        self.core.bits.reverse(Some(m))?;
        self.core.push_rec(g, LogKind::Reverse, pos, n, Some(m))?;
        self.core.bits.seek(pos as i64, Whence::Set)?;
        Ok(n)
    }

    // Op execution.

    fn exec_block(&mut self, ops: &[Op]) -> Result<()> {
        for op in ops {
            self.exec(op)?;
        }
        Ok(())
    }

    fn exec(&mut self, op: &Op) -> Result<()> {
        let tok = op.tok.as_str();
        match &op.kind {
            OpKind::Value { bits, enc } => {
                let value = if *bits > 128 {
                    Value::Bytes(self.consume_span(tok, *bits, *enc)?)
                } else {
                    let u = self.consume_uint(tok, *bits, *enc)?;
                    decode_uint(u, *bits, *enc)?
                };
                debug!(target: "bitloom", "{} = {:?}", tok, value);
                self.insert_leaf(value);
            }
            OpKind::TakeAll { enc } => {
                let pos = self.core.bits.tell();
                if pos % 8 != 0 {
                    return Err(fail(
                        ErrorKind::Alignment,
                        format!("{} requires the cursor to sit on a byte boundary", tok),
                    ));
                }
                let n = self.core.bits.bit_len() - pos;
                self.apply_settings(n, *enc)?;
                let (_, _, rest) = self.core.bits.read_bytes()?;
                self.insert_leaf(Value::Bytes(rest));
            }
            OpKind::Next { bits } => {
                self.core.bits.seek(*bits as i64, Whence::Cur)?;
            }
            OpKind::Zeros { bits } => {
                self.apply_settings(*bits, Encoding::UInt)?;
                let mut left = *bits;
                while left > 0 {
                    let take = left.min(128);
                    let (v, got) = self.core.bits.read(take as i64)?;
                    if got != take {
                        return Err(fail(
                            ErrorKind::IncompleteData,
                            format!("{}: wanted {} bits, buffer had {}", tok, take, got),
                        ));
                    }
                    if v != 0 {
                        return Err(fail(
                            ErrorKind::Zeros,
                            format!("{}: expected all zeros, read {:#x}", tok, v),
                        ));
                    }
                    left -= take;
                }
            }
            OpKind::Ones { bits } => {
                self.apply_settings(*bits, Encoding::UInt)?;
                let mut left = *bits;
                while left > 0 {
                    let take = left.min(128);
                    let (v, got) = self.core.bits.read(take as i64)?;
                    if got != take {
                        return Err(fail(
                            ErrorKind::IncompleteData,
                            format!("{}: wanted {} bits, buffer had {}", tok, take, got),
                        ));
                    }
                    let ones = if take == 128 { u128::MAX } else { (1u128 << take) - 1 };
                    if v != ones {
                        return Err(fail(
                            ErrorKind::Ones,
                            format!("{}: expected all ones, read {:#x}", tok, v),
                        ));
                    }
                    left -= take;
                }
            }
            OpKind::Mod { bits, kind } => {
                let pos = self.core.bits.tell();
                let n = match bits {
                    Some(n) => *n,
                    None => self.core.bits.bit_len().saturating_sub(pos),
                };
                match kind {
                    ModKind::Reverse => {
                        let g = self.core.new_group();
                        self.core.bits.reverse(Some(n))?;
                        self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(n))?;
                    }
                    ModKind::Invert => {
                        let g = self.core.new_group();
                        self.core.bits.invert(Some(n))?;
                        self.core.push_rec(g, LogKind::Invert, pos, 0, Some(n))?;
                    }
                    ModKind::EndianSwap => self.endian_swap(n)?,
                    ModKind::Pull => return Err(err(format!("{}: pull needs an offset", tok))),
                }
            }
            OpKind::ModOff { offset, bits, kind } => {
                let pos = self.core.bits.tell();
                match kind {
                    ModKind::Pull => {
                        self.pull(*offset, *bits)?;
                    }
                    ModKind::Reverse | ModKind::Invert => {
                        let n = match bits {
                            Some(n) => *n,
                            None => {
                                let len = self.core.bits.bit_len();
                                if pos + offset > len {
                                    return Err(fail(
                                        ErrorKind::IncompleteData,
                                        format!("{}: offset runs past the end of the buffer", tok),
                                    ));
                                }
                                let n = len - pos - offset;
                                self.insert_leaf(Value::UInt(n as u128));
                                n
                            }
                        };
                        let g = self.core.new_group();
                        self.core.bits.seek((pos + offset) as i64, Whence::Set)?;
                        match kind {
                            ModKind::Reverse => {
                                self.core.bits.reverse(Some(n))?;
                                self.core.push_rec(g, LogKind::Reverse, pos, *offset, Some(n))?;
                            }
                            _ => {
                                self.core.bits.invert(Some(n))?;
                                self.core.push_rec(g, LogKind::Invert, pos, *offset, Some(n))?;
                            }
                        }
                        self.core.bits.seek(pos as i64, Whence::Set)?;
                    }
                    ModKind::EndianSwap => {
                        return Err(err(format!("{}: endian swap takes no offset", tok)))
                    }
                }
            }
            OpKind::SetAll { kind, mode } => {
                let flag = match kind {
                    ModKind::Reverse => &mut self.core.set.reverse,
                    ModKind::Invert => &mut self.core.set.invert,
                    ModKind::EndianSwap => &mut self.core.set.endian,
                    ModKind::Pull => return Err(err(format!("{}: no pull setting", tok))),
                };
                *flag = match mode {
                    SettingMode::On => true,
                    SettingMode::Off => false,
                    SettingMode::Toggle => !*flag,
                };
            }
            OpKind::NestOpen => self.nest_open(),
            OpKind::NestClose => self.nest_close()?,
            OpKind::SetLabel(name) => {
                let node = self
                    .core
                    .last
                    .clone()
                    .ok_or_else(|| err(format!("{}: no value to label", tok)))?;
                let binding = LabelBinding {
                    node,
                    tree_index: self.core.last_tree_index.clone(),
                    stream_index: self.stream.len().checked_sub(1),
                };
                self.core.bind_label(name, binding);
            }
            OpKind::DefLabel(name, value) => {
                self.core.bind_label(
                    name,
                    LabelBinding {
                        node: Node::Leaf(value.clone()),
                        tree_index: None,
                        stream_index: None,
                    },
                );
            }
            OpKind::MatchLabel(name) => self.core.match_label(tok, name)?,
            OpKind::Assert(value) => self.core.assert_last(tok, value)?,
            OpKind::Repeat { count, body } => match count {
                Count::Times(k) => {
                    for _ in 0..*k {
                        self.exec_block(body)?;
                    }
                }
                Count::Unbounded => {
                    while !self.core.bits.at_eof() {
                        self.exec_block(body)?;
                    }
                }
            },
            OpKind::MarkerStart(lit) => self.marker_start(tok, lit)?,
            OpKind::MarkerEnd(lit) => self.marker_end(tok, lit)?,
            OpKind::Jump { bits, kind } => self.jump(tok, *bits, *kind)?,
            OpKind::JumpEnd(i) => self.jump_end(tok, *i)?,
        }
        Ok(())
    }

    /// Scan forward for the literal (as transformed by the active settings),
    /// emit `[m n]`, rotate literal-plus-tail back to the cursor and consume
    /// the literal.
    fn marker_start(&mut self, tok: &str, lit: &[u8]) -> Result<()> {
        let pos = self.core.bits.tell();
        if pos % 8 != 0 {
            return Err(fail(
                ErrorKind::Alignment,
                format!("{} requires the cursor to sit on a byte boundary", tok),
            ));
        }
        let lit_bits = lit.len() as u64 * 8;
        // The buffer holds raw bits; reading applies the settings. The raw
        // image of the literal is therefore the settings applied to it.
        let mut raw = lit.to_vec();
        if self.core.set.invert {
            raw = invert_bytes(&raw);
        }
        if self.core.set.reverse {
            raw = reverse_bytes(&raw);
        }
        if self.core.set.endian {
            raw.reverse();
        }
        let m = self.core.bits.find(&raw)?.ok_or_else(|| {
            fail(ErrorKind::IncompleteData, format!("{}: literal not found", tok))
        })?;
        let len = self.core.bits.bit_len();
        let n = len - pos - m - lit_bits;
        self.nest_open();
        self.insert_leaf(Value::UInt(m as u128));
        self.insert_leaf(Value::UInt(n as u128));
        self.nest_close()?;
        self.pull(m, Some(lit_bits + n))?;
        let got = self.consume_span(tok, lit_bits, Encoding::Bytes)?;
        if got != lit {
            return Err(fail(
                ErrorKind::Assertion,
                format!("{}: consumed marker {:?} does not match the literal", tok, got),
            ));
        }
        debug!(target: "bitloom", "{}: offset {} bits, {} bits follow", tok, m, n);
        self.core.markers.push(MarkerFrame {
            lit: lit.to_vec(),
            pos,
            body_bits: lit_bits + n,
        });
        Ok(())
    }

    /// Close the innermost marker scan: the pattern must have consumed
    /// exactly the literal-plus-tail region, leaving the cursor at the start
    /// of the relocated pre-marker bits.
    fn marker_end(&mut self, tok: &str, lit: &[u8]) -> Result<()> {
        let frame = self
            .core
            .markers
            .pop()
            .ok_or_else(|| err(format!("{}: no open marker scan", tok)))?;
        if frame.lit != lit {
            return Err(fail(
                ErrorKind::Assertion,
                format!("{}: literal does not match the open {:?} scan", tok, frame.lit),
            ));
        }
        let expect = frame.pos + frame.body_bits;
        let at = self.core.bits.tell();
        if at != expect {
            return Err(fail(
                ErrorKind::Assertion,
                format!("{}: cursor at bit {}, marker region ends at {}", tok, at, expect),
            ));
        }
        Ok(())
    }

    fn jump(&mut self, tok: &str, k: u64, kind: JumpKind) -> Result<()> {
        let pos = self.core.bits.tell();
        if pos % 8 != 0 {
            return Err(fail(
                ErrorKind::Alignment,
                format!("{} requires the cursor to sit on a byte boundary", tok),
            ));
        }
        let len = self.core.bits.bit_len();
        let fmt = match kind {
            JumpKind::Start => Some(k),
            JumpKind::Forward => self.core.to_format(pos).checked_add(k),
            JumpKind::Backward => self.core.to_format(pos).checked_sub(k),
            JumpKind::End => len.checked_sub(k),
        };
        let fmt = fmt.filter(|f| *f <= len).ok_or_else(|| {
            fail(
                ErrorKind::NonConstructibleJump,
                format!("{}: target lies outside the stream", tok),
            )
        })?;
        let target = self.core.from_format(fmt);
        debug!(target: "bitloom", "{}: format {} -> buffer {} (cursor {})", tok, fmt, target, pos);
        if target < pos {
            return Err(fail(
                ErrorKind::NonConstructibleJump,
                format!("{}: target bit {} was already parsed (cursor {})", tok, target, pos),
            ));
        }
        let body_bits = if target > pos {
            Some(self.pull(target - pos, None)?)
        } else {
            None
        };
        self.core.jumps.push(JumpFrame { pos, body_bits });
        Ok(())
    }

    fn jump_end(&mut self, tok: &str, i: usize) -> Result<()> {
        let frame = self
            .core
            .jumps
            .get(i)
            .ok_or_else(|| err(format!("{}: no jump with index {}", tok, i)))?
            .clone();
        if let Some(body) = frame.body_bits {
            let expect = frame.pos + body;
            let at = self.core.bits.tell();
            if at != expect {
                return Err(fail(
                    ErrorKind::Assertion,
                    format!("{}: cursor at bit {}, jump region ends at {}", tok, at, expect),
                ));
            }
        }
        Ok(())
    }
}

impl Maker for Extractor {
    fn run(&mut self, pattern: &str) -> Result<Vec<Node>> {
        self.core.check_not_finalized()?;
        let ops = compile(pattern)?;
        self.exec_block(&ops)?;
        Ok(self.core.take_record())
    }

    fn label(&self, name: &str) -> Result<Node> {
        self.core.label(name)
    }

    fn tell_buffer(&self) -> u64 {
        self.core.bits.tell()
    }

    fn tell_stream(&self) -> u64 {
        self.core.to_format(self.core.bits.tell())
    }

    fn index_tree(&self) -> Vec<usize> {
        self.core.index_stack.clone()
    }

    fn index_stream(&self) -> usize {
        self.stream.len()
    }

    fn at_eof(&self) -> bool {
        self.core.bits.at_eof()
    }

    fn bytes(&self) -> Vec<u8> {
        self.core.bits.as_bytes().to_vec()
    }
}
