use crate::state::{Core, JumpFrame, LabelBinding, LogKind, MarkerFrame};
use crate::Maker;
use bitloom_base::{err, fail, flatten, ErrorKind, Node, Result, Value};
use bitloom_bits::{encode_uint, BitBuf, Encoding, Whence};
use bitloom_pattern::{compile, Count, JumpKind, ModKind, Op, OpKind, SettingMode};
use tracing::debug;

/// The construction-direction maker: executes the same patterns against a
/// flattened value stream, writing bits into an initially empty buffer.
/// Every modification is recorded rather than applied; finalize replays the
/// log in reverse temporal order to produce the target layout.
#[derive(Debug)]
pub struct Constructor {
    pub(crate) core: Core,
    stream: Vec<Value>,
    stream_pos: usize,
    structure: String,
}

impl Constructor {
    pub fn new(tree: &[Node]) -> Self {
        let (stream, structure) = flatten(tree);
        Constructor {
            core: Core::new(BitBuf::empty()),
            stream,
            stream_pos: 0,
            structure,
        }
    }

    pub fn structure_pattern(&self) -> &str {
        &self.structure
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.core.bits.into_bytes()
    }

    /// Check balance, require the value stream to be fully consumed, then
    /// replay the modification log in reverse. Reverse order is what makes
    /// one program serve both directions: extraction applied each operation
    /// before reading past it and never revisited bits behind the cursor,
    /// so writing everything first and undoing the log back-to-front lands
    /// every bit in its format position.
    pub fn finalize(&mut self) -> Result<()> {
        self.core.check_not_finalized()?;
        if self.core.index_stack.len() != 1 {
            return Err(fail(ErrorKind::Nesting, "a \"[\" was never closed"));
        }
        if self.stream_pos != self.stream.len() {
            return Err(fail(
                ErrorKind::IncompleteData,
                format!(
                    "blueprint consumed {} of {} values",
                    self.stream_pos,
                    self.stream.len()
                ),
            ));
        }
        let pos = self.core.bits.tell();
        let len = self.core.bits.bit_len();
        for rec in self.core.log.iter().rev() {
            let s = rec.start + rec.offset;
            if s > len {
                return Err(err(format!(
                    "modification at bit {} lies outside the {}-bit result",
                    s, len
                )));
            }
            let n = rec.bits.unwrap_or(len - s);
            if s + n > len {
                return Err(err(format!(
                    "modification of {} bits at {} lies outside the {}-bit result",
                    n, s, len
                )));
            }
            match rec.kind {
                LogKind::EndianCheck => {
                    if n % 8 != 0 {
                        return Err(fail(
                            ErrorKind::EndianWidth,
                            format!("endian swap width {} is not a multiple of 8", n),
                        ));
                    }
                }
                LogKind::Reverse => {
                    self.core.bits.seek(s as i64, Whence::Set)?;
                    self.core.bits.reverse(Some(n))?;
                }
                LogKind::Invert => {
                    self.core.bits.seek(s as i64, Whence::Set)?;
                    self.core.bits.invert(Some(n))?;
                }
            }
        }
        self.core.bits.seek(pos as i64, Whence::Set)?;
        self.core.finalized = true;
        Ok(())
    }

    // Value stream consumption.

    fn pop_value(&mut self, tok: &str) -> Result<Value> {
        let value = self.stream.get(self.stream_pos).cloned().ok_or_else(|| {
            fail(
                ErrorKind::IncompleteData,
                format!("{}: the value stream ran dry", tok),
            )
        })?;
        self.stream_pos += 1;
        self.core.rec_push(Node::Leaf(value.clone()));
        self.core.last = Some(Node::Leaf(value.clone()));
        self.core.last_tree_index = Some(self.core.index_stack.clone());
        *self.core.index_stack.last_mut().expect("index stack") += 1;
        Ok(value)
    }

    fn pop_size(&mut self, tok: &str) -> Result<u64> {
        let value = self.pop_value(tok)?;
        value
            .as_u64()
            .ok_or_else(|| err(format!("{}: expected a bit count, got {:?}", tok, value)))
    }

    fn nest_open(&mut self) {
        self.core.rec_nest_open();
        self.core.index_stack.push(0);
    }

    fn nest_close(&mut self, tok: &str) -> Result<()> {
        if self.core.index_stack.len() < 2 {
            return Err(fail(
                ErrorKind::Nesting,
                format!("{}: a \"]\" has no matching \"[\"", tok),
            ));
        }
        let record = self.core.rec_nest_close();
        self.core.last = Some(Node::List(record));
        self.core.index_stack.pop();
        *self.core.index_stack.last_mut().expect("index stack") += 1;
        Ok(())
    }

    // Deferred modifications. Construction never touches written bits;
    // settings and mod tokens only append to the log.

    fn sched_settings(&mut self, n: u64, enc: Encoding) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let pos = self.core.bits.tell();
        if self.core.set.reverse {
            let g = self.core.new_group();
            self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(n))?;
        }
        if self.core.set.invert {
            let g = self.core.new_group();
            self.core.push_rec(g, LogKind::Invert, pos, 0, Some(n))?;
        }
        if self.core.set.endian && enc != Encoding::Char {
            self.sched_endian_swap(n)?;
        }
        Ok(())
    }

    fn sched_endian_swap(&mut self, n: u64) -> Result<()> {
        let pos = self.core.bits.tell();
        let g = self.core.new_group();
        self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(n))?;
        let mut i = 0;
        while i < n {
            self.core.push_rec(g, LogKind::Reverse, pos, i, Some(8))?;
            i += 8;
        }
        // Appended last so the reversed replay checks the width first.
        self.core.push_rec(g, LogKind::EndianCheck, pos, 0, Some(n))?;
        Ok(())
    }

    fn sched_pull(&mut self, tok: &str, m: u64, n: Option<u64>) -> Result<u64> {
        let n = match n {
            Some(n) => n,
            None => self.pop_size(tok)?,
        };
        let pos = self.core.bits.tell();
        let g = self.core.new_group();
        self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(m + n))?;
        self.core.push_rec(g, LogKind::Reverse, pos, 0, Some(n))?;
        self.core.push_rec(g, LogKind::Reverse, pos, n, Some(m))?;
        Ok(n)
    }

    /// Encode and write one value, scheduling the active settings over its
    /// span first.
    fn insert_bits(&mut self, u: u128, n: u64, enc: Encoding) -> Result<()> {
        self.sched_settings(n, enc)?;
        self.core.bits.write(u, n as i64)
    }

    fn write_zero_run(&mut self, n: u64) -> Result<()> {
        let mut left = n;
        while left > 0 {
            let take = left.min(128);
            self.core.bits.write(0, take as i64)?;
            left -= take;
        }
        Ok(())
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
                let value = self.pop_value(tok)?;
                debug!(target: "bitloom", "{} = {:?}", tok, value);
                if *bits > 128 {
                    let Value::Bytes(data) = &value else {
                        return Err(err(format!(
                            "{}: expected a bytes value, got {}",
                            tok,
                            value.kind_name()
                        )));
                    };
                    if data.len() as u64 * 8 != *bits {
                        return Err(err(format!(
                            "{}: value is {} bits, token wants {}",
                            tok,
                            data.len() * 8,
                            bits
                        )));
                    }
                    self.sched_settings(*bits, *enc)?;
                    self.core.bits.write_span(data)?;
                } else {
                    let u = encode_uint(&value, *bits, *enc)?;
                    self.insert_bits(u, *bits, *enc)?;
                }
            }
            OpKind::TakeAll { enc } => {
                let pos = self.core.bits.tell();
                if pos % 8 != 0 {
                    return Err(fail(
                        ErrorKind::Alignment,
                        format!("{} requires the cursor to sit on a byte boundary", tok),
                    ));
                }
                let value = self.pop_value(tok)?;
                let Value::Bytes(data) = &value else {
                    return Err(err(format!(
                        "{}: expected a bytes value, got {}",
                        tok,
                        value.kind_name()
                    )));
                };
                self.sched_settings(data.len() as u64 * 8, *enc)?;
                self.core.bits.write_span(data)?;
            }
            OpKind::Next { bits } => self.write_zero_run(*bits)?,
            OpKind::Zeros { bits } => {
                self.sched_settings(*bits, Encoding::UInt)?;
                self.write_zero_run(*bits)?;
            }
            OpKind::Ones { bits } => {
                self.sched_settings(*bits, Encoding::UInt)?;
                let mut left = *bits;
                while left > 0 {
                    let take = left.min(128);
                    let ones = if take == 128 { u128::MAX } else { (1u128 << take) - 1 };
                    self.core.bits.write(ones, take as i64)?;
                    left -= take;
                }
            }
            OpKind::Mod { bits, kind } => {
                let pos = self.core.bits.tell();
                match kind {
                    ModKind::Reverse => {
                        let g = self.core.new_group();
                        self.core.push_rec(g, LogKind::Reverse, pos, 0, *bits)?;
                    }
                    ModKind::Invert => {
                        let g = self.core.new_group();
                        self.core.push_rec(g, LogKind::Invert, pos, 0, *bits)?;
                    }
                    ModKind::EndianSwap => {
                        let n = bits.ok_or_else(|| {
                            err(format!("{}: endian swap needs an explicit width", tok))
                        })?;
                        self.sched_endian_swap(n)?;
                    }
                    ModKind::Pull => return Err(err(format!("{}: pull needs an offset", tok))),
                }
            }
            OpKind::ModOff { offset, bits, kind } => match kind {
                ModKind::Pull => {
                    self.sched_pull(tok, *offset, *bits)?;
                }
                ModKind::Reverse | ModKind::Invert => {
                    let n = match bits {
                        Some(n) => Some(*n),
                        None => Some(self.pop_size(tok)?),
                    };
                    let pos = self.core.bits.tell();
                    let g = self.core.new_group();
                    let log_kind = if *kind == ModKind::Reverse {
                        LogKind::Reverse
                    } else {
                        LogKind::Invert
                    };
                    self.core.push_rec(g, log_kind, pos, *offset, n)?;
                }
                ModKind::EndianSwap => {
                    return Err(err(format!("{}: endian swap takes no offset", tok)))
                }
            },
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
            OpKind::NestClose => self.nest_close(tok)?,
            OpKind::SetLabel(name) => {
                let node = self
                    .core
                    .last
                    .clone()
                    .ok_or_else(|| err(format!("{}: no value to label", tok)))?;
                let binding = LabelBinding {
                    node,
                    tree_index: self.core.last_tree_index.clone(),
                    stream_index: self.stream_pos.checked_sub(1),
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
                    while self.stream_pos < self.stream.len() {
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

    /// Pop `[m n]`, schedule the pull that extraction performed, and write
    /// the literal (settings scheduled over its span).
    fn marker_start(&mut self, tok: &str, lit: &[u8]) -> Result<()> {
        let pos = self.core.bits.tell();
        if pos % 8 != 0 {
            return Err(fail(
                ErrorKind::Alignment,
                format!("{} requires the cursor to sit on a byte boundary", tok),
            ));
        }
        let lit_bits = lit.len() as u64 * 8;
        self.nest_open();
        let m = self.pop_size(tok)?;
        let n = self.pop_size(tok)?;
        self.nest_close(tok)?;
        self.sched_pull(tok, m, Some(lit_bits + n))?;
        self.sched_settings(lit_bits, Encoding::Bytes)?;
        self.core.bits.write_span(lit)?;
        debug!(target: "bitloom", "{}: offset {} bits, {} bits follow", tok, m, n);
        self.core.markers.push(MarkerFrame {
            lit: lit.to_vec(),
            pos,
            body_bits: lit_bits + n,
        });
        Ok(())
    }

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

    /// Same target algebra as extraction, over the scheduled log. The
    /// buffer only holds what has been written so far, so end-relative
    /// jumps cannot be resolved while constructing.
    fn jump(&mut self, tok: &str, k: u64, kind: JumpKind) -> Result<()> {
        let pos = self.core.bits.tell();
        if pos % 8 != 0 {
            return Err(fail(
                ErrorKind::Alignment,
                format!("{} requires the cursor to sit on a byte boundary", tok),
            ));
        }
        let fmt = match kind {
            JumpKind::Start => Some(k),
            JumpKind::Forward => self.core.to_format(pos).checked_add(k),
            JumpKind::Backward => self.core.to_format(pos).checked_sub(k),
            JumpKind::End => {
                return Err(fail(
                    ErrorKind::NonConstructibleJump,
                    format!("{}: end-relative jumps cannot be constructed", tok),
                ))
            }
        };
        let fmt = fmt.ok_or_else(|| {
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
                format!("{}: target bit {} was already constructed (cursor {})", tok, target, pos),
            ));
        }
        let body_bits = if target > pos {
            Some(self.sched_pull(tok, target - pos, None)?)
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

impl Maker for Constructor {
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
        self.stream_pos
    }

    fn at_eof(&self) -> bool {
        self.stream_pos >= self.stream.len()
    }

    fn bytes(&self) -> Vec<u8> {
        self.core.bits.as_bytes().to_vec()
    }
}
