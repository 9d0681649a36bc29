use std::collections::BTreeMap;

use bitloom_base::{err, fail, ErrorKind, Node, Result, Value};
use bitloom_bits::BitBuf;

/// The three whole-stream settings. Applied (or scheduled) in declaration
/// order before every value-consuming token.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Settings {
    pub(crate) reverse: bool,
    pub(crate) invert: bool,
    pub(crate) endian: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LogKind {
    Reverse,
    Invert,
    /// Width sanity check for a deferred endian swap; replayed first (the
    /// log is replayed in reverse) and ignored by coordinate translation.
    EndianCheck,
}

/// One record of the modification log. `start + offset` addresses the
/// affected bit range; `bits = None` resolves to "to buffer end" at replay
/// or translation time. Records appended by a single executed token share a
/// `group`.
#[derive(Clone, Debug)]
pub(crate) struct LogRec {
    pub(crate) group: u64,
    pub(crate) kind: LogKind,
    pub(crate) start: u64,
    pub(crate) offset: u64,
    pub(crate) bits: Option<u64>,
}

/// One binding of a label: the bound datum plus, for extraction-time
/// bindings, where it sits in the tree and the flat stream.
#[derive(Clone, Debug)]
pub struct LabelBinding {
    pub node: Node,
    pub tree_index: Option<Vec<usize>>,
    pub stream_index: Option<usize>,
}

/// Bookkeeping for an open `m^"..."` scan, checked by the matching `m$`.
#[derive(Clone, Debug)]
pub(crate) struct MarkerFrame {
    pub(crate) lit: Vec<u8>,
    pub(crate) pos: u64,
    /// Literal width plus pulled tail bits; the relocated pre-marker region
    /// begins at `pos + body_bits`.
    pub(crate) body_bits: u64,
}

/// Bookkeeping for one executed jump, checked by `j$<i>`.
#[derive(Clone, Debug)]
pub(crate) struct JumpFrame {
    pub(crate) pos: u64,
    /// Pulled bits ahead of the relocated region; `None` when the jump was
    /// a no-op (zero offset), in which case `j$` checks nothing.
    pub(crate) body_bits: Option<u64>,
}

/// State shared by both maker directions: the buffer, the label table, the
/// modification log, settings, the nesting bookkeeping and the per-call
/// record under construction.
#[derive(Debug)]
pub(crate) struct Core {
    pub(crate) bits: BitBuf,
    pub(crate) labels: BTreeMap<String, Vec<LabelBinding>>,
    pub(crate) log: Vec<LogRec>,
    next_group: u64,
    pub(crate) set: Settings,
    pub(crate) last: Option<Node>,
    pub(crate) last_tree_index: Option<Vec<usize>>,
    pub(crate) index_stack: Vec<usize>,
    pub(crate) rec_open: Vec<Vec<Node>>,
    pub(crate) markers: Vec<MarkerFrame>,
    pub(crate) jumps: Vec<JumpFrame>,
    pub(crate) finalized: bool,
}

impl Core {
    pub(crate) fn new(bits: BitBuf) -> Self {
        Core {
            bits,
            labels: BTreeMap::new(),
            log: Vec::new(),
            next_group: 0,
            set: Settings::default(),
            last: None,
            last_tree_index: None,
            index_stack: vec![0],
            rec_open: vec![Vec::new()],
            markers: Vec::new(),
            jumps: Vec::new(),
            finalized: false,
        }
    }

    pub(crate) fn new_group(&mut self) -> u64 {
        self.next_group += 1;
        self.next_group
    }

    /// Append a record to the modification log. Reversal intervals from
    /// distinct groups must nest or stay disjoint; a partial overlap would
    /// break buffer<->format coordinate translation, so it fails loudly
    /// rather than silently producing untranslatable layouts.
    pub(crate) fn push_rec(
        &mut self,
        group: u64,
        kind: LogKind,
        start: u64,
        offset: u64,
        bits: Option<u64>,
    ) -> Result<()> {
        if kind == LogKind::Reverse {
            if let Some(n) = bits {
                let (s, e) = (start + offset, start + offset + n);
                for rec in &self.log {
                    if rec.kind != LogKind::Reverse || rec.group == group {
                        continue;
                    }
                    let Some(rn) = rec.bits else { continue };
                    let (rs, re) = (rec.start + rec.offset, rec.start + rec.offset + rn);
                    let disjoint = e <= rs || re <= s;
                    let nested = (s >= rs && e <= re) || (rs >= s && re <= e);
                    if !disjoint && !nested {
                        return Err(fail(
                            ErrorKind::OverlappingReversal,
                            format!(
                                "reversal of bits {}..{} partially overlaps an earlier one at {}..{}",
                                s, e, rs, re
                            ),
                        ));
                    }
                }
            }
        }
        self.log.push(LogRec { group, kind, start, offset, bits });
        Ok(())
    }

    fn reflect(pos: u64, s: u64, e: u64) -> u64 {
        if pos >= s && pos < e {
            s + (e - 1 - pos)
        } else {
            pos
        }
    }

    /// Translate a buffer bit position to its format-spec position by
    /// undoing every logged reversal, newest first. Positions name the next
    /// unread bit; a position beyond every reversal interval (end of buffer
    /// included) maps to itself. To-end reversal widths resolve against the
    /// current buffer length.
    pub(crate) fn to_format(&self, pos: u64) -> u64 {
        let len = self.bits.bit_len();
        let mut p = pos;
        for rec in self.log.iter().rev() {
            if rec.kind != LogKind::Reverse {
                continue;
            }
            let s = rec.start + rec.offset;
            let n = rec.bits.unwrap_or_else(|| len.saturating_sub(s));
            p = Self::reflect(p, s, s + n);
        }
        p
    }

    /// Inverse of [`Core::to_format`]: replay the reversals oldest first.
    pub(crate) fn from_format(&self, pos: u64) -> u64 {
        let len = self.bits.bit_len();
        let mut p = pos;
        for rec in self.log.iter() {
            if rec.kind != LogKind::Reverse {
                continue;
            }
            let s = rec.start + rec.offset;
            let n = rec.bits.unwrap_or_else(|| len.saturating_sub(s));
            p = Self::reflect(p, s, s + n);
        }
        p
    }

    // Label table.

    pub(crate) fn bind_label(&mut self, name: &str, binding: LabelBinding) {
        self.labels.entry(name.to_string()).or_default().push(binding);
    }

    pub(crate) fn label(&self, name: &str) -> Result<Node> {
        self.labels
            .get(name)
            .and_then(|bindings| bindings.last())
            .map(|b| b.node.clone())
            .ok_or_else(|| {
                fail(ErrorKind::UnknownLabel, format!("label {:?} has no binding", name))
            })
    }

    pub(crate) fn match_label(&self, tok: &str, name: &str) -> Result<()> {
        let bound = self.label(name)?;
        let last = self
            .last
            .as_ref()
            .ok_or_else(|| err(format!("{}: no value to match against", tok)))?;
        if *last != bound {
            return Err(fail(
                ErrorKind::MatchLabel,
                format!("{}: last value {:?} does not match label {:?} = {:?}", tok, last, name, bound),
            ));
        }
        Ok(())
    }

    pub(crate) fn assert_last(&self, tok: &str, expect: &Value) -> Result<()> {
        let matches = match self.last.as_ref() {
            Some(Node::Leaf(v)) => v == expect,
            _ => false,
        };
        if !matches {
            return Err(fail(
                ErrorKind::Assertion,
                format!("{}: last value {:?} != expected {:?}", tok, self.last, expect),
            ));
        }
        Ok(())
    }

    // Per-call record bookkeeping. The record mirrors `[` / `]` nesting
    // within a single `run` call; closing beyond the call's own depth wraps
    // the record built so far, as if the `[` had opened in an earlier call.

    pub(crate) fn rec_push(&mut self, node: Node) {
        self.rec_open
            .last_mut()
            .expect("record stack is never empty")
            .push(node);
    }

    pub(crate) fn rec_nest_open(&mut self) {
        self.rec_open.push(Vec::new());
    }

    pub(crate) fn rec_nest_close(&mut self) -> Vec<Node> {
        match self.rec_open.pop() {
            Some(inner) if !self.rec_open.is_empty() => {
                self.rec_open
                    .last_mut()
                    .expect("checked nonempty")
                    .push(Node::List(inner.clone()));
                inner
            }
            Some(base) => {
                self.rec_open.push(vec![Node::List(base.clone())]);
                base
            }
            None => unreachable!("record stack is never empty"),
        }
    }

    /// Collapse any lists still open at the end of a `run` call and hand the
    /// record back, resetting the stack for the next call.
    pub(crate) fn take_record(&mut self) -> Vec<Node> {
        while self.rec_open.len() > 1 {
            let inner = self.rec_open.pop().expect("len checked");
            self.rec_open
                .last_mut()
                .expect("len checked")
                .push(Node::List(inner));
        }
        let record = std::mem::take(self.rec_open.last_mut().expect("base record"));
        record
    }

    pub(crate) fn check_not_finalized(&self) -> Result<()> {
        if self.finalized {
            return Err(err("maker was already finalized"));
        }
        Ok(())
    }
}
