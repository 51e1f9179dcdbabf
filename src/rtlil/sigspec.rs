use std::cmp::Ordering;
use std::fmt;

use crate::rtlil::id::{escape_id, IdString};
use crate::rtlil::module::{Module, Wire};
use crate::rtlil::value::{Const, State};

/// A single bit position: either a constant state or one bit of a wire
///
/// Constant bits order before wire bits, and wire bits order by name and
/// offset; this ordering is what makes a constant the preferred
/// representative of a signal equivalence class.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum SigBit {
    /// A constant logic state
    Const(State),
    /// One bit of a named wire
    Wire {
        /// Name of the wire within its module
        name: IdString,
        /// Bit offset into the wire
        offset: usize,
    },
}

impl SigBit {
    /// Returns true if this bit is a constant
    pub fn is_const(&self) -> bool {
        matches!(self, SigBit::Const(_))
    }
}

impl From<State> for SigBit {
    fn from(state: State) -> SigBit {
        SigBit::Const(state)
    }
}

/// A contiguous slice of a signal
///
/// Either a `(wire, offset, width)` reference into a named wire, or a
/// slice of literal constant data. Wire-backed chunks never carry data
/// bits; literal chunks never carry a wire.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SigChunk {
    /// Referenced wire, by name; `None` for literal chunks
    pub wire: Option<IdString>,
    /// Bit offset into the wire; always 0 for literal chunks
    pub offset: usize,
    /// Width of the chunk in bits
    pub width: usize,
    /// Literal data; empty for wire-backed chunks
    pub data: Const,
    /// Snapshot of the source wire's `auto_width` flag
    pub auto_width: bool,
}

impl SigChunk {
    /// Create a literal chunk from a constant
    pub fn from_const(data: Const) -> SigChunk {
        SigChunk { wire: None, offset: 0, width: data.width(), data, auto_width: false }
    }

    /// Create a chunk covering a whole wire
    pub fn from_wire(wire: &Wire) -> SigChunk {
        SigChunk::from_wire_slice(wire, wire.width, 0)
    }

    /// Create a chunk covering `width` bits of a wire starting at `offset`
    pub fn from_wire_slice(wire: &Wire, width: usize, offset: usize) -> SigChunk {
        SigChunk {
            wire: Some(wire.name.clone()),
            offset,
            width,
            data: Const::new(),
            auto_width: wire.auto_width,
        }
    }

    /// Slice `length` bits out of the chunk starting at a chunk-local offset
    pub fn extract(&self, offset: usize, length: usize) -> SigChunk {
        if self.wire.is_some() {
            SigChunk {
                wire: self.wire.clone(),
                offset: self.offset + offset,
                width: length,
                data: Const::new(),
                auto_width: self.auto_width,
            }
        } else {
            SigChunk::from_const(Const::from_bits(self.data.bits[offset..offset + length].to_vec()))
        }
    }

    /// Total order used by `SigSpec::sort`: constants first, then wires by
    /// name, then offset, width and data
    pub fn compare(&self, other: &SigChunk) -> Ordering {
        match (&self.wire, &other.wire) {
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) if a != b => return a.cmp(b),
            _ => {}
        }
        self.offset
            .cmp(&other.offset)
            .then_with(|| self.width.cmp(&other.width))
            .then_with(|| self.data.bits.cmp(&other.data.bits))
    }
}

/// A bit-accurate, order-preserving concatenation of signal chunks
///
/// Two different spellings can denote the same signal; `optimize` produces
/// the canonical form by merging adjacent chunks and dropping zero-width
/// ones, and equality and ordering are defined on canonical forms.
#[derive(Clone, Default, Debug)]
pub struct SigSpec {
    pub(crate) chunks: Vec<SigChunk>,
    pub(crate) width: usize,
}

impl SigSpec {
    /// Create an empty signal
    pub fn new() -> SigSpec {
        SigSpec::default()
    }

    /// Create a signal covering a whole wire
    pub fn from_wire(wire: &Wire) -> SigSpec {
        SigSpec::from(SigChunk::from_wire(wire))
    }

    /// Create a signal covering `width` bits of a wire starting at `offset`
    pub fn from_wire_slice(wire: &Wire, width: usize, offset: usize) -> SigSpec {
        SigSpec::from(SigChunk::from_wire_slice(wire, width, offset))
    }

    /// Create a constant signal by repeating a single state
    pub fn from_state(state: State, width: usize) -> SigSpec {
        SigSpec::from(Const::fill(state, width))
    }

    /// Create a constant signal from an integer
    pub fn from_int(value: i64, width: usize) -> SigSpec {
        SigSpec::from(Const::from_int(value, width))
    }

    /// Rebuild a signal from single bits, then canonicalize
    pub fn from_bits<I: IntoIterator<Item = SigBit>>(bits: I) -> SigSpec {
        let mut sig = SigSpec::new();
        for bit in bits {
            match bit {
                SigBit::Const(state) => sig.push_chunk(SigChunk::from_const(Const::fill(state, 1))),
                SigBit::Wire { name, offset } => sig.push_chunk(SigChunk {
                    wire: Some(name),
                    offset,
                    width: 1,
                    data: Const::new(),
                    auto_width: false,
                }),
            }
        }
        sig.optimize();
        sig
    }

    fn push_chunk(&mut self, chunk: SigChunk) {
        self.width += chunk.width;
        self.chunks.push(chunk);
    }

    /// Total width of the signal in bits
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns true if the signal has zero width
    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// The chunks of the signal, low bits first
    pub fn chunks(&self) -> &[SigChunk] {
        &self.chunks
    }

    /// The individual bits of the signal, low bits first
    pub fn bits(&self) -> Vec<SigBit> {
        let mut ret = Vec::with_capacity(self.width);
        for chunk in &self.chunks {
            match &chunk.wire {
                Some(name) => {
                    for i in 0..chunk.width {
                        ret.push(SigBit::Wire { name: name.clone(), offset: chunk.offset + i });
                    }
                }
                None => ret.extend(chunk.data.bits.iter().map(|&b| SigBit::Const(b))),
            }
        }
        ret
    }

    /// Concatenate another signal onto the high end of this one
    pub fn append(&mut self, signal: &SigSpec) {
        for chunk in &signal.chunks {
            self.push_chunk(chunk.clone());
        }
        self.check();
    }

    /// Append a single bit
    pub fn append_bit(&mut self, bit: SigBit) {
        match bit {
            SigBit::Const(state) => self.push_chunk(SigChunk::from_const(Const::fill(state, 1))),
            SigBit::Wire { name, offset } => self.push_chunk(SigChunk {
                wire: Some(name),
                offset,
                width: 1,
                data: Const::new(),
                auto_width: false,
            }),
        }
    }

    /// Rewrite the signal into single-bit chunks
    ///
    /// Required before any position-wise chunk comparison. String-tagged
    /// constants cannot be expanded.
    pub fn expand(&mut self) {
        let mut new_chunks = Vec::with_capacity(self.width);
        for chunk in &self.chunks {
            assert!(chunk.data.source.is_none());
            for i in 0..chunk.width {
                new_chunks.push(chunk.extract(i, 1));
            }
        }
        self.chunks = new_chunks;
        self.check();
    }

    /// Canonicalize: drop zero-width chunks and merge mergeable neighbors
    ///
    /// Neighbors merge when they reference consecutive bits of the same
    /// wire, or when both are literals with matching string-taggedness.
    /// Chunks of auto-width wires are never merged.
    pub fn optimize(&mut self) {
        self.chunks.retain(|c| c.auto_width || c.width > 0);
        let mut i = 1;
        while i < self.chunks.len() {
            let (head, tail) = self.chunks.split_at_mut(i);
            let ch1 = head.last_mut().unwrap();
            let ch2 = &tail[0];
            if ch1.auto_width || ch2.auto_width {
                i += 1;
                continue;
            }
            let merged = if ch1.wire == ch2.wire {
                match &ch1.wire {
                    Some(_) if ch1.offset + ch1.width == ch2.offset => {
                        ch1.width += ch2.width;
                        true
                    }
                    None if ch1.data.source.is_some() == ch2.data.source.is_some() => {
                        if let (Some(s1), Some(s2)) = (&ch1.data.source, &ch2.data.source) {
                            ch1.data.source = Some(format!("{}{}", s2, s1));
                        }
                        let high_bits = ch2.data.bits.clone();
                        ch1.data.bits.extend(high_bits);
                        ch1.width += ch2.width;
                        true
                    }
                    _ => false,
                }
            } else {
                false
            };
            if merged {
                self.chunks.remove(i);
            } else {
                i += 1;
            }
        }
        self.check();
    }

    /// Expand, stable-sort the bits by the chunk order, and canonicalize
    pub fn sort(&mut self) {
        self.expand();
        self.chunks.sort_by(|a, b| a.compare(b));
        self.optimize();
    }

    /// `sort`, then drop duplicate bits
    pub fn sort_and_unify(&mut self) {
        self.expand();
        self.chunks.sort_by(|a, b| a.compare(b));
        let mut i = 1;
        while i < self.chunks.len() {
            if self.chunks[i - 1].compare(&self.chunks[i]) == Ordering::Equal {
                self.width -= self.chunks[i].width;
                self.chunks.remove(i);
            } else {
                i += 1;
            }
        }
        self.optimize();
    }

    /// Slice `length` bits out of the signal starting at `offset`
    pub fn extract(&self, offset: usize, length: usize) -> SigSpec {
        assert!(offset + length <= self.width);
        let mut ret = SigSpec::new();
        let mut pos = 0;
        for chunk in &self.chunks {
            let lower = pos.max(offset);
            let upper = (pos + chunk.width).min(offset + length);
            if lower < upper {
                ret.push_chunk(chunk.extract(lower - pos, upper - lower));
            }
            pos += chunk.width;
        }
        assert_eq!(ret.width, length);
        ret.check();
        ret
    }

    /// Extract the sub-signals of `self` that overlap a wire-backed pattern
    ///
    /// With `other` given, the positionally corresponding slices of `other`
    /// are returned instead.
    pub fn extract_pattern(&self, pattern: &SigSpec, other: Option<&SigSpec>) -> SigSpec {
        let mut pattern = pattern.clone();
        pattern.sort_and_unify();
        if let Some(other) = other {
            assert_eq!(self.width, other.width);
        }
        let mut ret = SigSpec::new();
        let mut pos = 0;
        for ch1 in &self.chunks {
            if let Some(w1) = &ch1.wire {
                for ch2 in &pattern.chunks {
                    let w2 = ch2.wire.as_ref().expect("pattern must be wire-backed");
                    if w1 == w2 {
                        let lower = ch1.offset.max(ch2.offset);
                        let upper = (ch1.offset + ch1.width).min(ch2.offset + ch2.width);
                        if lower < upper {
                            let source = other.unwrap_or(self);
                            ret.append(&source.extract(pos + lower - ch1.offset, upper - lower));
                        }
                    }
                }
            }
            pos += ch1.width;
        }
        ret.check();
        ret
    }

    /// Positions (offset, length) where `self` overlaps a wire-backed
    /// pattern, each original bit reported at most once
    fn pattern_overlaps(&self, pattern: &SigSpec) -> Vec<(usize, usize, usize)> {
        // Entries are (self position, pattern position, length).
        let mut ranges = Vec::new();
        let mut pos = 0;
        for ch1 in &self.chunks {
            if let Some(w1) = &ch1.wire {
                let mut poff = 0;
                for ch2 in &pattern.chunks {
                    let w2 = ch2.wire.as_ref().expect("pattern must be wire-backed");
                    if w1 == w2 {
                        let lower = ch1.offset.max(ch2.offset);
                        let upper = (ch1.offset + ch1.width).min(ch2.offset + ch2.width);
                        if lower < upper {
                            ranges.push((
                                pos + lower - ch1.offset,
                                poff + lower - ch2.offset,
                                upper - lower,
                            ));
                        }
                    }
                    poff += ch2.width;
                }
            }
            pos += ch1.width;
        }
        ranges
    }

    /// In-place substitution: overwrite the positions of `self` that match
    /// a wire-backed pattern with the aligned slice of `with`
    pub fn replace_pattern(&mut self, pattern: &SigSpec, with: &SigSpec) {
        let snapshot = self.clone();
        snapshot.replace_pattern_into(pattern, with, self);
    }

    /// Substitution form writing into `other` instead of `self`
    pub fn replace_pattern_into(&self, pattern: &SigSpec, with: &SigSpec, other: &mut SigSpec) {
        assert_eq!(self.width, other.width);
        assert_eq!(pattern.width, with.width);
        let mut ranges = self.pattern_overlaps(pattern);
        // A position written once must not be matched again; keeping the
        // first match per position mirrors the restart cursor of the
        // scanning implementation.
        ranges.sort_by_key(|&(pos, _, _)| pos);
        let mut next_free = 0;
        for (pos, poff, len) in ranges {
            let (pos, poff, len) = if pos < next_free {
                if pos + len <= next_free {
                    continue;
                }
                let skip = next_free - pos;
                (next_free, poff + skip, len - skip)
            } else {
                (pos, poff, len)
            };
            other.replace_at(pos, &with.extract(poff, len));
            next_free = pos + len;
        }
        other.check();
    }

    /// Delete the positions of `self` that match a wire-backed pattern
    pub fn remove_pattern(&mut self, pattern: &SigSpec) {
        let snapshot = self.clone();
        let mut ranges: Vec<(usize, usize)> = snapshot
            .pattern_overlaps(pattern)
            .into_iter()
            .map(|(pos, _, len)| (pos, len))
            .collect();
        ranges.sort_unstable();
        // Merge overlapping matches so every bit is deleted exactly once.
        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (pos, len) in ranges {
            match merged.last_mut() {
                Some((mpos, mlen)) if pos <= *mpos + *mlen => {
                    *mlen = (*mlen).max(pos + len - *mpos);
                }
                _ => merged.push((pos, len)),
            }
        }
        for &(pos, len) in merged.iter().rev() {
            self.remove(pos, len);
        }
    }

    /// Deletion form shrinking `other` at the positions where `self`
    /// matches the pattern
    pub fn remove_pattern_into(&self, pattern: &SigSpec, other: &mut SigSpec) {
        assert_eq!(self.width, other.width);
        let mut tmp = self.clone();
        let mut ranges: Vec<(usize, usize)> =
            tmp.pattern_overlaps(pattern).into_iter().map(|(pos, _, len)| (pos, len)).collect();
        ranges.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (pos, len) in ranges {
            match merged.last_mut() {
                Some((mpos, mlen)) if pos <= *mpos + *mlen => {
                    *mlen = (*mlen).max(pos + len - *mpos);
                }
                _ => merged.push((pos, len)),
            }
        }
        for &(pos, len) in merged.iter().rev() {
            tmp.remove(pos, len);
            other.remove(pos, len);
        }
    }

    /// Delete `length` bits starting at `offset`, shrinking the signal
    pub fn remove(&mut self, offset: usize, length: usize) {
        assert!(offset + length <= self.width);
        let mut pos = 0;
        let mut i = 0;
        while i < self.chunks.len() {
            let chunk_width = self.chunks[i].width;
            let lower = pos.max(offset);
            let upper = (pos + chunk_width).min(offset + length);
            if lower < upper {
                let off = lower - pos;
                let len = upper - lower;
                let lsb = self.chunks[i].extract(0, off);
                let msb = self.chunks[i].extract(off + len, chunk_width - off - len);
                match (lsb.width > 0, msb.width > 0) {
                    (false, false) => {
                        self.chunks.remove(i);
                    }
                    (false, true) => {
                        self.chunks[i] = msb;
                        i += 1;
                    }
                    (true, false) => {
                        self.chunks[i] = lsb;
                        i += 1;
                    }
                    (true, true) => {
                        self.chunks[i] = lsb;
                        self.chunks.insert(i + 1, msb);
                        i += 2;
                    }
                }
                self.width -= len;
            } else {
                i += 1;
            }
            pos += chunk_width;
        }
        self.check();
    }

    /// Overwrite `with.width` bits starting at `offset`, preserving width
    pub fn replace_at(&mut self, offset: usize, with: &SigSpec) {
        assert!(offset + with.width <= self.width);
        self.remove(offset, with.width);
        let mut pos = 0;
        for i in 0..self.chunks.len() {
            if pos == offset {
                let tail = self.chunks.split_off(i);
                self.chunks.extend(with.chunks.iter().cloned());
                self.chunks.extend(tail);
                self.width += with.width;
                self.check();
                return;
            }
            pos += self.chunks[i].width;
        }
        assert_eq!(pos, offset);
        self.chunks.extend(with.chunks.iter().cloned());
        self.width += with.width;
        self.check();
    }

    /// Bit-wise merge of two signals of equal width
    ///
    /// Positions equal to `free_state` are considered unassigned. Returns
    /// false when both sides carry a value at some position; the collision
    /// is resolved by `override_` or by writing `Sx`.
    pub fn combine(&mut self, signal: &SigSpec, free_state: State, override_: bool) -> bool {
        assert_eq!(self.width, signal.width);
        let mut no_collisions = true;
        self.expand();
        let mut signal = signal.clone();
        signal.expand();
        for (chunk, other) in self.chunks.iter_mut().zip(signal.chunks.iter()) {
            let self_free = chunk.wire.is_none() && chunk.data.bits[0] == free_state;
            let other_free = other.wire.is_none() && other.data.bits[0] == free_state;
            if !self_free && !other_free {
                *chunk = if override_ {
                    other.clone()
                } else {
                    SigChunk::from_const(Const::fill(State::Sx, 1))
                };
                no_collisions = false;
            } else if self_free && !other_free {
                *chunk = other.clone();
            }
        }
        self.optimize();
        no_collisions
    }

    /// Truncate or extend to `width`
    ///
    /// Extension repeats the sign bit when `is_signed`, otherwise pads
    /// with `S0`. An `Sx`/`Sz`/`Sa`/`Sm` sign bit propagates into the
    /// padding in either mode.
    pub fn extend(&mut self, width: usize, is_signed: bool) {
        if self.width > width {
            self.remove(width, self.width - width);
        }
        if self.width < width {
            let mut padding = if self.width > 0 {
                self.extract(self.width - 1, 1)
            } else {
                SigSpec::from_state(State::S0, 1)
            };
            let undef_pad = [State::Sx, State::Sz, State::Sa, State::Sm]
                .iter()
                .any(|&state| padding == SigSpec::from_state(state, 1));
            if !is_signed && !undef_pad {
                padding = SigSpec::from_state(State::S0, 1);
            }
            while self.width < width {
                self.append(&padding);
            }
        }
        self.optimize();
    }

    /// Parse a comma-separated signal description against a module
    ///
    /// Accepts `name`, `\name`, `$name`, `name[i]`, `name[a:b]` and
    /// decimal or sized Verilog-style constants. Returns `None` when a net
    /// is unknown or a constant is malformed.
    pub fn parse(module: &Module, text: &str) -> Option<SigSpec> {
        let mut sig = SigSpec::new();
        for token in text.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if token.starts_with(|c: char| c.is_ascii_digit()) {
                sig.append(&SigSpec::from(parse_verilog_const(token)?));
                continue;
            }
            let mut netname = escape_id(token);
            let mut indices = String::new();
            if !module.wires.contains_key(&netname) {
                if let Some(open) = token.rfind('[') {
                    if token.ends_with(']') {
                        let inner = &token[open + 1..token.len() - 1];
                        if inner.split(':').all(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit())) {
                            indices = inner.to_owned();
                            netname = escape_id(&token[..open]);
                        }
                    }
                }
            }
            let wire = module.wires.get(&netname)?;
            if indices.is_empty() {
                sig.append(&SigSpec::from_wire(wire));
            } else {
                let parts: Vec<usize> = indices.split(':').map(|t| t.parse().ok()).collect::<Option<_>>()?;
                match parts.as_slice() {
                    [i] => sig.append(&SigSpec::from_wire_slice(wire, 1, *i)),
                    [a, b] => {
                        let (lo, hi) = (*a.min(b), *a.max(b));
                        sig.append(&SigSpec::from_wire_slice(wire, hi - lo + 1, lo));
                    }
                    _ => return None,
                }
            }
        }
        Some(sig)
    }

    /// Returns true if no chunk references a wire
    pub fn is_fully_const(&self) -> bool {
        self.chunks.iter().all(|c| c.width == 0 || c.wire.is_none())
    }

    /// Returns true if the signal is constant and free of `Sx`/`Sz`
    pub fn is_fully_def(&self) -> bool {
        self.chunks.iter().all(|c| {
            (c.width == 0 || c.wire.is_none())
                && c.data.bits.iter().all(|&b| b == State::S0 || b == State::S1)
        })
    }

    /// Returns true if the signal is constant and every bit is `Sx`/`Sz`
    pub fn is_fully_undef(&self) -> bool {
        self.chunks.iter().all(|c| {
            (c.width == 0 || c.wire.is_none())
                && c.data.bits.iter().all(|&b| b == State::Sx || b == State::Sz)
        })
    }

    /// Returns true if any constant bit is the `Sm` marker
    pub fn has_marked_bits(&self) -> bool {
        self.chunks
            .iter()
            .filter(|c| c.width > 0 && c.wire.is_none())
            .any(|c| c.data.bits.iter().any(|&b| b == State::Sm))
    }

    /// Interpret a fully-constant signal as a boolean
    pub fn as_bool(&self) -> bool {
        self.as_const().as_bool()
    }

    /// Interpret a fully-constant signal as an integer
    pub fn as_int(&self) -> i32 {
        self.as_const().as_int()
    }

    /// Textual form of the signal, `?` for wire bits
    pub fn as_string(&self) -> String {
        let mut str = String::new();
        for chunk in self.chunks.iter().rev() {
            if chunk.wire.is_some() {
                str.extend(std::iter::repeat('?').take(chunk.width));
            } else {
                str += &chunk.data.as_string();
            }
        }
        str
    }

    /// The constant value of a fully-constant signal
    pub fn as_const(&self) -> Const {
        assert!(self.is_fully_const());
        let mut sig = self.clone();
        sig.optimize();
        if sig.width > 0 {
            sig.chunks.into_iter().next().unwrap().data
        } else {
            Const::new()
        }
    }

    /// Verify the width invariant and per-chunk consistency
    pub fn check(&self) {
        if cfg!(debug_assertions) {
            let mut w = 0;
            for chunk in &self.chunks {
                if chunk.wire.is_none() {
                    assert_eq!(chunk.offset, 0);
                    assert_eq!(chunk.data.bits.len(), chunk.width);
                } else {
                    assert!(chunk.data.bits.is_empty());
                }
                w += chunk.width;
            }
            assert_eq!(w, self.width);
        }
    }
}

/// Parse `123`, `8'd255`, `4'b01xz`, `8'hff` style constants
fn parse_verilog_const(token: &str) -> Option<Const> {
    match token.split_once('\'') {
        None => {
            let value: i64 = token.parse().ok()?;
            Some(Const::from_int(value, 32))
        }
        Some((width, rest)) => {
            let width: usize = width.parse().ok()?;
            let (base, digits) = rest.split_at(1);
            let mut bits = Vec::new();
            match base {
                "b" => {
                    for ch in digits.chars().rev() {
                        bits.push(match ch {
                            '0' => State::S0,
                            '1' => State::S1,
                            'x' => State::Sx,
                            'z' => State::Sz,
                            _ => return None,
                        });
                    }
                }
                "d" => {
                    let value: i64 = digits.parse().ok()?;
                    bits = Const::from_int(value, width).bits;
                }
                "h" => {
                    for ch in digits.chars().rev() {
                        let digit = ch.to_digit(16)? as i64;
                        bits.extend(Const::from_int(digit, 4).bits);
                    }
                }
                _ => return None,
            }
            bits.resize(width, State::S0);
            Some(Const::from_bits(bits))
        }
    }
}

impl From<Const> for SigSpec {
    fn from(data: Const) -> SigSpec {
        SigSpec::from(SigChunk::from_const(data))
    }
}

impl From<SigChunk> for SigSpec {
    fn from(chunk: SigChunk) -> SigSpec {
        let width = chunk.width;
        let sig = SigSpec { chunks: vec![chunk], width };
        sig.check();
        sig
    }
}

impl From<SigBit> for SigSpec {
    fn from(bit: SigBit) -> SigSpec {
        SigSpec::from_bits([bit])
    }
}

impl PartialEq for SigSpec {
    fn eq(&self, other: &SigSpec) -> bool {
        if self.width != other.width {
            return false;
        }
        let mut a = self.clone();
        let mut b = other.clone();
        a.optimize();
        b.optimize();
        a.chunks == b.chunks
    }
}

impl Eq for SigSpec {}

impl PartialOrd for SigSpec {
    fn partial_cmp(&self, other: &SigSpec) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SigSpec {
    fn cmp(&self, other: &SigSpec) -> Ordering {
        if self.width != other.width {
            return self.width.cmp(&other.width);
        }
        let mut a = self.clone();
        let mut b = other.clone();
        a.optimize();
        b.optimize();
        if a.chunks.len() != b.chunks.len() {
            return a.chunks.len().cmp(&b.chunks.len());
        }
        for (ca, cb) in a.chunks.iter().zip(b.chunks.iter()) {
            let ord = ca.compare(cb);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for SigSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_chunk = |f: &mut fmt::Formatter<'_>, chunk: &SigChunk| match &chunk.wire {
            Some(name) => {
                if chunk.offset == 0 && chunk.width == 1 {
                    write!(f, "{}", name.unescape())
                } else if chunk.width == 1 {
                    write!(f, "{}[{}]", name.unescape(), chunk.offset)
                } else {
                    write!(f, "{}[{}:{}]", name.unescape(), chunk.offset + chunk.width - 1, chunk.offset)
                }
            }
            None => write!(f, "{}'{}", chunk.width, chunk.data.as_string()),
        };
        if self.chunks.len() == 1 {
            display_chunk(f, &self.chunks[0])
        } else {
            write!(f, "{{")?;
            for chunk in self.chunks.iter().rev() {
                write!(f, " ")?;
                display_chunk(f, chunk)?;
            }
            write!(f, " }}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtlil::module::Module;

    fn wire(name: &str, width: usize) -> Wire {
        Wire::new(escape_id(name), width)
    }

    #[test]
    fn test_width_invariant() {
        let a = wire("a", 4);
        let b = wire("b", 2);
        let mut sig = SigSpec::from_wire(&a);
        sig.append(&SigSpec::from_wire(&b));
        sig.append(&SigSpec::from_int(5, 3));
        assert_eq!(sig.width(), 9);
        sig.check();
        sig.expand();
        assert_eq!(sig.width(), 9);
        assert_eq!(sig.chunks().len(), 9);
    }

    #[test]
    fn test_optimize_merges_neighbors() {
        let a = wire("a", 8);
        let mut sig = SigSpec::from_wire_slice(&a, 2, 0);
        sig.append(&SigSpec::from_wire_slice(&a, 3, 2));
        sig.append(&SigSpec::from_int(1, 1));
        sig.append(&SigSpec::from_int(1, 2));
        sig.optimize();
        assert_eq!(sig.chunks().len(), 2);
        assert_eq!(sig.chunks()[0].width, 5);
        assert_eq!(sig.chunks()[1].width, 3);
        // Canonicalization is idempotent.
        let snapshot = sig.clone();
        sig.optimize();
        assert_eq!(sig.chunks(), snapshot.chunks());
    }

    #[test]
    fn test_optimize_keeps_gaps_apart() {
        let a = wire("a", 8);
        let mut sig = SigSpec::from_wire_slice(&a, 2, 0);
        sig.append(&SigSpec::from_wire_slice(&a, 2, 4));
        sig.optimize();
        assert_eq!(sig.chunks().len(), 2);
    }

    #[test]
    fn test_extract_append_roundtrip() {
        let a = wire("a", 4);
        let b = wire("b", 3);
        let mut sig = SigSpec::from_wire(&a);
        sig.append(&SigSpec::from_int(2, 2));
        sig.append(&SigSpec::from_wire(&b));
        for o in 0..sig.width() {
            for l in 0..=(sig.width() - o) {
                let mut joined = sig.extract(0, o);
                joined.append(&sig.extract(o, l));
                joined.append(&sig.extract(o + l, sig.width() - o - l));
                assert_eq!(joined, sig, "roundtrip failed at offset {o} length {l}");
            }
        }
    }

    #[test]
    fn test_sort_and_unify() {
        let a = wire("a", 4);
        let b = wire("b", 4);
        let mut sig = SigSpec::from_wire(&b);
        sig.append(&SigSpec::from_wire(&a));
        sig.append(&SigSpec::from_wire(&b));
        sig.sort_and_unify();
        assert_eq!(sig.width(), 8);
        assert_eq!(sig.chunks().len(), 2);
        assert_eq!(sig.chunks()[0].wire, Some(escape_id("a")));
        assert_eq!(sig.chunks()[1].wire, Some(escape_id("b")));
    }

    #[test]
    fn test_replace_identity() {
        let a = wire("a", 4);
        let b = wire("b", 2);
        let mut sig = SigSpec::from_wire(&a);
        sig.append(&SigSpec::from_wire(&b));
        let pattern = SigSpec::from_wire_slice(&a, 2, 1);
        let snapshot = sig.clone();
        sig.replace_pattern(&pattern, &pattern);
        assert_eq!(sig, snapshot);
    }

    #[test]
    fn test_replace_substitutes_overlap() {
        let a = wire("a", 4);
        let c = wire("c", 2);
        let mut sig = SigSpec::from_wire(&a);
        let pattern = SigSpec::from_wire_slice(&a, 2, 1);
        sig.replace_pattern(&pattern, &SigSpec::from_wire(&c));
        let mut expected = SigSpec::from_wire_slice(&a, 1, 0);
        expected.append(&SigSpec::from_wire(&c));
        expected.append(&SigSpec::from_wire_slice(&a, 1, 3));
        assert_eq!(sig, expected);
    }

    #[test]
    fn test_remove_pattern() {
        let a = wire("a", 4);
        let b = wire("b", 2);
        let mut sig = SigSpec::from_wire(&a);
        sig.append(&SigSpec::from_wire(&b));
        sig.remove_pattern(&SigSpec::from_wire(&a));
        assert_eq!(sig, SigSpec::from_wire(&b));
    }

    #[test]
    fn test_combine_disjoint_commutes() {
        let w = wire("w", 2);
        let mut a = SigSpec::from_wire(&w);
        a.append(&SigSpec::from_state(State::Sz, 2));
        let mut b = SigSpec::from_state(State::Sz, 2);
        b.append(&SigSpec::from_int(3, 2));

        let mut ab = a.clone();
        assert!(ab.combine(&b, State::Sz, false));
        let mut ba = b.clone();
        assert!(ba.combine(&a, State::Sz, false));
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_combine_collision() {
        let mut a = SigSpec::from_int(1, 1);
        assert!(!a.combine(&SigSpec::from_int(0, 1), State::Sz, false));
        assert_eq!(a, SigSpec::from_state(State::Sx, 1));
        let mut b = SigSpec::from_int(1, 1);
        assert!(!b.combine(&SigSpec::from_int(0, 1), State::Sz, true));
        assert_eq!(b, SigSpec::from_int(0, 1));
    }

    #[test]
    fn test_extend() {
        let mut sig = SigSpec::from_int(0b10, 2);
        sig.extend(4, false);
        assert_eq!(sig.as_const(), Const::from_int(0b0010, 4));
        let mut sig = SigSpec::from_int(0b10, 2);
        sig.extend(4, true);
        assert_eq!(sig.as_const(), Const::from_int(0b1110, 4));
        let mut sig = SigSpec::from_int(0b1110, 4);
        sig.extend(2, true);
        assert_eq!(sig.as_const(), Const::from_int(0b10, 2));
        let mut sig = SigSpec::from_state(State::Sx, 1);
        sig.extend(2, false);
        assert_eq!(sig.extract(1, 1), SigSpec::from_state(State::Sx, 1));
    }

    #[test]
    fn test_predicates() {
        let a = wire("a", 2);
        assert!(SigSpec::from_int(5, 4).is_fully_const());
        assert!(SigSpec::from_int(5, 4).is_fully_def());
        assert!(!SigSpec::from_wire(&a).is_fully_const());
        assert!(SigSpec::from_state(State::Sx, 2).is_fully_undef());
        assert!(SigSpec::from_state(State::Sm, 1).has_marked_bits());
        assert_eq!(SigSpec::from_int(5, 4).as_int(), 5);
    }

    #[test]
    fn test_parse() {
        let mut module = Module::new(escape_id("top"));
        module.new_wire(escape_id("a"), 4);
        module.new_wire(escape_id("b"), 2);
        let sig = SigSpec::parse(&module, "a[3:1],b,2'b10,7").unwrap();
        assert_eq!(sig.width(), 3 + 2 + 2 + 32);
        assert!(SigSpec::parse(&module, "nosuch").is_none());
        let slice = SigSpec::parse(&module, "a[2]").unwrap();
        assert_eq!(slice, SigSpec::from_wire_slice(&Wire::new(escape_id("a"), 4), 1, 2));
    }

    #[test]
    fn test_equality_is_canonical() {
        let a = wire("a", 4);
        let mut split = SigSpec::from_wire_slice(&a, 2, 0);
        split.append(&SigSpec::from_wire_slice(&a, 2, 2));
        let whole = SigSpec::from_wire(&a);
        assert_eq!(split, whole);
        assert_eq!(split.cmp(&whole), Ordering::Equal);
    }

    #[test]
    fn test_bits_roundtrip() {
        let a = wire("a", 3);
        let mut sig = SigSpec::from_wire(&a);
        sig.append(&SigSpec::from_int(1, 2));
        let rebuilt = SigSpec::from_bits(sig.bits());
        assert_eq!(rebuilt, sig);
    }
}
