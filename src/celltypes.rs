//! The catalog of built-in cell types
//!
//! Tracks which cell kinds exist, which ports are inputs and outputs, and
//! provides the bit-exact constant evaluator used for constant folding.

use std::collections::BTreeSet;

use crate::rtlil::{Cell, Const, Design, IdString, State};

/// Names of the combinational internal cell types
const INTERNALS: &[&str] = &[
    "$not", "$pos", "$neg", "$and", "$or", "$xor", "$xnor", "$reduce_and", "$reduce_or",
    "$reduce_xor", "$reduce_xnor", "$reduce_bool", "$shl", "$shr", "$sshl", "$sshr", "$lt", "$le",
    "$eq", "$ne", "$ge", "$gt", "$add", "$sub", "$mul", "$div", "$mod", "$pow", "$logic_not",
    "$logic_and", "$logic_or", "$mux", "$pmux", "$safe_pmux", "$lut",
];

/// Names of the stateful internal cell types
const INTERNALS_MEM: &[&str] =
    &["$sr", "$dff", "$dffsr", "$adff", "$dlatch", "$memrd", "$memwr", "$mem", "$fsm"];

/// Names of the single-gate primitives
const STDCELLS: &[&str] = &["$_INV_", "$_AND_", "$_OR_", "$_XOR_", "$_MUX_"];

/// Names of the flip-flop and latch primitives, by polarity pattern
const STDCELLS_MEM: &[&str] = &[
    "$_SR_NN_", "$_SR_NP_", "$_SR_PN_", "$_SR_PP_", "$_DFF_N_", "$_DFF_P_", "$_DFF_NN0_",
    "$_DFF_NN1_", "$_DFF_NP0_", "$_DFF_NP1_", "$_DFF_PN0_", "$_DFF_PN1_", "$_DFF_PP0_",
    "$_DFF_PP1_", "$_DFFSR_NNN_", "$_DFFSR_NNP_", "$_DFFSR_NPN_", "$_DFFSR_NPP_", "$_DFFSR_PNN_",
    "$_DFFSR_PNP_", "$_DFFSR_PPN_", "$_DFFSR_PPP_", "$_DLATCH_N_", "$_DLATCH_P_",
];

/// The set of known cell types, optionally extended by the modules of
/// attached designs
#[derive(Default)]
pub struct CellTypes<'a> {
    /// Known built-in type names
    pub cell_types: BTreeSet<IdString>,
    designs: Vec<&'a Design>,
}

impl<'a> CellTypes<'a> {
    /// An empty catalog
    pub fn new() -> CellTypes<'a> {
        CellTypes::default()
    }

    /// A catalog with all built-in groups and the given design attached
    pub fn with_design(design: &'a Design) -> CellTypes<'a> {
        let mut ct = CellTypes::new();
        ct.setup_design(design);
        ct.setup_internals();
        ct.setup_internals_mem();
        ct.setup_stdcells();
        ct.setup_stdcells_mem();
        ct
    }

    /// Attach a design whose modules count as known cell types
    pub fn setup_design(&mut self, design: &'a Design) {
        self.designs.push(design);
    }

    /// Register the combinational internal cell types
    pub fn setup_internals(&mut self) {
        self.cell_types.extend(INTERNALS.iter().map(|&s| IdString::from(s)));
    }

    /// Register the stateful internal cell types
    pub fn setup_internals_mem(&mut self) {
        self.cell_types.extend(INTERNALS_MEM.iter().map(|&s| IdString::from(s)));
    }

    /// Register the single-gate primitives
    pub fn setup_stdcells(&mut self) {
        self.cell_types.extend(STDCELLS.iter().map(|&s| IdString::from(s)));
    }

    /// Register the flip-flop and latch primitives
    pub fn setup_stdcells_mem(&mut self) {
        self.cell_types.extend(STDCELLS_MEM.iter().map(|&s| IdString::from(s)));
    }

    /// Remove a type from the catalog
    pub fn remove(&mut self, ty: &IdString) {
        self.cell_types.remove(ty);
    }

    /// Forget all types and designs
    pub fn clear(&mut self) {
        self.cell_types.clear();
        self.designs.clear();
    }

    /// Returns true if the type is in the catalog or names a known module
    pub fn cell_known(&self, ty: &IdString) -> bool {
        self.cell_types.contains(ty) || self.designs.iter().any(|d| d.modules.contains_key(ty))
    }

    /// Returns true if the port is an output of the cell type
    pub fn cell_output(&self, ty: &IdString, port: &IdString) -> bool {
        if !self.cell_types.contains(ty) {
            for design in &self.designs {
                if let Some(module) = design.modules.get(ty) {
                    return module.wires.get(port).map(|w| w.port_output).unwrap_or(false);
                }
            }
            return false;
        }
        match port.as_str() {
            "\\Y" | "\\Q" | "\\RD_DATA" => true,
            "\\DATA" => ty.as_str() == "$memrd",
            "\\CTRL_OUT" => ty.as_str() == "$fsm",
            "\\O" => ty.as_str() == "$lut",
            _ => false,
        }
    }

    /// Returns true if the port is an input of the cell type
    pub fn cell_input(&self, ty: &IdString, port: &IdString) -> bool {
        if !self.cell_types.contains(ty) {
            for design in &self.designs {
                if let Some(module) = design.modules.get(ty) {
                    return module.wires.get(port).map(|w| w.port_input).unwrap_or(false);
                }
            }
            return false;
        }
        !self.cell_output(ty, port)
    }

    /// Constant-fold a cell type over two operands
    ///
    /// `$sshr`/`$sshl` with an unsigned A evaluate as `$shr`/`$shl`; for
    /// everything but shifts and unary cells, a single unsigned operand
    /// makes the whole operation unsigned. `result_len` of `None` keeps
    /// the natural width. Returns `None` for types without an evaluator.
    pub fn eval(
        ty: &IdString,
        arg1: &Const,
        arg2: &Const,
        signed1: bool,
        signed2: bool,
        result_len: Option<usize>,
    ) -> Option<Const> {
        let mut ty = ty.as_str();
        if ty == "$sshr" && !signed1 {
            ty = "$shr";
        }
        if ty == "$sshl" && !signed1 {
            ty = "$shl";
        }

        let (signed1, signed2) = match ty {
            "$sshr" | "$sshl" | "$shr" | "$shl" | "$pos" | "$neg" | "$not" => (signed1, signed2),
            _ if !signed1 || !signed2 => (false, false),
            _ => (signed1, signed2),
        };

        let ret = match ty {
            "$not" => const_unary_bitwise(arg1, signed1, result_len, |a| not3(a)),
            "$and" => const_binary_bitwise(arg1, arg2, signed1, signed2, result_len, and3),
            "$or" => const_binary_bitwise(arg1, arg2, signed1, signed2, result_len, or3),
            "$xor" => const_binary_bitwise(arg1, arg2, signed1, signed2, result_len, xor3),
            "$xnor" => {
                const_binary_bitwise(arg1, arg2, signed1, signed2, result_len, |a, b| not3(xor3(a, b)))
            }
            "$reduce_and" => const_bit(reduce_and(arg1), result_len),
            "$reduce_or" | "$reduce_bool" => const_bit(reduce_or(arg1), result_len),
            "$reduce_xor" => const_bit(reduce_xor(arg1), result_len),
            "$reduce_xnor" => const_bit(not3(reduce_xor(arg1)), result_len),
            "$logic_not" => const_bit(not3(reduce_or(arg1)), result_len),
            "$logic_and" => const_bit(and3(reduce_or(arg1), reduce_or(arg2)), result_len),
            "$logic_or" => const_bit(or3(reduce_or(arg1), reduce_or(arg2)), result_len),
            "$shl" => const_shift(arg1, arg2, signed1, result_len, ShiftKind::Left),
            "$shr" => const_shift(arg1, arg2, signed1, result_len, ShiftKind::LogicRight),
            "$sshl" => const_shift(arg1, arg2, signed1, result_len, ShiftKind::Left),
            "$sshr" => const_shift(arg1, arg2, signed1, result_len, ShiftKind::ArithRight),
            "$lt" => const_compare(arg1, arg2, signed1, result_len, |a, b| a < b),
            "$le" => const_compare(arg1, arg2, signed1, result_len, |a, b| a <= b),
            "$eq" => const_compare(arg1, arg2, signed1, result_len, |a, b| a == b),
            "$ne" => const_compare(arg1, arg2, signed1, result_len, |a, b| a != b),
            "$ge" => const_compare(arg1, arg2, signed1, result_len, |a, b| a >= b),
            "$gt" => const_compare(arg1, arg2, signed1, result_len, |a, b| a > b),
            "$add" => const_arith(arg1, arg2, signed1, result_len, |a, b| Some(a.wrapping_add(b))),
            "$sub" => const_arith(arg1, arg2, signed1, result_len, |a, b| Some(a.wrapping_sub(b))),
            "$mul" => const_arith(arg1, arg2, signed1, result_len, |a, b| Some(a.wrapping_mul(b))),
            "$div" => const_arith(arg1, arg2, signed1, result_len, |a, b| a.checked_div(b)),
            "$mod" => const_arith(arg1, arg2, signed1, result_len, |a, b| a.checked_rem(b)),
            "$pow" => const_arith(arg1, arg2, signed1, result_len, |a, b| {
                if b < 0 {
                    return None;
                }
                let mut ret: i64 = 1;
                for _ in 0..b {
                    ret = ret.wrapping_mul(a);
                }
                Some(ret)
            }),
            "$pos" => {
                let width = result_len.unwrap_or(arg1.width());
                extend_const(arg1, width, signed1)
            }
            "$neg" => const_arith(&Const::from_int(0, arg1.width()), arg1, true, result_len, |a, b| {
                Some(a.wrapping_sub(b))
            }),
            "$_INV_" => const_unary_bitwise(arg1, false, Some(1), not3),
            "$_AND_" => const_binary_bitwise(arg1, arg2, false, false, Some(1), and3),
            "$_OR_" => const_binary_bitwise(arg1, arg2, false, false, Some(1), or3),
            "$_XOR_" => const_binary_bitwise(arg1, arg2, false, false, Some(1), xor3),
            _ => return None,
        };
        Some(ret)
    }

    /// Constant-fold a cell instance, reading signedness and result width
    /// from its parameters
    pub fn eval_cell(cell: &Cell, arg1: &Const, arg2: &Const) -> Option<Const> {
        let signed1 = cell
            .parameters
            .get(&IdString::from("\\A_SIGNED"))
            .map(|v| v.as_bool())
            .unwrap_or(false);
        let signed2 = cell
            .parameters
            .get(&IdString::from("\\B_SIGNED"))
            .map(|v| v.as_bool())
            .unwrap_or(false);
        let result_len =
            cell.parameters.get(&IdString::from("\\Y_WIDTH")).map(|v| v.as_int() as usize);
        CellTypes::eval(&cell.ty, arg1, arg2, signed1, signed2, result_len)
    }

    /// Constant-fold a multiplexer cell over a select constant
    ///
    /// The result is the slice of B whose select bit is high, defaulting
    /// to A. When several select bits are high the last one wins, for
    /// `$safe_pmux` as well; returning `Sx` there would match the
    /// documented semantics but not the observed ones (open item).
    pub fn eval_select(cell: &Cell, arg1: &Const, arg2: &Const, sel: &Const) -> Option<Const> {
        match cell.ty.as_str() {
            "$mux" | "$pmux" | "$safe_pmux" | "$_MUX_" => {
                let width = arg1.width();
                let mut ret = arg1.clone();
                for (i, &bit) in sel.bits.iter().enumerate() {
                    if bit == State::S1 {
                        ret = Const::from_bits(arg2.bits[i * width..(i + 1) * width].to_vec());
                    }
                }
                Some(ret)
            }
            _ => {
                assert!(sel.bits.is_empty());
                CellTypes::eval_cell(cell, arg1, arg2)
            }
        }
    }
}

/// Pad a constant to `width` bits, repeating the sign bit when signed
fn extend_const(arg: &Const, width: usize, is_signed: bool) -> Const {
    let mut bits = arg.bits.clone();
    let padding = match bits.last() {
        Some(&bit) if is_signed => bit,
        _ => State::S0,
    };
    bits.resize(width, padding);
    bits.truncate(width);
    Const::from_bits(bits)
}

/// Signed or unsigned integer value of a fully-defined constant
fn const_to_i64(arg: &Const, is_signed: bool) -> i64 {
    let mut value: i64 = 0;
    for (i, &bit) in arg.bits.iter().enumerate().take(63) {
        if bit == State::S1 {
            value |= 1 << i;
        }
    }
    if is_signed && arg.bits.last() == Some(&State::S1) {
        for i in arg.bits.len().min(63)..63 {
            value |= 1 << i;
        }
        value |= i64::MIN;
    }
    value
}

fn not3(a: State) -> State {
    match a {
        State::S0 => State::S1,
        State::S1 => State::S0,
        _ => State::Sx,
    }
}

fn and3(a: State, b: State) -> State {
    match (a, b) {
        (State::S0, _) | (_, State::S0) => State::S0,
        (State::S1, State::S1) => State::S1,
        _ => State::Sx,
    }
}

fn or3(a: State, b: State) -> State {
    match (a, b) {
        (State::S1, _) | (_, State::S1) => State::S1,
        (State::S0, State::S0) => State::S0,
        _ => State::Sx,
    }
}

fn xor3(a: State, b: State) -> State {
    match (a, b) {
        (State::S0, State::S0) | (State::S1, State::S1) => State::S0,
        (State::S0, State::S1) | (State::S1, State::S0) => State::S1,
        _ => State::Sx,
    }
}

fn reduce_and(arg: &Const) -> State {
    arg.bits.iter().fold(State::S1, |acc, &b| and3(acc, b))
}

fn reduce_or(arg: &Const) -> State {
    arg.bits.iter().fold(State::S0, |acc, &b| or3(acc, b))
}

fn reduce_xor(arg: &Const) -> State {
    arg.bits.iter().fold(State::S0, |acc, &b| xor3(acc, b))
}

fn const_bit(bit: State, result_len: Option<usize>) -> Const {
    let mut bits = vec![bit];
    bits.resize(result_len.unwrap_or(1).max(1), State::S0);
    Const::from_bits(bits)
}

fn const_unary_bitwise(
    arg1: &Const,
    signed1: bool,
    result_len: Option<usize>,
    op: impl Fn(State) -> State,
) -> Const {
    let width = result_len.unwrap_or(arg1.width());
    let a = extend_const(arg1, width, signed1);
    Const::from_bits(a.bits.iter().map(|&b| op(b)).collect())
}

fn const_binary_bitwise(
    arg1: &Const,
    arg2: &Const,
    signed1: bool,
    signed2: bool,
    result_len: Option<usize>,
    op: impl Fn(State, State) -> State,
) -> Const {
    let width = result_len.unwrap_or(arg1.width().max(arg2.width()));
    let a = extend_const(arg1, width, signed1);
    let b = extend_const(arg2, width, signed2);
    Const::from_bits(a.bits.iter().zip(b.bits.iter()).map(|(&x, &y)| op(x, y)).collect())
}

enum ShiftKind {
    Left,
    LogicRight,
    ArithRight,
}

fn const_shift(
    arg1: &Const,
    arg2: &Const,
    signed1: bool,
    result_len: Option<usize>,
    kind: ShiftKind,
) -> Const {
    let width = result_len.unwrap_or(arg1.width());
    if !arg2.is_fully_def() {
        return Const::fill(State::Sx, width);
    }
    let a = extend_const(arg1, width, signed1);
    let amount = (arg2.as_int() as usize).min(width);
    let mut bits = vec![State::S0; width];
    match kind {
        ShiftKind::Left => {
            for i in amount..width {
                bits[i] = a.bits[i - amount];
            }
        }
        ShiftKind::LogicRight => {
            for i in 0..width - amount {
                bits[i] = a.bits[i + amount];
            }
        }
        ShiftKind::ArithRight => {
            let sign = *a.bits.last().unwrap_or(&State::S0);
            for (i, bit) in bits.iter_mut().enumerate() {
                *bit = if i + amount < width { a.bits[i + amount] } else { sign };
            }
        }
    }
    Const::from_bits(bits)
}

fn const_compare(
    arg1: &Const,
    arg2: &Const,
    is_signed: bool,
    result_len: Option<usize>,
    op: impl Fn(i64, i64) -> bool,
) -> Const {
    if !arg1.is_fully_def() || !arg2.is_fully_def() {
        return const_bit(State::Sx, result_len);
    }
    let a = const_to_i64(arg1, is_signed);
    let b = const_to_i64(arg2, is_signed);
    const_bit(State::from(op(a, b)), result_len)
}

fn const_arith(
    arg1: &Const,
    arg2: &Const,
    is_signed: bool,
    result_len: Option<usize>,
    op: impl Fn(i64, i64) -> Option<i64>,
) -> Const {
    let width = result_len.unwrap_or(arg1.width().max(arg2.width()));
    if !arg1.is_fully_def() || !arg2.is_fully_def() {
        return Const::fill(State::Sx, width);
    }
    let a = const_to_i64(arg1, is_signed);
    let b = const_to_i64(arg2, is_signed);
    match op(a, b) {
        Some(value) => Const::from_int(value, width),
        None => Const::fill(State::Sx, width),
    }
}
