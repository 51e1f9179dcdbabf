//! Tseitin CNF generation for cells and the bridge to the SAT solver
//!
//! The solver itself is a black box: clauses go in, a satisfying model or
//! UNSAT comes out. Clauses accumulate in the generator and every query
//! runs on a fresh solver instance.

use std::collections::BTreeMap;

use cat_solver::Solver;

use crate::rtlil::{Cell, IdString, SigBit, SigSpec, State};
use crate::sigtools::SigMap;

/// CNF builder mapping signal bits to solver literals
#[derive(Default)]
pub struct SatGen {
    nvars: i32,
    true_lit: Option<i32>,
    bit_lits: BTreeMap<SigBit, i32>,
    /// The accumulated clauses
    pub clauses: Vec<Vec<i32>>,
}

impl SatGen {
    /// An empty generator
    pub fn new() -> SatGen {
        SatGen::default()
    }

    fn new_var(&mut self) -> i32 {
        self.nvars += 1;
        self.nvars
    }

    fn lit_true(&mut self) -> i32 {
        match self.true_lit {
            Some(lit) => lit,
            None => {
                let lit = self.new_var();
                self.clauses.push(vec![lit]);
                self.true_lit = Some(lit);
                lit
            }
        }
    }

    fn lit_false(&mut self) -> i32 {
        -self.lit_true()
    }

    fn lit_for_bit(&mut self, bit: SigBit) -> i32 {
        match bit {
            SigBit::Const(State::S1) => self.lit_true(),
            SigBit::Const(State::S0) => self.lit_false(),
            // Undefined bits are unconstrained.
            SigBit::Const(_) => self.new_var(),
            bit => {
                if let Some(&lit) = self.bit_lits.get(&bit) {
                    lit
                } else {
                    let lit = self.new_var();
                    self.bit_lits.insert(bit, lit);
                    lit
                }
            }
        }
    }

    /// Literals for each bit of a signal, canonicalized through the map
    pub fn import_sigspec(&mut self, sigmap: &SigMap, sig: &SigSpec) -> Vec<i32> {
        sigmap.map(sig).bits().into_iter().map(|bit| self.lit_for_bit(bit)).collect()
    }

    fn encode_buf(&mut self, a: i32, y: i32) {
        self.clauses.push(vec![a, -y]);
        self.clauses.push(vec![-a, y]);
    }

    fn encode_not(&mut self, a: i32, y: i32) {
        self.clauses.push(vec![a, y]);
        self.clauses.push(vec![-a, -y]);
    }

    fn encode_and(&mut self, a: i32, b: i32, y: i32) {
        self.clauses.push(vec![a, -y]);
        self.clauses.push(vec![b, -y]);
        self.clauses.push(vec![-a, -b, y]);
    }

    fn encode_or(&mut self, a: i32, b: i32, y: i32) {
        self.clauses.push(vec![-a, y]);
        self.clauses.push(vec![-b, y]);
        self.clauses.push(vec![a, b, -y]);
    }

    fn encode_xor(&mut self, a: i32, b: i32, y: i32) {
        self.clauses.push(vec![a, b, -y]);
        self.clauses.push(vec![-a, -b, -y]);
        self.clauses.push(vec![-a, b, y]);
        self.clauses.push(vec![a, -b, y]);
    }

    /// Y = S ? B : A
    fn encode_mux(&mut self, s: i32, a: i32, b: i32, y: i32) {
        self.clauses.push(vec![s, -a, y]);
        self.clauses.push(vec![s, a, -y]);
        self.clauses.push(vec![-s, -b, y]);
        self.clauses.push(vec![-s, b, -y]);
        // Redundant but useful.
        self.clauses.push(vec![a, b, -y]);
        self.clauses.push(vec![-a, -b, y]);
    }

    fn and_lit(&mut self, a: i32, b: i32) -> i32 {
        let y = self.new_var();
        self.encode_and(a, b, y);
        y
    }

    fn or_lit(&mut self, a: i32, b: i32) -> i32 {
        let y = self.new_var();
        self.encode_or(a, b, y);
        y
    }

    fn xor_lit(&mut self, a: i32, b: i32) -> i32 {
        let y = self.new_var();
        self.encode_xor(a, b, y);
        y
    }

    fn mux_lit(&mut self, s: i32, a: i32, b: i32) -> i32 {
        let y = self.new_var();
        self.encode_mux(s, a, b, y);
        y
    }

    fn reduce(&mut self, lits: &[i32], op: fn(&mut SatGen, i32, i32) -> i32, empty: i32) -> i32 {
        match lits {
            [] => empty,
            [lit] => *lit,
            _ => lits[1..].iter().fold(lits[0], |acc, &lit| op(self, acc, lit)),
        }
    }

    /// A literal that is true iff the two vectors differ
    pub fn vec_ne(&mut self, a: &[i32], b: &[i32]) -> i32 {
        assert_eq!(a.len(), b.len());
        let diffs: Vec<i32> = a.iter().zip(b.iter()).map(|(&x, &y)| self.xor_lit(x, y)).collect();
        let fal = self.lit_false();
        self.reduce(&diffs, SatGen::or_lit, fal)
    }

    fn extend_lits(&mut self, lits: &mut Vec<i32>, width: usize, signed: bool) {
        let pad = match lits.last() {
            Some(&lit) if signed => lit,
            _ => self.lit_false(),
        };
        lits.resize(width, pad);
        lits.truncate(width);
    }

    fn signed_param(cell: &Cell, name: &str) -> bool {
        cell.parameters.get(&IdString::from(name)).map(|v| v.as_bool()).unwrap_or(false)
    }

    fn port_lits(&mut self, sigmap: &SigMap, cell: &Cell, port: &str) -> Option<Vec<i32>> {
        cell.connections.get(&IdString::from(port)).map(|sig| self.import_sigspec(sigmap, sig))
    }

    fn encode_adder(&mut self, a: &[i32], b: &[i32], y: &[i32], mut carry: i32) {
        for i in 0..y.len() {
            let half = self.xor_lit(a[i], b[i]);
            let sum = self.xor_lit(half, carry);
            self.encode_buf(sum, y[i]);
            let t1 = self.and_lit(a[i], b[i]);
            let t2 = self.and_lit(a[i], carry);
            let t3 = self.and_lit(b[i], carry);
            let t12 = self.or_lit(t1, t2);
            carry = self.or_lit(t12, t3);
        }
    }

    /// Translate the semantics of a combinational cell into clauses
    ///
    /// Returns false for cell types without an encoding (stateful cells
    /// and the word-level operators no pass proves facts about).
    pub fn import_cell(&mut self, sigmap: &SigMap, cell: &Cell) -> bool {
        let signed_a = SatGen::signed_param(cell, "\\A_SIGNED");
        let signed_b = SatGen::signed_param(cell, "\\B_SIGNED");
        match cell.ty.as_str() {
            "$_INV_" | "$not" | "$pos" => {
                let Some(mut a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                self.extend_lits(&mut a, y.len(), signed_a);
                for (&ai, &yi) in a.iter().zip(y.iter()) {
                    if cell.ty.as_str() == "$pos" {
                        self.encode_buf(ai, yi);
                    } else {
                        self.encode_not(ai, yi);
                    }
                }
                true
            }
            "$neg" => {
                let Some(mut a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                self.extend_lits(&mut a, y.len(), signed_a);
                let inv: Vec<i32> = a.iter().map(|&lit| -lit).collect();
                let zero: Vec<i32> = (0..y.len()).map(|_| self.lit_false()).collect();
                let one = self.lit_true();
                self.encode_adder(&inv, &zero, &y, one);
                true
            }
            "$_AND_" | "$_OR_" | "$_XOR_" | "$and" | "$or" | "$xor" | "$xnor" => {
                let Some(mut a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(mut b) = self.port_lits(sigmap, cell, "\\B") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                self.extend_lits(&mut a, y.len(), signed_a);
                self.extend_lits(&mut b, y.len(), signed_b);
                for i in 0..y.len() {
                    match cell.ty.as_str() {
                        "$_AND_" | "$and" => self.encode_and(a[i], b[i], y[i]),
                        "$_OR_" | "$or" => self.encode_or(a[i], b[i], y[i]),
                        "$_XOR_" | "$xor" => self.encode_xor(a[i], b[i], y[i]),
                        _ => self.encode_xor(a[i], b[i], -y[i]),
                    }
                }
                true
            }
            "$reduce_and" | "$reduce_or" | "$reduce_bool" | "$reduce_xor" | "$reduce_xnor"
            | "$logic_not" => {
                let Some(a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                let tru = self.lit_true();
                let fal = self.lit_false();
                let reduced = match cell.ty.as_str() {
                    "$reduce_and" => self.reduce(&a, SatGen::and_lit, tru),
                    "$reduce_xor" | "$reduce_xnor" => self.reduce(&a, SatGen::xor_lit, fal),
                    _ => self.reduce(&a, SatGen::or_lit, fal),
                };
                let reduced = match cell.ty.as_str() {
                    "$reduce_xnor" | "$logic_not" => -reduced,
                    _ => reduced,
                };
                self.assign_bit_result(&y, reduced);
                true
            }
            "$logic_and" | "$logic_or" => {
                let Some(a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(b) = self.port_lits(sigmap, cell, "\\B") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                let fal = self.lit_false();
                let ra = self.reduce(&a, SatGen::or_lit, fal);
                let rb = self.reduce(&b, SatGen::or_lit, fal);
                let out = match cell.ty.as_str() {
                    "$logic_and" => self.and_lit(ra, rb),
                    _ => self.or_lit(ra, rb),
                };
                self.assign_bit_result(&y, out);
                true
            }
            "$eq" | "$ne" => {
                let Some(mut a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(mut b) = self.port_lits(sigmap, cell, "\\B") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                let width = a.len().max(b.len());
                self.extend_lits(&mut a, width, signed_a && signed_b);
                self.extend_lits(&mut b, width, signed_a && signed_b);
                let ne = self.vec_ne(&a, &b);
                let out = if cell.ty.as_str() == "$eq" { -ne } else { ne };
                self.assign_bit_result(&y, out);
                true
            }
            "$add" | "$sub" => {
                let Some(mut a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(mut b) = self.port_lits(sigmap, cell, "\\B") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                self.extend_lits(&mut a, y.len(), signed_a);
                self.extend_lits(&mut b, y.len(), signed_b);
                if cell.ty.as_str() == "$sub" {
                    let inv: Vec<i32> = b.iter().map(|&lit| -lit).collect();
                    let one = self.lit_true();
                    self.encode_adder(&a, &inv, &y, one);
                } else {
                    let zero = self.lit_false();
                    self.encode_adder(&a, &b, &y, zero);
                }
                true
            }
            "$_MUX_" | "$mux" => {
                let Some(a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(b) = self.port_lits(sigmap, cell, "\\B") else { return false };
                let Some(s) = self.port_lits(sigmap, cell, "\\S") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                if s.len() != 1 || a.len() != y.len() || b.len() != y.len() {
                    return false;
                }
                for i in 0..y.len() {
                    self.encode_mux(s[0], a[i], b[i], y[i]);
                }
                true
            }
            "$pmux" | "$safe_pmux" => {
                let Some(a) = self.port_lits(sigmap, cell, "\\A") else { return false };
                let Some(b) = self.port_lits(sigmap, cell, "\\B") else { return false };
                let Some(s) = self.port_lits(sigmap, cell, "\\S") else { return false };
                let Some(y) = self.port_lits(sigmap, cell, "\\Y") else { return false };
                let width = y.len();
                if a.len() != width || b.len() != width * s.len() {
                    return false;
                }
                let mut current = a;
                for (i, &sel) in s.iter().enumerate() {
                    let slice = &b[i * width..(i + 1) * width];
                    current = current
                        .iter()
                        .zip(slice.iter())
                        .map(|(&prev, &next)| self.mux_lit(sel, prev, next))
                        .collect();
                }
                for (&cur, &yi) in current.iter().zip(y.iter()) {
                    self.encode_buf(cur, yi);
                }
                true
            }
            "$lut" => {
                let Some(input) = self.port_lits(sigmap, cell, "\\I") else { return false };
                let Some(out) = self.port_lits(sigmap, cell, "\\O") else { return false };
                let Some(table) = cell.parameters.get(&IdString::from("\\LUT")).cloned() else {
                    return false;
                };
                if out.len() != 1 || table.bits.len() != 1 << input.len() {
                    return false;
                }
                for (index, &bit) in table.bits.iter().enumerate() {
                    let polarity = match bit {
                        State::S0 => -out[0],
                        State::S1 => out[0],
                        _ => continue,
                    };
                    // (I == index) implies the table output.
                    let mut clause: Vec<i32> = input
                        .iter()
                        .enumerate()
                        .map(|(j, &lit)| if index >> j & 1 != 0 { -lit } else { lit })
                        .collect();
                    clause.push(polarity);
                    self.clauses.push(clause);
                }
                true
            }
            _ => false,
        }
    }

    /// First output bit takes `lit`, remaining bits are forced to zero
    fn assign_bit_result(&mut self, y: &[i32], lit: i32) {
        if let Some(&y0) = y.first() {
            self.encode_buf(lit, y0);
        }
        for &yi in y.iter().skip(1) {
            let fal = self.lit_false();
            self.encode_buf(fal, yi);
        }
    }

    /// Solve the accumulated clauses plus `extra`, returning the values of
    /// `model_lits` on success and `None` on UNSAT
    ///
    /// Panics when the solver gives up; the callers treat that as fatal.
    pub fn solve(&self, extra: &[Vec<i32>], model_lits: &[i32]) -> Option<Vec<bool>> {
        let mut solver = Solver::new();
        for clause in self.clauses.iter().chain(extra.iter()) {
            solver.add_clause(clause.iter().copied());
        }
        match solver.solve() {
            None => panic!("SAT solver failed to reach a verdict"),
            Some(false) => None,
            Some(true) => Some(
                model_lits.iter().map(|&lit| solver.value(lit).unwrap_or(false)).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtlil::{escape_id, Cell, Module, SigSpec};

    fn and_cell(module: &mut Module) -> (SigSpec, SigSpec, SigSpec) {
        let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
        let b = SigSpec::from_wire(module.new_wire(escape_id("b"), 1));
        let y = SigSpec::from_wire(module.new_wire(escape_id("y"), 1));
        let mut cell = Cell::new(escape_id("g"), IdString::from("$_AND_"));
        cell.connections.insert(IdString::from("\\A"), a.clone());
        cell.connections.insert(IdString::from("\\B"), b.clone());
        cell.connections.insert(IdString::from("\\Y"), y.clone());
        module.add_cell(cell);
        (a, b, y)
    }

    #[test]
    fn test_and_gate_model() {
        let mut module = Module::new(escape_id("top"));
        let (a, b, y) = and_cell(&mut module);
        let sigmap = SigMap::from_module(&module);
        let mut satgen = SatGen::new();
        assert!(satgen.import_cell(&sigmap, &module.cells[&escape_id("g")]));
        let la = satgen.import_sigspec(&sigmap, &a);
        let lb = satgen.import_sigspec(&sigmap, &b);
        let ly = satgen.import_sigspec(&sigmap, &y);
        // Forcing the output high forces both inputs high.
        let model = satgen.solve(&[vec![ly[0]]], &[la[0], lb[0]]).unwrap();
        assert_eq!(model, vec![true, true]);
        // y=1 with a=0 is unsatisfiable.
        assert!(satgen.solve(&[vec![ly[0]], vec![-la[0]]], &[]).is_none());
    }

    #[test]
    fn test_unsupported_cell_rejected() {
        let mut module = Module::new(escape_id("top"));
        let q = SigSpec::from_wire(module.new_wire(escape_id("q"), 1));
        let mut cell = Cell::new(escape_id("ff"), IdString::from("$dff"));
        cell.connections.insert(IdString::from("\\Q"), q);
        module.add_cell(cell);
        let sigmap = SigMap::from_module(&module);
        let mut satgen = SatGen::new();
        assert!(!satgen.import_cell(&sigmap, &module.cells[&escape_id("ff")]));
    }

    #[test]
    fn test_vec_ne() {
        let mut satgen = SatGen::new();
        let a = vec![satgen.new_var(), satgen.new_var()];
        let b = vec![satgen.new_var(), satgen.new_var()];
        let ne = satgen.vec_ne(&a, &b);
        // Equal vectors with ne asserted: unsatisfiable.
        let eq_clauses: Vec<Vec<i32>> = a
            .iter()
            .zip(b.iter())
            .flat_map(|(&x, &y)| [vec![x, -y], vec![-x, y]])
            .collect();
        let mut extra = eq_clauses.clone();
        extra.push(vec![ne]);
        assert!(satgen.solve(&extra, &[]).is_none());
        // Unconstrained vectors can differ.
        assert!(satgen.solve(&[vec![ne]], &[]).is_some());
    }
}
