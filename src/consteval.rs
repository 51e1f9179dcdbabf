//! Demand-driven constant propagation through the cells of a module

use std::collections::{BTreeMap, BTreeSet};

use crate::celltypes::CellTypes;
use crate::rtlil::{Cell, Const, IdString, Module, SigBit, SigSpec, State};
use crate::sigtools::{SigMap, SigSet};

/// Evaluates signals of a module under an input assignment
///
/// Inputs are bound with [`set`](ConstEval::set); [`eval`](ConstEval::eval)
/// then resolves a signal by pulling values through the driving cells.
/// Evaluation fails on unbound bits, unknown cell types and combinational
/// loops.
pub struct ConstEval<'a> {
    module: &'a Module,
    sigmap: SigMap,
    ct: CellTypes<'a>,
    driver: SigSet<IdString>,
    values: BTreeMap<SigBit, State>,
    busy: BTreeSet<IdString>,
}

impl<'a> ConstEval<'a> {
    /// Build the driver index for a module
    pub fn new(module: &'a Module) -> ConstEval<'a> {
        let mut ct = CellTypes::new();
        ct.setup_internals();
        ct.setup_stdcells();
        let sigmap = SigMap::from_module(module);
        let mut driver: SigSet<IdString> = SigSet::new();
        for cell in module.cells.values() {
            if !ct.cell_known(&cell.ty) {
                continue;
            }
            for (port, sig) in &cell.connections {
                if ct.cell_output(&cell.ty, port) {
                    driver.insert(&sigmap.map(sig), cell.name.clone());
                }
            }
        }
        ConstEval { module, sigmap, ct, driver, values: BTreeMap::new(), busy: BTreeSet::new() }
    }

    /// Forget all bound values
    pub fn clear(&mut self) {
        self.values.clear();
        self.busy.clear();
    }

    /// Bind the bits of a signal to a constant value
    pub fn set(&mut self, sig: &SigSpec, value: &Const) {
        let sig = self.sigmap.map(sig);
        assert_eq!(sig.width(), value.width());
        for (bit, &state) in sig.bits().into_iter().zip(value.bits.iter()) {
            if let SigBit::Wire { .. } = bit {
                let prev = self.values.insert(bit, state);
                debug_assert!(prev.is_none() || prev == Some(state));
            }
        }
    }

    /// Resolve a signal to constants, rewriting it in place
    ///
    /// Returns false when some bit cannot be resolved; the signal is left
    /// unchanged in that case.
    pub fn eval(&mut self, sig: &mut SigSpec) -> bool {
        let mapped = self.sigmap.map(sig);
        let mut bits = Vec::with_capacity(mapped.width());
        for bit in mapped.bits() {
            match self.resolve(&bit) {
                Some(state) => bits.push(state),
                None => return false,
            }
        }
        *sig = SigSpec::from(Const::from_bits(bits));
        true
    }

    fn resolve(&mut self, bit: &SigBit) -> Option<State> {
        if let SigBit::Const(state) = bit {
            return Some(*state);
        }
        if let Some(&state) = self.values.get(bit) {
            return Some(state);
        }
        let drivers = self.driver.find(&SigSpec::from_bits([bit.clone()]));
        let cell_name = drivers.into_iter().next()?;
        if !self.busy.insert(cell_name.clone()) {
            // Combinational loop.
            return None;
        }
        let ok = self.eval_cell(&cell_name);
        self.busy.remove(&cell_name);
        if !ok {
            return None;
        }
        self.values.get(bit).copied()
    }

    fn input_const(&mut self, cell: &Cell, port: &str) -> Option<Const> {
        let mut sig = cell.connections.get(&IdString::from(port))?.clone();
        if self.eval(&mut sig) {
            Some(sig.as_const())
        } else {
            None
        }
    }

    fn eval_cell(&mut self, cell_name: &IdString) -> bool {
        let module = self.module;
        let cell = &module.cells[cell_name];
        let Some(sig_y) = cell
            .connections
            .iter()
            .find(|(port, _)| self.ct.cell_output(&cell.ty, port))
            .map(|(_, sig)| sig.clone())
        else {
            return false;
        };

        let Some(mut result) = self.compute_cell(cell) else { return false };
        let mapped_y = self.sigmap.map(&sig_y);
        result.bits.resize(mapped_y.width(), State::S0);
        for (bit, &state) in mapped_y.bits().into_iter().zip(result.bits.iter()) {
            if let SigBit::Wire { .. } = bit {
                self.values.insert(bit, state);
            }
        }
        true
    }

    fn compute_cell(&mut self, cell: &Cell) -> Option<Const> {
        match cell.ty.as_str() {
            "$mux" | "$pmux" | "$safe_pmux" | "$_MUX_" => {
                let a = self.input_const(cell, "\\A")?;
                let b = self.input_const(cell, "\\B")?;
                let s = self.input_const(cell, "\\S")?;
                CellTypes::eval_select(cell, &a, &b, &s)
            }
            "$lut" => {
                let input = self.input_const(cell, "\\I")?;
                let table = cell.parameters.get(&IdString::from("\\LUT"))?;
                if !input.is_fully_def() {
                    Some(Const::fill(State::Sx, 1))
                } else {
                    let index = input.as_int() as usize;
                    Some(Const::from_bits(vec![*table.bits.get(index)?]))
                }
            }
            _ => {
                let a = self.input_const(cell, "\\A")?;
                let b = match cell.connections.contains_key(&IdString::from("\\B")) {
                    true => self.input_const(cell, "\\B")?,
                    false => Const::new(),
                };
                CellTypes::eval_cell(cell, &a, &b)
            }
        }
    }

    /// Evaluate and return the constant, when resolvable
    pub fn eval_const(&mut self, sig: &SigSpec) -> Option<Const> {
        let mut sig = sig.clone();
        if self.eval(&mut sig) {
            Some(sig.as_const())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtlil::{escape_id, Module, Wire};

    fn gate(module: &mut Module, name: &str, ty: &str, conns: &[(&str, SigSpec)]) {
        let mut cell = Cell::new(escape_id(name), IdString::from(ty));
        for (port, sig) in conns {
            cell.connections.insert(IdString::from(*port), sig.clone());
        }
        module.add_cell(cell);
    }

    fn bit(wire: &Wire) -> SigSpec {
        SigSpec::from_wire(wire)
    }

    #[test]
    fn test_eval_through_gates() {
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 1).clone();
        let b = module.new_wire(escape_id("b"), 1).clone();
        let n = module.new_wire(escape_id("n"), 1).clone();
        let y = module.new_wire(escape_id("y"), 1).clone();
        gate(&mut module, "g1", "$_AND_", &[("\\A", bit(&a)), ("\\B", bit(&b)), ("\\Y", bit(&n))]);
        gate(&mut module, "g2", "$_INV_", &[("\\A", bit(&n)), ("\\Y", bit(&y))]);

        let mut ce = ConstEval::new(&module);
        ce.set(&bit(&a), &Const::from_int(1, 1));
        ce.set(&bit(&b), &Const::from_int(1, 1));
        assert_eq!(ce.eval_const(&bit(&y)), Some(Const::from_int(0, 1)));

        ce.clear();
        ce.set(&bit(&a), &Const::from_int(0, 1));
        ce.set(&bit(&b), &Const::from_int(1, 1));
        assert_eq!(ce.eval_const(&bit(&y)), Some(Const::from_int(1, 1)));
    }

    #[test]
    fn test_unbound_input_fails() {
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 1).clone();
        let y = module.new_wire(escape_id("y"), 1).clone();
        gate(&mut module, "g", "$_INV_", &[("\\A", bit(&a)), ("\\Y", bit(&y))]);
        let mut ce = ConstEval::new(&module);
        let mut sig = bit(&y);
        assert!(!ce.eval(&mut sig));
        assert_eq!(sig, bit(&y));
    }

    #[test]
    fn test_loop_fails() {
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 1).clone();
        let b = module.new_wire(escape_id("b"), 1).clone();
        gate(&mut module, "g1", "$_INV_", &[("\\A", bit(&a)), ("\\Y", bit(&b))]);
        gate(&mut module, "g2", "$_INV_", &[("\\A", bit(&b)), ("\\Y", bit(&a))]);
        let mut ce = ConstEval::new(&module);
        assert_eq!(ce.eval_const(&bit(&a)), None);
    }

    #[test]
    fn test_eval_follows_connections() {
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 1).clone();
        let b = module.new_wire(escape_id("b"), 1).clone();
        module.connections.push((bit(&b), bit(&a)));
        let mut ce = ConstEval::new(&module);
        ce.set(&bit(&a), &Const::from_int(1, 1));
        assert_eq!(ce.eval_const(&bit(&b)), Some(Const::from_int(1, 1)));
    }

    #[test]
    fn test_wide_arith() {
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 4).clone();
        let y = module.new_wire(escape_id("y"), 4).clone();
        let mut cell = Cell::new(escape_id("add"), IdString::from("$add"));
        cell.connections.insert(IdString::from("\\A"), bit(&a));
        cell.connections.insert(IdString::from("\\B"), SigSpec::from_int(3, 4));
        cell.connections.insert(IdString::from("\\Y"), bit(&y));
        cell.parameters.insert(IdString::from("\\Y_WIDTH"), Const::from_int(4, 32));
        module.add_cell(cell);
        let mut ce = ConstEval::new(&module);
        ce.set(&bit(&a), &Const::from_int(4, 4));
        assert_eq!(ce.eval_const(&bit(&y)), Some(Const::from_int(7, 4)));
    }
}
