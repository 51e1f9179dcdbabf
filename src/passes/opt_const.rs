//! Constant folding of cells with fully-constant inputs

use log::{debug, info};

use crate::celltypes::CellTypes;
use crate::pass::{extra_args, Pass, Scope};
use crate::rtlil::{Const, Design, IdString, Module, State};
use crate::sigtools::SigMap;
use crate::Error;

const UNARY_TYPES: &[&str] = &[
    "$not", "$pos", "$neg", "$reduce_and", "$reduce_or", "$reduce_xor", "$reduce_xnor",
    "$reduce_bool", "$logic_not", "$_INV_",
];

const BINARY_TYPES: &[&str] = &[
    "$and", "$or", "$xor", "$xnor", "$shl", "$shr", "$sshl", "$sshr", "$lt", "$le", "$eq", "$ne",
    "$ge", "$gt", "$add", "$sub", "$mul", "$div", "$mod", "$pow", "$logic_and", "$logic_or",
    "$_AND_", "$_OR_", "$_XOR_",
];

const MUX_TYPES: &[&str] = &["$mux", "$pmux", "$safe_pmux", "$_MUX_"];

/// Fold one module to fixpoint; returns the number of folded cells
fn opt_const_module(module: &mut Module, mod_name: &IdString, scope: &Scope) -> usize {
    let mut total = 0;
    loop {
        let sigmap = SigMap::from_module(module);
        let cell_names: Vec<IdString> = module.cells.keys().cloned().collect();
        let mut did_something = false;

        for name in cell_names {
            if !scope.member(mod_name, &name) {
                continue;
            }
            let Some(cell) = module.cells.get(&name) else { continue };
            let ty = cell.ty.as_str();

            let result = if MUX_TYPES.contains(&ty) {
                let get = |port: &str| {
                    cell.connections.get(&IdString::from(port)).map(|sig| sigmap.map(sig))
                };
                match (get("\\A"), get("\\B"), get("\\S")) {
                    (Some(a), Some(b), Some(s))
                        if a.is_fully_const() && b.is_fully_const() && s.is_fully_const() =>
                    {
                        CellTypes::eval_select(cell, &a.as_const(), &b.as_const(), &s.as_const())
                    }
                    _ => None,
                }
            } else if UNARY_TYPES.contains(&ty) || BINARY_TYPES.contains(&ty) {
                let a = cell.connections.get(&IdString::from("\\A")).map(|sig| sigmap.map(sig));
                let b = cell.connections.get(&IdString::from("\\B")).map(|sig| sigmap.map(sig));
                match (a, b, BINARY_TYPES.contains(&ty)) {
                    (Some(a), Some(b), true) if a.is_fully_const() && b.is_fully_const() => {
                        CellTypes::eval_cell(cell, &a.as_const(), &b.as_const())
                    }
                    (Some(a), None, false) if a.is_fully_const() => {
                        CellTypes::eval_cell(cell, &a.as_const(), &Const::new())
                    }
                    _ => None,
                }
            } else {
                None
            };

            let Some(mut value) = result else { continue };
            let sig_y = cell.connections[&IdString::from("\\Y")].clone();
            value.bits.resize(sig_y.width(), State::S0);
            debug!("folding cell {} in module {} to {}", name, mod_name, value.as_string());
            module.connections.push((sig_y, crate::rtlil::SigSpec::from(value)));
            module.cells.remove(&name);
            did_something = true;
            total += 1;
        }

        if !did_something {
            return total;
        }
    }
}

/// Replace cells whose inputs are fully constant with constant drivers
pub struct OptConstPass;

impl Pass for OptConstPass {
    fn name(&self) -> &'static str {
        "opt_const"
    }

    fn help(&self) -> &'static str {
        "opt_const [selection]: fold cells with constant inputs"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        extra_args(args, 1, design)?;
        let scope = Scope::of(design);
        let mut total = 0;
        let mod_names: Vec<IdString> = design.modules.keys().cloned().collect();
        for mod_name in mod_names {
            if !scope.module(&mod_name) {
                continue;
            }
            let module = design.modules.get_mut(&mod_name).unwrap();
            total += opt_const_module(module, &mod_name, &scope);
        }
        if total > 0 {
            info!("folded {total} constant cells");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::call;
    use crate::rtlil::{escape_id, Cell, SigSpec};

    #[test]
    fn test_fold_chain() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let n = module.new_wire(escape_id("n"), 1).clone();
        let y = module.new_wire(escape_id("y"), 1).clone();
        let mut inv = Cell::new(escape_id("g1"), IdString::from("$_INV_"));
        inv.connections.insert(IdString::from("\\A"), SigSpec::from_int(0, 1));
        inv.connections.insert(IdString::from("\\Y"), SigSpec::from_wire(&n));
        module.add_cell(inv);
        let mut and = Cell::new(escape_id("g2"), IdString::from("$_AND_"));
        and.connections.insert(IdString::from("\\A"), SigSpec::from_wire(&n));
        and.connections.insert(IdString::from("\\B"), SigSpec::from_int(1, 1));
        and.connections.insert(IdString::from("\\Y"), SigSpec::from_wire(&y));
        module.add_cell(and);
        design.add_module(module);

        call(&mut design, "opt_const").unwrap();
        let module = &design.modules[&escape_id("top")];
        // Both gates fold: first the inverter, then the AND through the
        // new constant connection.
        assert!(module.cells.is_empty());
        let driven: Vec<_> = module
            .connections
            .iter()
            .filter(|(lhs, _)| *lhs == SigSpec::from_wire(&y))
            .collect();
        assert_eq!(driven.len(), 1);
        assert_eq!(driven[0].1, SigSpec::from_int(1, 1));
    }

    #[test]
    fn test_nonconst_untouched() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 1).clone();
        let y = module.new_wire(escape_id("y"), 1).clone();
        let mut inv = Cell::new(escape_id("g"), IdString::from("$_INV_"));
        inv.connections.insert(IdString::from("\\A"), SigSpec::from_wire(&a));
        inv.connections.insert(IdString::from("\\Y"), SigSpec::from_wire(&y));
        module.add_cell(inv);
        design.add_module(module);

        call(&mut design, "opt_const").unwrap();
        assert_eq!(design.modules[&escape_id("top")].cells.len(), 1);
    }
}
