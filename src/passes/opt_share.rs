//! Structural common-subexpression elimination of cells

use std::collections::BTreeMap;
use std::fmt::Write;

use log::{debug, info};

use crate::celltypes::CellTypes;
use crate::pass::{extra_args, Pass, Scope};
use crate::rtlil::{Cell, Design, IdString, Module, SigSpec};
use crate::sigtools::SigMap;
use crate::Error;

/// Cell types whose A and B inputs commute
const COMMUTATIVE_TYPES: &[&str] = &[
    "$and", "$or", "$xor", "$xnor", "$add", "$mul", "$logic_and", "$logic_or", "$_AND_", "$_OR_",
    "$_XOR_",
];

/// Canonical fingerprint of a cell's type, parameters and inputs
///
/// Commutative inputs are swapped into a fixed order and reduction inputs
/// are sorted, so structurally identical cells produce equal fingerprints.
/// Output connections do not participate.
fn cell_fingerprint(cell: &Cell, assign_map: &SigMap, ct: &CellTypes) -> String {
    let mut fp = format!("{}\n", cell.ty);
    for (name, value) in &cell.parameters {
        writeln!(fp, "P {}={}", name, value.as_string()).unwrap();
    }

    let id_a = IdString::from("\\A");
    let id_b = IdString::from("\\B");
    let mut conn: BTreeMap<IdString, SigSpec> = cell.connections.clone();

    if COMMUTATIVE_TYPES.contains(&cell.ty.as_str()) {
        if let (Some(a), Some(b)) = (conn.get(&id_a), conn.get(&id_b)) {
            if assign_map.map(a) < assign_map.map(b) {
                let a = conn[&id_a].clone();
                let b = conn[&id_b].clone();
                conn.insert(id_a.clone(), b);
                conn.insert(id_b.clone(), a);
            }
        }
    } else if matches!(cell.ty.as_str(), "$reduce_xor" | "$reduce_xnor") {
        if let Some(a) = conn.get_mut(&id_a) {
            *a = assign_map.map(a);
            a.sort();
        }
    } else if matches!(cell.ty.as_str(), "$reduce_and" | "$reduce_or" | "$reduce_bool") {
        if let Some(a) = conn.get_mut(&id_a) {
            *a = assign_map.map(a);
            a.sort_and_unify();
        }
    }

    for (port, sig) in &conn {
        if ct.cell_output(&cell.ty, port) {
            continue;
        }
        write!(fp, "C {}=", port).unwrap();
        for chunk in assign_map.map(sig).chunks() {
            match &chunk.wire {
                Some(name) => write!(fp, "{{{} {} {}}}", name, chunk.offset, chunk.width).unwrap(),
                None => fp.push_str(&chunk.data.as_string()),
            }
        }
        fp.push('\n');
    }
    fp
}

/// Merge identical cells in one module; returns the number removed
fn share_module(module: &mut Module, mod_name: &IdString, scope: &Scope, nomux: bool) -> usize {
    let mut ct = CellTypes::new();
    ct.setup_internals();
    ct.setup_internals_mem();
    ct.setup_stdcells();
    ct.setup_stdcells_mem();
    if nomux {
        ct.remove(&IdString::from("$mux"));
        ct.remove(&IdString::from("$pmux"));
        ct.remove(&IdString::from("$safe_pmux"));
    }

    info!("finding identical cells in module `{}'", mod_name);
    let mut assign_map = SigMap::from_module(module);
    let mut total = 0;

    loop {
        let cell_names: Vec<IdString> = module
            .cells
            .iter()
            .filter(|(name, cell)| ct.cell_known(&cell.ty) && scope.member(mod_name, name))
            .map(|(name, _)| name.clone())
            .collect();

        let mut did_something = false;
        let mut sharemap: BTreeMap<String, IdString> = BTreeMap::new();

        for name in cell_names {
            let Some(cell) = module.cells.get(&name) else { continue };
            let fingerprint = cell_fingerprint(cell, &assign_map, &ct);
            match sharemap.get(&fingerprint) {
                Some(original) => {
                    debug!("cell `{}' is identical to cell `{}'", name, original);
                    let original_cell = &module.cells[original];
                    let mut redirects: Vec<(SigSpec, SigSpec)> = Vec::new();
                    for (port, sig) in &cell.connections {
                        if ct.cell_output(&cell.ty, port) {
                            if let Some(other_sig) = original_cell.connections.get(port) {
                                redirects.push((sig.clone(), other_sig.clone()));
                            }
                        }
                    }
                    for (sig, other_sig) in redirects {
                        assign_map.add(&sig, &other_sig);
                        module.connections.push((sig, other_sig));
                    }
                    debug!("removing duplicate cell `{}' from module `{}'", name, mod_name);
                    module.cells.remove(&name);
                    did_something = true;
                    total += 1;
                }
                None => {
                    sharemap.insert(fingerprint, name);
                }
            }
        }

        if !did_something {
            return total;
        }
    }
}

/// Merge cells with identical type, parameters and input signals
pub struct OptSharePass;

impl Pass for OptSharePass {
    fn name(&self) -> &'static str {
        "opt_share"
    }

    fn help(&self) -> &'static str {
        "opt_share [-nomux] [selection]: consolidate identical cells"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        let mut mode_nomux = false;
        let mut argidx = 1;
        while argidx < args.len() {
            match args[argidx].as_str() {
                "-nomux" => {
                    mode_nomux = true;
                    argidx += 1;
                }
                _ => break,
            }
        }
        extra_args(args, argidx, design)?;

        let scope = Scope::of(design);
        let mut total = 0;
        let mod_names: Vec<IdString> = design.modules.keys().cloned().collect();
        for mod_name in mod_names {
            if !scope.module(&mod_name) {
                continue;
            }
            let module = design.modules.get_mut(&mod_name).unwrap();
            total += share_module(module, &mod_name, &scope, mode_nomux);
        }
        info!("removed a total of {total} cells");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::call;
    use crate::rtlil::escape_id;

    fn and2(module: &mut Module, name: &str, ty: &str, a: &SigSpec, b: &SigSpec, y: &SigSpec) {
        let mut cell = Cell::new(escape_id(name), IdString::from(ty));
        cell.connections.insert(IdString::from("\\A"), a.clone());
        cell.connections.insert(IdString::from("\\B"), b.clone());
        cell.connections.insert(IdString::from("\\Y"), y.clone());
        module.add_cell(cell);
    }

    #[test]
    fn test_share_identical_cells() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
        let b = SigSpec::from_wire(module.new_wire(escape_id("b"), 1));
        let y1 = SigSpec::from_wire(module.new_wire(escape_id("y1"), 1));
        let y2 = SigSpec::from_wire(module.new_wire(escape_id("y2"), 1));
        and2(&mut module, "g1", "$and", &a, &b, &y1);
        and2(&mut module, "g2", "$and", &a, &b, &y2);
        design.add_module(module);

        call(&mut design, "opt_share").unwrap();
        let module = &design.modules[&escape_id("top")];
        assert_eq!(module.cells.len(), 1);
        assert_eq!(module.connections.len(), 1);
        let (lhs, rhs) = &module.connections[0];
        assert!(
            (*lhs == y1 && *rhs == y2) || (*lhs == y2 && *rhs == y1),
            "expected a connection between the two outputs"
        );
    }

    #[test]
    fn test_share_commuted_inputs() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
        let b = SigSpec::from_wire(module.new_wire(escape_id("b"), 1));
        let y1 = SigSpec::from_wire(module.new_wire(escape_id("y1"), 1));
        let y2 = SigSpec::from_wire(module.new_wire(escape_id("y2"), 1));
        let y = SigSpec::from_wire(module.new_wire(escape_id("y"), 1));
        and2(&mut module, "g1", "$_AND_", &a, &b, &y1);
        and2(&mut module, "g2", "$_AND_", &b, &a, &y2);
        and2(&mut module, "g3", "$_AND_", &y1, &y2, &y);
        design.add_module(module);

        call(&mut design, "opt_share").unwrap();
        // The commuted pair merges; g3 survives.
        assert_eq!(design.modules[&escape_id("top")].cells.len(), 2);
    }

    #[test]
    fn test_share_is_confluent() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
        let b = SigSpec::from_wire(module.new_wire(escape_id("b"), 1));
        let y1 = SigSpec::from_wire(module.new_wire(escape_id("y1"), 1));
        let y2 = SigSpec::from_wire(module.new_wire(escape_id("y2"), 1));
        and2(&mut module, "g1", "$xor", &a, &b, &y1);
        and2(&mut module, "g2", "$xor", &b, &a, &y2);
        design.add_module(module);

        call(&mut design, "opt_share").unwrap();
        let count = design.modules[&escape_id("top")].cells.len();
        call(&mut design, "opt_share").unwrap();
        assert_eq!(design.modules[&escape_id("top")].cells.len(), count);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_nomux_keeps_muxes() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
        let b = SigSpec::from_wire(module.new_wire(escape_id("b"), 1));
        let s = SigSpec::from_wire(module.new_wire(escape_id("s"), 1));
        let y1 = SigSpec::from_wire(module.new_wire(escape_id("y1"), 1));
        let y2 = SigSpec::from_wire(module.new_wire(escape_id("y2"), 1));
        for (name, y) in [("m1", &y1), ("m2", &y2)] {
            let mut cell = Cell::new(escape_id(name), IdString::from("$mux"));
            cell.connections.insert(IdString::from("\\A"), a.clone());
            cell.connections.insert(IdString::from("\\B"), b.clone());
            cell.connections.insert(IdString::from("\\S"), s.clone());
            cell.connections.insert(IdString::from("\\Y"), y.clone());
            module.add_cell(cell);
        }
        design.add_module(module);

        call(&mut design, "opt_share -nomux").unwrap();
        assert_eq!(design.modules[&escape_id("top")].cells.len(), 2);
        call(&mut design, "opt_share").unwrap();
        assert_eq!(design.modules[&escape_id("top")].cells.len(), 1);
    }
}
