//! Removal of flip-flops with constant or feedback inputs

use log::{debug, info};

use crate::pass::{extra_args, Pass, Scope};
use crate::rtlil::{Const, Design, IdString, Module, SigSpec};
use crate::sigtools::{SigMap, SigSet};
use crate::Error;

/// Returns true if the type is a `$_DFF_<C><R><V>_` primitive
fn is_dff_rv(ty: &str) -> bool {
    let bytes = ty.as_bytes();
    ty.len() == 10
        && ty.starts_with("$_DFF_")
        && ty.ends_with('_')
        && matches!(bytes[6], b'N' | b'P')
        && matches!(bytes[7], b'N' | b'P')
        && matches!(bytes[8], b'0' | b'1')
}

fn is_dff_type(ty: &str) -> bool {
    matches!(ty, "$_DFF_N_" | "$_DFF_P_" | "$dff" | "$adff") || is_dff_rv(ty)
}

/// Try to remove one flip-flop; returns true if the cell was deleted
fn handle_dff(
    module: &mut Module,
    name: &IdString,
    assign_map: &SigMap,
    mux_drivers: &SigSet<IdString>,
) -> bool {
    let cell = &module.cells[name];
    let ty = cell.ty.as_str().to_owned();
    let conn = |port: &str| cell.connections.get(&IdString::from(port)).cloned();

    let (sig_d, sig_q, sig_r, val_rv);
    if ty == "$_DFF_N_" || ty == "$_DFF_P_" {
        sig_d = conn("\\D");
        sig_q = conn("\\Q");
        sig_r = None;
        val_rv = Const::new();
    } else if is_dff_rv(&ty) {
        sig_d = conn("\\D");
        sig_q = conn("\\Q");
        sig_r = conn("\\R");
        val_rv = Const::from_int((ty.as_bytes()[8] == b'1') as i64, 1);
    } else if ty == "$dff" {
        sig_d = conn("\\D");
        sig_q = conn("\\Q");
        sig_r = None;
        val_rv = Const::new();
    } else if ty == "$adff" {
        sig_d = conn("\\D");
        sig_q = conn("\\Q");
        sig_r = conn("\\ARST");
        val_rv = cell.parameters.get(&IdString::from("\\ARST_VALUE")).cloned().unwrap_or_default();
    } else {
        unreachable!("not a flip-flop type: {ty}");
    }

    let (Some(sig_d), Some(sig_q)) = (sig_d, sig_q) else { return false };
    let sig_d = assign_map.map(&sig_d);
    let sig_q = assign_map.map(&sig_q);
    let has_reset = sig_r.map(|sig| sig.width() > 0).unwrap_or(false);

    let mut replacement: Option<(SigSpec, SigSpec)> = None;

    if ty == "$dff" && mux_drivers.has(&sig_d) {
        for mux_name in mux_drivers.find(&sig_d) {
            let Some(mux) = module.cells.get(&mux_name) else { continue };
            let sig_a = assign_map.map(&mux.connections[&IdString::from("\\A")]);
            let sig_b = assign_map.map(&mux.connections[&IdString::from("\\B")]);
            if sig_a == sig_q && sig_b.is_fully_const() {
                replacement = Some((sig_q.clone(), sig_b));
                break;
            }
            if sig_b == sig_q && sig_a.is_fully_const() {
                replacement = Some((sig_q.clone(), sig_a));
                break;
            }
        }
    }

    if replacement.is_none() && sig_d.is_fully_const() && !has_reset {
        replacement = Some((sig_q.clone(), sig_d.clone()));
    }

    let mut keep_connection = true;
    if replacement.is_none() && sig_d == sig_q {
        if has_reset {
            replacement = Some((sig_q.clone(), SigSpec::from(val_rv)));
        } else {
            replacement = Some((sig_q.clone(), sig_q.clone()));
            keep_connection = false;
        }
    }

    let Some((lhs, rhs)) = replacement else { return false };
    debug!("removing {} ({}) from module {}", name, ty, module.name);
    if keep_connection {
        module.connections.push((lhs, rhs));
    }
    module.cells.remove(name);
    true
}

/// Replace flip-flops with constant or pass-through inputs by direct
/// drivers
pub struct OptRmdffPass;

impl Pass for OptRmdffPass {
    fn name(&self) -> &'static str {
        "opt_rmdff"
    }

    fn help(&self) -> &'static str {
        "opt_rmdff [selection]: remove DFFs with constant inputs"
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
            let assign_map = SigMap::from_module(module);

            let mut mux_drivers: SigSet<IdString> = SigSet::new();
            let mut dff_list: Vec<IdString> = Vec::new();
            for (name, cell) in &module.cells {
                if matches!(cell.ty.as_str(), "$mux" | "$pmux") {
                    let a = &cell.connections[&IdString::from("\\A")];
                    let b = &cell.connections[&IdString::from("\\B")];
                    if a.width() == b.width() {
                        let y = &cell.connections[&IdString::from("\\Y")];
                        mux_drivers.insert(&assign_map.map(y), name.clone());
                    }
                    continue;
                }
                if !scope.member(&mod_name, name) {
                    continue;
                }
                if is_dff_type(cell.ty.as_str()) {
                    dff_list.push(name.clone());
                }
            }

            for name in &dff_list {
                if module.cells.contains_key(name)
                    && handle_dff(module, name, &assign_map, &mux_drivers)
                {
                    total += 1;
                }
            }
        }

        info!("replaced {total} DFF cells");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::call;
    use crate::rtlil::{escape_id, Cell};

    fn dff(module: &mut Module, name: &str, ty: &str, conns: &[(&str, SigSpec)]) {
        let mut cell = Cell::new(escape_id(name), IdString::from(ty));
        for (port, sig) in conns {
            cell.connections.insert(IdString::from(*port), sig.clone());
        }
        module.add_cell(cell);
    }

    #[test]
    fn test_feedback_dff_removed_without_connection() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let q = SigSpec::from_wire(module.new_wire(escape_id("q"), 1));
        let c = SigSpec::from_wire(module.new_wire(escape_id("clk"), 1));
        dff(&mut module, "ff", "$_DFF_P_", &[("\\D", q.clone()), ("\\Q", q.clone()), ("\\C", c)]);
        design.add_module(module);

        call(&mut design, "opt_rmdff").unwrap();
        let module = &design.modules[&escape_id("top")];
        assert!(module.cells.is_empty());
        assert!(module.connections.is_empty());
    }

    #[test]
    fn test_constant_d_becomes_connection() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let q = SigSpec::from_wire(module.new_wire(escape_id("q"), 1));
        let c = SigSpec::from_wire(module.new_wire(escape_id("clk"), 1));
        dff(
            &mut module,
            "ff",
            "$_DFF_P_",
            &[("\\D", SigSpec::from_int(1, 1)), ("\\Q", q.clone()), ("\\C", c)],
        );
        design.add_module(module);

        call(&mut design, "opt_rmdff").unwrap();
        let module = &design.modules[&escape_id("top")];
        assert!(module.cells.is_empty());
        assert_eq!(module.connections, vec![(q, SigSpec::from_int(1, 1))]);
    }

    #[test]
    fn test_feedback_with_reset_uses_reset_value() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let q = SigSpec::from_wire(module.new_wire(escape_id("q"), 1));
        let c = SigSpec::from_wire(module.new_wire(escape_id("clk"), 1));
        let r = SigSpec::from_wire(module.new_wire(escape_id("rst"), 1));
        dff(
            &mut module,
            "ff",
            "$_DFF_PP1_",
            &[("\\D", q.clone()), ("\\Q", q.clone()), ("\\C", c), ("\\R", r)],
        );
        design.add_module(module);

        call(&mut design, "opt_rmdff").unwrap();
        let module = &design.modules[&escape_id("top")];
        assert!(module.cells.is_empty());
        assert_eq!(module.connections, vec![(q, SigSpec::from_int(1, 1))]);
    }

    #[test]
    fn test_mux_feedback_dff() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let q = SigSpec::from_wire(module.new_wire(escape_id("q"), 1));
        let d = SigSpec::from_wire(module.new_wire(escape_id("d"), 1));
        let s = SigSpec::from_wire(module.new_wire(escape_id("s"), 1));
        let c = SigSpec::from_wire(module.new_wire(escape_id("clk"), 1));
        let mut mux = Cell::new(escape_id("m"), IdString::from("$mux"));
        mux.connections.insert(IdString::from("\\A"), q.clone());
        mux.connections.insert(IdString::from("\\B"), SigSpec::from_int(0, 1));
        mux.connections.insert(IdString::from("\\S"), s);
        mux.connections.insert(IdString::from("\\Y"), d.clone());
        module.add_cell(mux);
        dff(
            &mut module,
            "ff",
            "$dff",
            &[("\\D", d), ("\\Q", q.clone()), ("\\CLK", c)],
        );
        design.add_module(module);

        call(&mut design, "opt_rmdff").unwrap();
        let module = &design.modules[&escape_id("top")];
        assert!(!module.cells.contains_key(&escape_id("ff")));
        assert_eq!(module.connections, vec![(q, SigSpec::from_int(0, 1))]);
    }

    #[test]
    fn test_live_dff_kept() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let q = SigSpec::from_wire(module.new_wire(escape_id("q"), 1));
        let d = SigSpec::from_wire(module.new_wire(escape_id("d"), 1));
        let c = SigSpec::from_wire(module.new_wire(escape_id("clk"), 1));
        dff(&mut module, "ff", "$_DFF_P_", &[("\\D", d), ("\\Q", q), ("\\C", c)]);
        design.add_module(module);

        call(&mut design, "opt_rmdff").unwrap();
        assert_eq!(design.modules[&escape_id("top")].cells.len(), 1);
    }
}
