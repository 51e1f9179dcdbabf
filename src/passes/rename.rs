//! Renaming of design objects

use log::info;

use crate::pass::{extra_args, Pass, Scope};
use crate::rtlil::{escape_id, Design, IdString, Module, SigSpec};
use crate::Error;

/// Replace references to renamed wires in every signal of the module
fn rewrite_wire_names(module: &mut Module, renames: &std::collections::BTreeMap<IdString, IdString>) {
    if renames.is_empty() {
        return;
    }
    module.rewrite_sigspecs(|sig: &mut SigSpec| {
        for chunk in &mut sig.chunks {
            if let Some(name) = &chunk.wire {
                if let Some(new_name) = renames.get(name) {
                    chunk.wire = Some(new_name.clone());
                }
            }
        }
    });
}

fn rename_in_module(module: &mut Module, from: &str, to: &str) -> Result<(), Error> {
    let from = escape_id(from);
    let to = escape_id(to);

    if module.count_id(&to) > 0 {
        return Err(Error::Cmd(format!(
            "there is already an object `{}' in module `{}'",
            to, module.name
        )));
    }

    if let Some(mut wire) = module.wires.remove(&from) {
        info!("renaming wire {} to {} in module {}", from, to, module.name);
        wire.name = to.clone();
        module.wires.insert(to.clone(), wire);
        let renames = std::collections::BTreeMap::from([(from, to)]);
        rewrite_wire_names(module, &renames);
        return Ok(());
    }

    if let Some(mut cell) = module.cells.remove(&from) {
        info!("renaming cell {} to {} in module {}", from, to, module.name);
        cell.name = to.clone();
        module.cells.insert(to, cell);
        return Ok(());
    }

    Err(Error::Cmd(format!("object `{}' not found", from)))
}

fn enumerate_module(module: &mut Module, mod_name: &IdString, scope: &Scope) {
    let mut counter = 0;
    let mut next_name = |module: &Module| loop {
        let name = escape_id(&format!("_{}_", counter));
        counter += 1;
        if module.count_id(&name) == 0 {
            return name;
        }
    };

    let mut wire_renames = std::collections::BTreeMap::new();
    let wire_names: Vec<IdString> = module.wires.keys().cloned().collect();
    for name in wire_names {
        if !name.is_generated() || !scope.member(mod_name, &name) {
            continue;
        }
        let mut wire = module.wires.remove(&name).unwrap();
        let new_name = next_name(module);
        wire.name = new_name.clone();
        module.wires.insert(new_name.clone(), wire);
        wire_renames.insert(name, new_name);
    }
    rewrite_wire_names(module, &wire_renames);

    let cell_names: Vec<IdString> = module.cells.keys().cloned().collect();
    for name in cell_names {
        if !name.is_generated() || !scope.member(mod_name, &name) {
            continue;
        }
        let mut cell = module.cells.remove(&name).unwrap();
        cell.name = next_name(module);
        module.cells.insert(cell.name.clone(), cell);
    }
}

/// Rename one object, or enumerate all generated names in the selection
pub struct RenamePass;

impl Pass for RenamePass {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn help(&self) -> &'static str {
        "rename old_name new_name, or rename -enumerate [selection]"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        let mut flag_enumerate = false;
        let mut argidx = 1;
        while argidx < args.len() {
            match args[argidx].as_str() {
                "-enumerate" => {
                    flag_enumerate = true;
                    argidx += 1;
                }
                _ => break,
            }
        }

        if flag_enumerate {
            extra_args(args, argidx, design)?;
            let scope = Scope::of(design);
            let mod_names: Vec<IdString> = design.modules.keys().cloned().collect();
            for mod_name in mod_names {
                if !scope.module(&mod_name) {
                    continue;
                }
                let module = design.modules.get_mut(&mod_name).unwrap();
                enumerate_module(module, &mod_name, &scope);
            }
            return Ok(());
        }

        if argidx + 2 != args.len() {
            return Err(Error::Cmd("rename expects exactly two names".into()));
        }
        let from = &args[argidx];
        let to = &args[argidx + 1];

        if let Some(active) = design.selected_active_module.clone() {
            if let Some(module) = design.modules.get_mut(&active) {
                return rename_in_module(module, from, to);
            }
            return Ok(());
        }

        let target = design
            .modules
            .keys()
            .find(|name| name.as_str() == from || name.unescape() == from)
            .cloned();
        match target {
            Some(old_name) => {
                let to = escape_id(to);
                info!("renaming module {} to {}", old_name, to);
                let mut module = design.modules.remove(&old_name).unwrap();
                module.name = to.clone();
                design.modules.insert(to, module);
                Ok(())
            }
            None => Err(Error::Cmd(format!("object `{from}' not found"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::call;
    use crate::rtlil::{Cell, Design, Module};

    fn design_with_generated_names() -> Design {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let w = module.new_wire(IdString::from("$sig"), 1).clone();
        let mut cell = Cell::new(IdString::from("$g"), IdString::from("$_INV_"));
        cell.connections.insert(IdString::from("\\A"), SigSpec::from_wire(&w));
        module.add_cell(cell);
        design.add_module(module);
        design
    }

    #[test]
    fn test_enumerate_renames_and_rewrites() {
        let mut design = design_with_generated_names();
        call(&mut design, "rename -enumerate").unwrap();
        let module = &design.modules[&escape_id("top")];
        assert!(module.wires.contains_key(&escape_id("_0_")));
        assert!(module.cells.contains_key(&escape_id("_1_")));
        let cell = &module.cells[&escape_id("_1_")];
        let chunk = &cell.connections[&IdString::from("\\A")].chunks()[0];
        assert_eq!(chunk.wire, Some(escape_id("_0_")));
        module.check();
    }

    #[test]
    fn test_single_rename() {
        let mut design = design_with_generated_names();
        design.selected_active_module = Some(escape_id("top"));
        call(&mut design, "rename $sig better").unwrap();
        let module = &design.modules[&escape_id("top")];
        assert!(module.wires.contains_key(&escape_id("better")));
        assert!(matches!(
            call(&mut design, "rename missing x"),
            Err(Error::Cmd(_))
        ));
    }

    #[test]
    fn test_module_rename() {
        let mut design = design_with_generated_names();
        call(&mut design, "rename top renamed").unwrap();
        assert!(design.modules.contains_key(&escape_id("renamed")));
    }

    #[test]
    fn test_rename_collision_rejected() {
        let mut design = design_with_generated_names();
        design.selected_active_module = Some(escape_id("top"));
        design
            .modules
            .get_mut(&escape_id("top"))
            .unwrap()
            .new_wire(escape_id("taken"), 1);
        assert!(matches!(
            call(&mut design, "rename $sig taken"),
            Err(Error::Cmd(_))
        ));
    }
}
