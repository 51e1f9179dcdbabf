//! Template-based cell rewriting: technology mapping and flattening
//!
//! Cells whose type matches a module of the map design are replaced by a
//! copy of that module's contents, with template wires and cells imported
//! under a cell-local prefix and template ports wired up to the cell's
//! connections. `flatten` is the same machinery with the design itself as
//! the map.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;

use log::{debug, info};

use crate::pass::{self, extra_args, Pass, Scope};
use crate::rtlil::{escape_id, Const, Design, IdString, Module, Selection, SigSpec, State};
use crate::Error;

fn apply_prefix_id(prefix: &IdString, id: &IdString) -> IdString {
    match id.as_str().strip_prefix('\\') {
        Some(rest) => IdString::from(format!("{}.{}", prefix, rest)),
        None => IdString::from(format!("$techmap{}.{}", prefix, id)),
    }
}

fn apply_prefix_sig(prefix: &IdString, sig: &mut SigSpec, module: &Module) {
    for chunk in &mut sig.chunks {
        if let Some(name) = &chunk.wire {
            let new_name = apply_prefix_id(prefix, name);
            assert!(module.wires.contains_key(&new_name), "missing imported wire {new_name}");
            chunk.wire = Some(new_name);
        }
    }
}

fn apply_port_map(sig: &mut SigSpec, port_map: &[(SigSpec, SigSpec)]) {
    for (inner, outer) in port_map {
        sig.replace_pattern(inner, outer);
    }
}

/// Instantiate one template in place of a cell
fn techmap_module_worker(
    module: &mut Module,
    mod_name: &IdString,
    cell_name: &IdString,
    tpl: &Module,
    new_members: &mut Selection,
    flatten_mode: bool,
) -> Result<(), Error> {
    info!("mapping `{}.{}' using `{}'", mod_name, cell_name, tpl.name);

    if !tpl.memories.is_empty() {
        return Err(Error::Unsupported("technology map yielded memories".into()));
    }
    if !tpl.processes.is_empty() {
        return Err(Error::Unsupported("technology map yielded processes".into()));
    }

    let cell = module.cells[cell_name].clone();
    let prefix = cell.name.clone();

    // Import the template wires under the cell prefix, with port flags
    // cleared, and collect the positional-port directory.
    let mut positional_ports: BTreeMap<IdString, IdString> = BTreeMap::new();
    for (name, wire) in &tpl.wires {
        if wire.port_id > 0 {
            positional_ports.insert(IdString::from(format!("${}", wire.port_id)), name.clone());
        }
        let mut w = wire.clone();
        w.name = apply_prefix_id(&prefix, name);
        w.port_id = 0;
        w.port_input = false;
        w.port_output = false;
        new_members.select_member(mod_name, &w.name);
        module.add_wire(w);
    }

    // Wire template ports to the cell connections. Instead of adding
    // buffer connections, record a rewrite from the imported port wire to
    // the outer signal, width-adjusted toward the binding side.
    let mut port_map: Vec<(SigSpec, SigSpec)> = Vec::new();
    for (portname, outer) in &cell.connections {
        let resolved = positional_ports.get(portname).unwrap_or(portname);
        let port_wire = tpl.wires.get(resolved).filter(|w| w.port_id > 0);
        let Some(w) = port_wire else {
            if portname.as_str().starts_with('$') {
                return Err(Error::Cmd(format!(
                    "can't map port `{}' of cell `{}' to template `{}'",
                    portname, cell_name, tpl.name
                )));
            }
            continue;
        };
        let inner = SigSpec::from_wire(&module.wires[&apply_prefix_id(&prefix, resolved)]);
        let (first, mut second) =
            if w.port_output { (outer.clone(), inner) } else { (inner, outer.clone()) };
        if second.width() > first.width() {
            let excess = second.width() - first.width();
            second.remove(first.width(), excess);
        }
        if second.width() < first.width() {
            second.append(&SigSpec::from_state(State::S0, first.width() - second.width()));
        }
        if w.port_output {
            port_map.push((second, first));
        } else {
            port_map.push((first, second));
        }
    }

    for (name, tcell) in &tpl.cells {
        let mut c = tcell.clone();
        if !flatten_mode {
            if let Some(rest) = c.ty.as_str().strip_prefix("\\$") {
                c.ty = IdString::from(format!("${}", rest));
            }
        }
        c.name = apply_prefix_id(&prefix, name);
        for sig in c.connections.values_mut() {
            apply_prefix_sig(&prefix, sig, module);
            apply_port_map(sig, &port_map);
        }
        new_members.select_member(mod_name, &c.name);
        module.add_cell(c);
    }

    for (lhs, rhs) in &tpl.connections {
        let mut lhs = lhs.clone();
        let mut rhs = rhs.clone();
        apply_prefix_sig(&prefix, &mut lhs, module);
        apply_prefix_sig(&prefix, &mut rhs, module);
        apply_port_map(&mut lhs, &port_map);
        apply_port_map(&mut rhs, &port_map);
        module.connections.push((lhs, rhs));
    }

    module.cells.remove(cell_name);
    Ok(())
}

type DeriveKey = (IdString, Vec<(IdString, Const)>);

/// Per-invocation state: which cells were already tried, which templates
/// were derived, opted, or vetoed by a fail marker
#[derive(Default)]
struct TechmapWorker {
    celltype_map: BTreeMap<IdString, BTreeSet<IdString>>,
    handled_cells: BTreeSet<(IdString, IdString)>,
    derive_cache: BTreeMap<DeriveKey, IdString>,
    fail_cache: BTreeMap<IdString, bool>,
    opt_cache: BTreeSet<IdString>,
}

impl TechmapWorker {
    /// Returns true if the template carries a fail-marker wire
    fn fail_check(&mut self, map: &Design, tpl_name: &IdString) -> bool {
        if let Some(&cached) = self.fail_cache.get(tpl_name) {
            return cached;
        }
        let failed = map.modules.get(tpl_name).is_some_and(|tpl| {
            tpl.wires.keys().any(|name| {
                name.as_str() == "\\TECHMAP_FAIL"
                    || (name.is_public() && name.as_str().ends_with(".TECHMAP_FAIL"))
            })
        });
        self.fail_cache.insert(tpl_name.clone(), failed);
        failed
    }

    /// One substitution round over one module; returns whether anything
    /// was replaced, plus the members created by the replacements
    fn process_module(
        &mut self,
        module: &mut Module,
        mod_name: &IdString,
        scope: &Scope,
        map: &mut Design,
        flatten_mode: bool,
        opt_mode: bool,
    ) -> Result<(bool, Selection), Error> {
        let mut did_something = false;
        let mut new_members = Selection::empty();

        let cell_names: Vec<IdString> = module.cells.keys().cloned().collect();
        for cell_name in cell_names {
            if !module.cells.contains_key(&cell_name)
                || !scope.member(mod_name, &cell_name)
                || self.handled_cells.contains(&(mod_name.clone(), cell_name.clone()))
            {
                continue;
            }
            let cell_ty = module.cells[&cell_name].ty.clone();
            let Some(tpl_names) = self.celltype_map.get(&cell_ty).cloned() else { continue };

            let mut mapped = false;
            for tpl_name in tpl_names {
                // Bind constant-driven non-port connections as extra
                // parameters; a non-constant one vetoes this template.
                let derived_name = {
                    let Some(tpl) = map.modules.get(&tpl_name) else { continue };
                    let cell = &module.cells[&cell_name];
                    let mut parameters = cell.parameters.clone();
                    let mut usable = true;
                    for (conn_name, conn_sig) in &cell.connections {
                        if conn_name.as_str().starts_with('$') {
                            continue;
                        }
                        if tpl.wires.get(conn_name).map(|w| w.port_id > 0).unwrap_or(false) {
                            continue;
                        }
                        if !conn_sig.is_fully_const() || parameters.contains_key(conn_name) {
                            usable = false;
                            break;
                        }
                        parameters.insert(conn_name.clone(), conn_sig.as_const());
                    }
                    if !usable {
                        continue;
                    }
                    let key: DeriveKey = (
                        tpl_name.clone(),
                        parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    );
                    match self.derive_cache.get(&key) {
                        Some(name) => name.clone(),
                        None => {
                            let name = if cell.parameters.is_empty() {
                                tpl_name.clone()
                            } else {
                                tpl.derive(&parameters)?
                            };
                            self.derive_cache.insert(key, name.clone());
                            name
                        }
                    }
                };

                if self.fail_check(map, &derived_name) {
                    debug!(
                        "not using module `{}' from the map as it contains a fail-marker wire",
                        derived_name
                    );
                    continue;
                }

                if opt_mode && !self.opt_cache.contains(&derived_name) {
                    pass::call(map, &format!("opt {}", derived_name.unescape()))?;
                    self.opt_cache.insert(derived_name.clone());
                }

                let Some(tpl) = map.modules.get(&derived_name) else { continue };
                techmap_module_worker(module, mod_name, &cell_name, tpl, &mut new_members, flatten_mode)?;
                did_something = true;
                mapped = true;
                break;
            }

            if !mapped {
                self.handled_cells.insert((mod_name.clone(), cell_name));
            }
        }

        Ok((did_something, new_members))
    }
}

/// Build the type-to-template directory of a map design
///
/// Modules with a `\celltype` attribute match that type; every other
/// module matches its own name. Map modules named `\$...` are first
/// renamed to their `$...` built-in spelling.
fn build_celltype_map(map: &mut Design) -> BTreeMap<IdString, BTreeSet<IdString>> {
    let escaped: Vec<IdString> = map
        .modules
        .keys()
        .filter(|name| name.as_str().starts_with("\\$"))
        .cloned()
        .collect();
    for old_name in escaped {
        let mut module = map.modules.remove(&old_name).unwrap();
        module.name = IdString::from(old_name.as_str()[1..].to_owned());
        map.modules.insert(module.name.clone(), module);
    }

    let mut celltype_map: BTreeMap<IdString, BTreeSet<IdString>> = BTreeMap::new();
    for (name, module) in &map.modules {
        let celltype = module
            .attributes
            .get(&IdString::from("\\celltype"))
            .and_then(|v| v.source.clone())
            .filter(|s| !s.is_empty());
        match celltype {
            Some(ty) => celltype_map.entry(escape_id(&ty)).or_default().insert(name.clone()),
            None => celltype_map.entry(name.clone()).or_default().insert(name.clone()),
        };
    }
    celltype_map
}

/// Run the substitution loop of `techmap` with an explicit map design
pub fn techmap_with_map(design: &mut Design, map: &mut Design, opt_mode: bool) -> Result<(), Error> {
    let mut worker = TechmapWorker { celltype_map: build_celltype_map(map), ..Default::default() };
    let scope = Scope::of(design);

    loop {
        let mut did_something = false;
        let mod_names: Vec<IdString> = design.modules.keys().cloned().collect();
        for mod_name in mod_names {
            if !scope.module(&mod_name) {
                continue;
            }
            let mut module = design.modules.remove(&mod_name).unwrap();
            let result = worker.process_module(&mut module, &mod_name, &scope, map, false, opt_mode);
            design.modules.insert(mod_name.clone(), module);
            let (mapped, new_members) = result?;
            if mapped && opt_mode {
                design.selection_stack.push(new_members);
                let folded = pass::call(design, "opt_const");
                design.selection_stack.pop();
                folded?;
            }
            did_something |= mapped;
        }
        if !did_something {
            break;
        }
    }
    info!("no more expansions possible");
    Ok(())
}

/// Run the substitution loop of `flatten`, mapping the design onto itself
pub fn flatten_design(design: &mut Design) -> Result<(), Error> {
    let mut celltype_map: BTreeMap<IdString, BTreeSet<IdString>> = BTreeMap::new();
    for name in design.modules.keys() {
        celltype_map.entry(name.clone()).or_default().insert(name.clone());
    }
    let mut worker = TechmapWorker { celltype_map, ..Default::default() };
    let scope = Scope::of(design);

    loop {
        let mut did_something = false;
        let mod_names: Vec<IdString> = design.modules.keys().cloned().collect();
        for mod_name in mod_names {
            if !scope.module(&mod_name) {
                continue;
            }
            let mut module = design.modules.remove(&mod_name).unwrap();
            let result = worker.process_module(&mut module, &mod_name, &scope, design, true, false);
            design.modules.insert(mod_name.clone(), module);
            did_something |= result?.0;
        }
        if !did_something {
            break;
        }
    }
    info!("no more expansions possible");
    Ok(())
}

/// Replace cells with implementations from a map file
pub struct TechmapPass;

impl Pass for TechmapPass {
    fn name(&self) -> &'static str {
        "techmap"
    }

    fn help(&self) -> &'static str {
        "techmap [-map filename] [-opt] [selection]: simple technology mapper"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        let mut filename = None;
        let mut opt_mode = false;
        let mut argidx = 1;
        while argidx < args.len() {
            match args[argidx].as_str() {
                "-map" if argidx + 1 < args.len() => {
                    filename = Some(args[argidx + 1].clone());
                    argidx += 2;
                }
                "-opt" => {
                    opt_mode = true;
                    argidx += 1;
                }
                _ => break,
            }
        }
        extra_args(args, argidx, design)?;

        let Some(filename) = filename else {
            return Err(Error::Cmd(
                "techmap needs a map library; pass one with -map <file>".into(),
            ));
        };
        let file = File::open(&filename)
            .map_err(|err| Error::Cmd(format!("can't open map file `{filename}': {err}")))?;
        let mut map = crate::io::blif::read_blif(file)?;
        techmap_with_map(design, &mut map, opt_mode)
    }
}

/// Replace cells by the contents of the module they instantiate
pub struct FlattenPass;

impl Pass for FlattenPass {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn help(&self) -> &'static str {
        "flatten [selection]: expand module instances in place"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        extra_args(args, 1, design)?;
        flatten_design(design)
    }
}

/// Run the cleanup passes in their usual order
pub struct OptPass;

impl Pass for OptPass {
    fn name(&self) -> &'static str {
        "opt"
    }

    fn help(&self) -> &'static str {
        "opt [selection]: run opt_const, opt_share and opt_rmdff"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        extra_args(args, 1, design)?;
        pass::call(design, "opt_const")?;
        pass::call(design, "opt_share")?;
        pass::call(design, "opt_rmdff")?;
        Ok(())
    }
}
