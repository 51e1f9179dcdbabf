use std::collections::{BTreeMap, BTreeSet};

use crate::rtlil::id::IdString;
use crate::rtlil::process::Process;
use crate::rtlil::sigspec::SigSpec;
use crate::rtlil::value::Const;
use crate::Error;

/// A pair of connected signals, right-hand side driving the left
pub type SigSig = (SigSpec, SigSpec);

/// A named bit-vector net within a module
#[derive(Clone, Debug)]
pub struct Wire {
    /// Name of the wire; the key in the module's wire map
    pub name: IdString,
    /// Width in bits, at least 1
    pub width: usize,
    /// Index of the low bit, used for reporting only
    pub start_offset: i32,
    /// 1-based port index; 0 when the wire is not a port
    pub port_id: usize,
    /// Set when the wire is a module input
    pub port_input: bool,
    /// Set when the wire is a module output
    pub port_output: bool,
    /// Set when the width is to be determined by a later pass
    pub auto_width: bool,
    /// Free-form attributes
    pub attributes: BTreeMap<IdString, Const>,
}

impl Wire {
    /// Create a plain wire with the given name and width
    pub fn new(name: IdString, width: usize) -> Wire {
        Wire {
            name,
            width,
            start_offset: 0,
            port_id: 0,
            port_input: false,
            port_output: false,
            auto_width: false,
            attributes: BTreeMap::new(),
        }
    }
}

/// An unlowered memory, separate from wires and cells
#[derive(Clone, Debug)]
pub struct Memory {
    /// Name of the memory; the key in the module's memory map
    pub name: IdString,
    /// Word width in bits
    pub width: usize,
    /// Number of words
    pub size: usize,
    /// Free-form attributes
    pub attributes: BTreeMap<IdString, Const>,
}

/// A named instance of a cell type
///
/// The type decides which ports exist and which of them are outputs; types
/// starting with `$` are built-ins, types starting with `\` reference
/// another module of the design or a library cell.
#[derive(Clone, Debug)]
pub struct Cell {
    /// Name of the cell; the key in the module's cell map
    pub name: IdString,
    /// Cell type
    pub ty: IdString,
    /// Type parameters
    pub parameters: BTreeMap<IdString, Const>,
    /// Port connections
    pub connections: BTreeMap<IdString, SigSpec>,
    /// Free-form attributes
    pub attributes: BTreeMap<IdString, Const>,
}

impl Cell {
    /// Create a cell with no parameters or connections
    pub fn new(name: IdString, ty: IdString) -> Cell {
        Cell {
            name,
            ty,
            parameters: BTreeMap::new(),
            connections: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }
}

/// A module: the unit of hierarchy, owning its wires, memories, cells,
/// processes and connections
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Name of the module; the key in the design's module map
    pub name: IdString,
    /// Wires by name
    pub wires: BTreeMap<IdString, Wire>,
    /// Memories by name
    pub memories: BTreeMap<IdString, Memory>,
    /// Cells by name
    pub cells: BTreeMap<IdString, Cell>,
    /// Behavioral processes by name
    pub processes: BTreeMap<IdString, Process>,
    /// Connections, each right side driving the left side
    pub connections: Vec<SigSig>,
    /// Free-form attributes
    pub attributes: BTreeMap<IdString, Const>,
}

impl Module {
    /// Create an empty module
    pub fn new(name: IdString) -> Module {
        Module { name, ..Module::default() }
    }

    /// Number of occurrences of an id across the four child maps
    pub fn count_id(&self, id: &IdString) -> usize {
        self.wires.contains_key(id) as usize
            + self.memories.contains_key(id) as usize
            + self.cells.contains_key(id) as usize
            + self.processes.contains_key(id) as usize
    }

    /// Insert a wire; the name must be unused within the module
    pub fn add_wire(&mut self, wire: Wire) -> &mut Wire {
        assert!(!wire.name.is_empty());
        assert_eq!(self.count_id(&wire.name), 0, "duplicate id {}", wire.name);
        let name = wire.name.clone();
        self.wires.insert(name.clone(), wire);
        self.wires.get_mut(&name).unwrap()
    }

    /// Create and insert a plain wire
    pub fn new_wire(&mut self, name: IdString, width: usize) -> &mut Wire {
        self.add_wire(Wire::new(name, width))
    }

    /// Insert a cell; the name must be unused within the module
    pub fn add_cell(&mut self, cell: Cell) -> &mut Cell {
        assert!(!cell.name.is_empty());
        assert_eq!(self.count_id(&cell.name), 0, "duplicate id {}", cell.name);
        let name = cell.name.clone();
        self.cells.insert(name.clone(), cell);
        self.cells.get_mut(&name).unwrap()
    }

    /// Look up the boolean value of a module attribute
    pub fn get_bool_attribute(&self, id: &IdString) -> bool {
        self.attributes.get(id).map(|v| v.as_bool()).unwrap_or(false)
    }

    /// Apply a rewrite function to every signal held by the module
    ///
    /// Visits cell connections, module connections and the full process
    /// trees. This is the primitive behind renames and instantiation.
    pub fn rewrite_sigspecs<F: FnMut(&mut SigSpec)>(&mut self, mut f: F) {
        for cell in self.cells.values_mut() {
            for sig in cell.connections.values_mut() {
                f(sig);
            }
        }
        for (lhs, rhs) in &mut self.connections {
            f(lhs);
            f(rhs);
        }
        for process in self.processes.values_mut() {
            process.rewrite_sigspecs(&mut f);
        }
    }

    /// Specialize a parametric module
    ///
    /// Non-parametric modules reject any parameter set; parametric module
    /// support is provided by frontends that override this behavior.
    pub fn derive(&self, parameters: &BTreeMap<IdString, Const>) -> Result<IdString, Error> {
        if parameters.is_empty() {
            Ok(self.name.clone())
        } else {
            Err(Error::Unsupported(format!(
                "module `{}' is used with parameters but is not parametric",
                self.name
            )))
        }
    }

    /// Re-assign consecutive port ids
    ///
    /// Wires carrying a port flag are sorted by `(port_id, name)` and
    /// numbered from 1; all other wires get `port_id` 0.
    pub fn fixup_ports(&mut self) {
        let mut all_ports: Vec<IdString> = Vec::new();
        for wire in self.wires.values_mut() {
            if wire.port_input || wire.port_output {
                all_ports.push(wire.name.clone());
            } else {
                wire.port_id = 0;
            }
        }
        all_ports.sort_by_key(|name| {
            let wire = &self.wires[name];
            (wire.port_id == 0, wire.port_id, wire.name.clone())
        });
        for (i, name) in all_ports.iter().enumerate() {
            self.wires.get_mut(name).unwrap().port_id = i + 1;
        }
    }

    /// Canonicalize every signal held by the module
    pub fn optimize(&mut self) {
        self.rewrite_sigspecs(|sig| sig.optimize());
    }

    /// Verify the structural invariants of the module
    ///
    /// Checks run only in debug builds: key/name agreement, id prefixes,
    /// wire bounds of every referenced chunk, and width-matched
    /// connections.
    pub fn check(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        let check_attrs = |attrs: &BTreeMap<IdString, Const>| {
            for key in attrs.keys() {
                assert!(key.is_valid());
            }
        };
        for (key, wire) in &self.wires {
            assert_eq!(*key, wire.name);
            assert!(key.is_valid());
            assert!(wire.width >= 1);
            assert!(!(wire.port_input || wire.port_output) || wire.port_id > 0);
            check_attrs(&wire.attributes);
        }
        for (key, memory) in &self.memories {
            assert_eq!(*key, memory.name);
            assert!(key.is_valid());
            check_attrs(&memory.attributes);
        }
        let check_sig = |sig: &SigSpec| {
            sig.check();
            for chunk in sig.chunks() {
                if let Some(name) = &chunk.wire {
                    let wire = self.wires.get(name).unwrap_or_else(|| {
                        panic!("chunk references unknown wire {} in module {}", name, self.name)
                    });
                    assert!(chunk.offset + chunk.width <= wire.width);
                }
            }
        };
        for (key, cell) in &self.cells {
            assert_eq!(*key, cell.name);
            assert!(key.is_valid());
            assert!(cell.ty.is_valid());
            for (port, sig) in &cell.connections {
                assert!(port.is_valid());
                check_sig(sig);
            }
            check_attrs(&cell.attributes);
            for param in cell.parameters.keys() {
                assert!(param.is_valid());
            }
        }
        for (key, process) in &self.processes {
            assert_eq!(*key, process.name);
            assert!(key.is_valid());
        }
        for (lhs, rhs) in &self.connections {
            assert_eq!(lhs.width(), rhs.width());
            check_sig(lhs);
            check_sig(rhs);
        }
        check_attrs(&self.attributes);
    }
}

/// A scope restriction for passes
///
/// Either the full design, or an explicit set of whole modules plus
/// per-module member sets.
#[derive(Clone, Debug)]
pub struct Selection {
    /// Set when everything is selected
    pub full_selection: bool,
    /// Modules selected as a whole
    pub selected_modules: BTreeSet<IdString>,
    /// Individually selected members, per module
    pub selected_members: BTreeMap<IdString, BTreeSet<IdString>>,
}

impl Selection {
    /// A selection covering the whole design
    pub fn full() -> Selection {
        Selection {
            full_selection: true,
            selected_modules: BTreeSet::new(),
            selected_members: BTreeMap::new(),
        }
    }

    /// An empty selection
    pub fn empty() -> Selection {
        Selection {
            full_selection: false,
            selected_modules: BTreeSet::new(),
            selected_members: BTreeMap::new(),
        }
    }

    /// Returns true if the module is at least partially selected
    pub fn selected_module(&self, mod_name: &IdString) -> bool {
        self.full_selection
            || self.selected_modules.contains(mod_name)
            || self.selected_members.contains_key(mod_name)
    }

    /// Returns true if the module is selected as a whole
    pub fn selected_whole_module(&self, mod_name: &IdString) -> bool {
        self.full_selection || self.selected_modules.contains(mod_name)
    }

    /// Returns true if a member of a module is selected
    pub fn selected_member(&self, mod_name: &IdString, memb_name: &IdString) -> bool {
        self.full_selection
            || self.selected_modules.contains(mod_name)
            || self.selected_members.get(mod_name).is_some_and(|s| s.contains(memb_name))
    }

    /// Add a whole module to the selection
    pub fn select_module(&mut self, mod_name: &IdString) {
        if !self.full_selection {
            self.selected_modules.insert(mod_name.clone());
        }
    }

    /// Add a single member of a module to the selection
    pub fn select_member(&mut self, mod_name: &IdString, memb_name: &IdString) {
        if !self.full_selection && !self.selected_modules.contains(mod_name) {
            self.selected_members.entry(mod_name.clone()).or_default().insert(memb_name.clone());
        }
    }

    /// Prune dangling ids and collapse saturated selections
    ///
    /// A module whose every member is individually named becomes a whole
    /// selected module; a selection naming every module becomes full.
    pub fn optimize(&mut self, design: &Design) {
        if self.full_selection {
            self.selected_modules.clear();
            self.selected_members.clear();
            return;
        }

        self.selected_modules.retain(|name| design.modules.contains_key(name));
        for name in &self.selected_modules {
            self.selected_members.remove(name);
        }
        self.selected_members.retain(|name, _| design.modules.contains_key(name));

        for (mod_name, members) in &mut self.selected_members {
            let module = &design.modules[mod_name];
            members.retain(|memb| module.count_id(memb) > 0);
        }

        let mut promote = Vec::new();
        self.selected_members.retain(|mod_name, members| {
            if members.is_empty() {
                return false;
            }
            let module = &design.modules[mod_name];
            let total = module.wires.len() + module.memories.len() + module.cells.len() + module.processes.len();
            if members.len() == total {
                promote.push(mod_name.clone());
                false
            } else {
                true
            }
        });
        self.selected_modules.extend(promote);

        if self.selected_modules.len() == design.modules.len() {
            self.full_selection = true;
            self.selected_modules.clear();
            self.selected_members.clear();
        }
    }
}

/// The top-level container: all modules plus the selection state used to
/// scope passes
#[derive(Clone, Debug)]
pub struct Design {
    /// Modules by name
    pub modules: BTreeMap<IdString, Module>,
    /// Stack of selections; passes read the top entry
    pub selection_stack: Vec<Selection>,
    /// When set, restricts all selection queries to this module
    pub selected_active_module: Option<IdString>,
}

impl Design {
    /// Create an empty design with a full selection on the stack
    pub fn new() -> Design {
        Design {
            modules: BTreeMap::new(),
            selection_stack: vec![Selection::full()],
            selected_active_module: None,
        }
    }

    /// Insert a module; the name must be unused within the design
    pub fn add_module(&mut self, module: Module) -> &mut Module {
        assert!(module.name.is_valid());
        assert!(!self.modules.contains_key(&module.name), "duplicate module {}", module.name);
        let name = module.name.clone();
        self.modules.insert(name.clone(), module);
        self.modules.get_mut(&name).unwrap()
    }

    fn active_allows(&self, mod_name: &IdString) -> bool {
        match &self.selected_active_module {
            Some(active) => active == mod_name,
            None => true,
        }
    }

    /// Returns true if the module is at least partially selected
    pub fn selected_module(&self, mod_name: &IdString) -> bool {
        if !self.active_allows(mod_name) {
            return false;
        }
        match self.selection_stack.last() {
            Some(sel) => sel.selected_module(mod_name),
            None => true,
        }
    }

    /// Returns true if the module is selected as a whole
    pub fn selected_whole_module(&self, mod_name: &IdString) -> bool {
        if !self.active_allows(mod_name) {
            return false;
        }
        match self.selection_stack.last() {
            Some(sel) => sel.selected_whole_module(mod_name),
            None => true,
        }
    }

    /// Returns true if a member of a module is selected
    pub fn selected_member(&self, mod_name: &IdString, memb_name: &IdString) -> bool {
        if !self.active_allows(mod_name) {
            return false;
        }
        match self.selection_stack.last() {
            Some(sel) => sel.selected_member(mod_name, memb_name),
            None => true,
        }
    }

    /// Canonicalize all signals and prune all selections
    pub fn optimize(&mut self) {
        for module in self.modules.values_mut() {
            module.optimize();
        }
        let mut stack = std::mem::take(&mut self.selection_stack);
        for selection in &mut stack {
            selection.optimize(self);
        }
        self.selection_stack = stack;
    }

    /// Verify the structural invariants of every module
    pub fn check(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        for (key, module) in &self.modules {
            assert_eq!(*key, module.name);
            assert!(key.is_valid());
            module.check();
        }
    }
}

impl Default for Design {
    fn default() -> Design {
        Design::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtlil::id::escape_id;
    use crate::rtlil::sigspec::SigSpec;

    #[test]
    fn test_count_id_and_add() {
        let mut module = Module::new(escape_id("top"));
        module.new_wire(escape_id("a"), 1);
        let mut cell = Cell::new(escape_id("c"), IdString::from("$_AND_"));
        cell.connections.insert(IdString::from("\\A"), SigSpec::from_int(0, 1));
        module.add_cell(cell);
        assert_eq!(module.count_id(&escape_id("a")), 1);
        assert_eq!(module.count_id(&escape_id("c")), 1);
        assert_eq!(module.count_id(&escape_id("nope")), 0);
    }

    #[test]
    #[should_panic]
    fn test_duplicate_id_rejected() {
        let mut module = Module::new(escape_id("top"));
        module.new_wire(escape_id("a"), 1);
        module.add_cell(Cell::new(escape_id("a"), IdString::from("$_AND_")));
    }

    #[test]
    fn test_fixup_ports_stable() {
        let mut module = Module::new(escape_id("top"));
        module.new_wire(escape_id("z"), 1).port_input = true;
        module.new_wire(escape_id("a"), 1).port_output = true;
        let internal = module.new_wire(escape_id("n"), 1);
        internal.port_id = 7;
        module.fixup_ports();
        let first: Vec<(IdString, usize)> =
            module.wires.values().map(|w| (w.name.clone(), w.port_id)).collect();
        module.fixup_ports();
        let second: Vec<(IdString, usize)> =
            module.wires.values().map(|w| (w.name.clone(), w.port_id)).collect();
        assert_eq!(first, second);
        assert_eq!(module.wires[&escape_id("a")].port_id, 1);
        assert_eq!(module.wires[&escape_id("z")].port_id, 2);
        assert_eq!(module.wires[&escape_id("n")].port_id, 0);
    }

    #[test]
    fn test_clone_rebinds_into_new_module() {
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 2).clone();
        let y = module.new_wire(escape_id("y"), 2).clone();
        module.connections.push((SigSpec::from_wire(&y), SigSpec::from_wire(&a)));
        let clone = module.clone();
        for (lhs, rhs) in &clone.connections {
            for chunk in lhs.chunks().iter().chain(rhs.chunks()) {
                let name = chunk.wire.as_ref().unwrap();
                assert!(clone.wires.contains_key(name));
            }
        }
        clone.check();
    }

    #[test]
    fn test_selection_optimize_collapses() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("m"));
        module.new_wire(escape_id("a"), 1);
        design.add_module(module);

        let mut sel = Selection::empty();
        sel.select_member(&escape_id("m"), &escape_id("a"));
        sel.select_member(&escape_id("m"), &escape_id("gone"));
        sel.optimize(&design);
        // All (one) members named: collapses to whole module, then to full.
        assert!(sel.full_selection);
    }

    #[test]
    fn test_selection_scoping() {
        let mut design = Design::new();
        design.add_module(Module::new(escape_id("m")));
        design.add_module(Module::new(escape_id("n")));
        let mut sel = Selection::empty();
        sel.select_module(&escape_id("m"));
        design.selection_stack.push(sel);
        assert!(design.selected_module(&escape_id("m")));
        assert!(!design.selected_module(&escape_id("n")));
        design.selected_active_module = Some(escape_id("n"));
        assert!(!design.selected_module(&escape_id("m")));
        design.selection_stack.pop();
        design.selected_active_module = None;
        assert!(design.selected_module(&escape_id("n")));
    }
}
