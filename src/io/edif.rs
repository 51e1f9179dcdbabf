//! EDIF 2 0 0 netlist writer
//!
//! Generates the flavor understood by the Xilinx place and route tools:
//! an `external LIB` library carrying `GND`, `VCC` and one generic cell
//! per undefined cell type, a `DESIGN` library with one cell per module,
//! and a top-level design reference.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use itertools::Itertools;

use crate::celltypes::CellTypes;
use crate::pass::Pass;
use crate::rtlil::{escape_id, Design, IdString, Module, SigSpec, State};
use crate::sigtools::SigMap;
use crate::Error;

/// Rewrites identifiers into the restricted EDIF name space
///
/// Valid names match `[A-Za-z][A-Za-z0-9_]*` with `_` forbidden first and
/// last; `GND` and `VCC` are reserved. Anything else is renamed to a
/// fresh `id<NNNNN>` with a `(rename ...)` form emitted once; the mapping
/// is stable within one invocation.
#[derive(Default)]
struct EdifNames {
    counter: usize,
    generated: BTreeSet<String>,
    used: BTreeSet<String>,
    map: BTreeMap<String, String>,
}

impl EdifNames {
    fn new() -> EdifNames {
        EdifNames { counter: 1, ..EdifNames::default() }
    }

    fn valid(id: &str) -> bool {
        if id.is_empty() || id == "GND" || id == "VCC" {
            return false;
        }
        let bytes = id.as_bytes();
        if !bytes[0].is_ascii_alphabetic() {
            return false;
        }
        if bytes[bytes.len() - 1] == b'_' {
            return false;
        }
        bytes.iter().all(|&b| b.is_ascii_alphanumeric() || b == b'_')
    }

    fn name(&mut self, id: &str) -> String {
        if let Some(mapped) = self.map.get(id) {
            return mapped.clone();
        }
        if !self.generated.contains(id) && EdifNames::valid(id) {
            self.used.insert(id.to_owned());
            return id.to_owned();
        }
        let gen_name = loop {
            let candidate = format!("id{:05}", self.counter);
            self.counter += 1;
            if !self.generated.contains(&candidate) && !self.used.contains(&candidate) {
                break candidate;
            }
        };
        self.generated.insert(gen_name.clone());
        self.map.insert(id.to_owned(), gen_name.clone());
        format!("(rename {} \"{}\")", gen_name, id)
    }

    fn id(&mut self, id: &IdString) -> String {
        self.name(id.unescape())
    }
}

/// Stable net name for a canonical single-bit signal
fn net_name(module: &Module, sig: &SigSpec) -> String {
    let chunk = &sig.chunks()[0];
    match &chunk.wire {
        Some(name) => {
            let mut str = name.unescape().to_owned();
            if module.wires[name].width != 1 {
                str += &format!("[{}]", chunk.offset);
            }
            str
        }
        None => chunk.data.as_string(),
    }
}

/// Write a design as an EDIF netlist
pub fn write_edif<W: Write>(f: &mut W, design: &Design, top: Option<&str>) -> Result<(), Error> {
    let placeholder = IdString::from("\\placeholder");
    let ct = CellTypes::with_design(design);
    let mut names = EdifNames::new();

    let mut top_module_name = top.map(escape_id);
    let mut lib_cell_ports: BTreeMap<IdString, BTreeSet<IdString>> = BTreeMap::new();

    for module in design.modules.values() {
        if module.get_bool_attribute(&placeholder) {
            continue;
        }
        if top_module_name.is_none() {
            top_module_name = Some(module.name.clone());
        }
        if !module.processes.is_empty() {
            return Err(Error::Unsupported(format!(
                "found unmapped processes in module {}: not supported by the EDIF backend",
                module.name
            )));
        }
        if !module.memories.is_empty() {
            return Err(Error::Unsupported(format!(
                "found unmapped memories in module {}: not supported by the EDIF backend",
                module.name
            )));
        }
        for cell in module.cells.values() {
            let defined = design
                .modules
                .get(&cell.ty)
                .map(|m| !m.get_bool_attribute(&placeholder))
                .unwrap_or(false);
            if !defined {
                let ports = lib_cell_ports.entry(cell.ty.clone()).or_default();
                for (port, sig) in &cell.connections {
                    if sig.width() > 1 {
                        return Err(Error::Unsupported(format!(
                            "found multi-bit port {} on library cell {}.{} ({})",
                            port, module.name, cell.name, cell.ty
                        )));
                    }
                    ports.insert(port.clone());
                }
            }
        }
    }

    let Some(top_module_name) = top_module_name else {
        return Err(Error::Cmd("no module found in design".into()));
    };

    writeln!(f, "(edif {}", names.id(&top_module_name))?;
    writeln!(f, "  (edifVersion 2 0 0)")?;
    writeln!(f, "  (edifLevel 0)")?;
    writeln!(f, "  (keywordMap (keywordLevel 0))")?;

    writeln!(f, "  (external LIB")?;
    writeln!(f, "    (edifLevel 0)")?;
    writeln!(f, "    (technology (numberDefinition))")?;
    for (name, port) in [("GND", "G"), ("VCC", "P")] {
        writeln!(f, "    (cell {}", name)?;
        writeln!(f, "      (cellType GENERIC)")?;
        writeln!(f, "      (view VIEW_NETLIST")?;
        writeln!(f, "        (viewType NETLIST)")?;
        writeln!(f, "        (interface (port {} (direction OUTPUT)))", port)?;
        writeln!(f, "      )")?;
        writeln!(f, "    )")?;
    }
    for (cell_ty, ports) in &lib_cell_ports {
        writeln!(f, "    (cell {}", names.id(cell_ty))?;
        writeln!(f, "      (cellType GENERIC)")?;
        writeln!(f, "      (view VIEW_NETLIST")?;
        writeln!(f, "        (viewType NETLIST)")?;
        writeln!(f, "        (interface")?;
        for port in ports {
            let mut dir = "INOUT";
            if ct.cell_known(cell_ty) {
                if !ct.cell_output(cell_ty, port) {
                    dir = "INPUT";
                } else if !ct.cell_input(cell_ty, port) {
                    dir = "OUTPUT";
                }
            }
            writeln!(f, "          (port {} (direction {}))", names.id(port), dir)?;
        }
        writeln!(f, "        )")?;
        writeln!(f, "      )")?;
        writeln!(f, "    )")?;
    }
    writeln!(f, "  )")?;

    writeln!(f, "  (library DESIGN")?;
    writeln!(f, "    (edifLevel 0)")?;
    writeln!(f, "    (technology (numberDefinition))")?;

    for module in design.modules.values() {
        if module.get_bool_attribute(&placeholder) {
            continue;
        }
        let sigmap = SigMap::from_module(module);
        let mut net_join_db: BTreeMap<SigSpec, BTreeSet<String>> = BTreeMap::new();

        writeln!(f, "    (cell {}", names.id(&module.name))?;
        writeln!(f, "      (cellType GENERIC)")?;
        writeln!(f, "      (view VIEW_NETLIST")?;
        writeln!(f, "        (viewType NETLIST)")?;
        writeln!(f, "        (interface")?;
        for wire in module.wires.values() {
            if wire.port_id == 0 {
                continue;
            }
            let dir = if !wire.port_output {
                "INPUT"
            } else if !wire.port_input {
                "OUTPUT"
            } else {
                "INOUT"
            };
            if wire.width == 1 {
                writeln!(f, "          (port {} (direction {}))", names.id(&wire.name), dir)?;
                let sig = sigmap.map(&SigSpec::from_wire(wire));
                net_join_db
                    .entry(sig)
                    .or_default()
                    .insert(format!("(portRef {})", names.id(&wire.name)));
            } else {
                writeln!(
                    f,
                    "          (port (array {} {}) (direction {}))",
                    names.id(&wire.name),
                    wire.width,
                    dir
                )?;
                for i in 0..wire.width {
                    let sig = sigmap.map(&SigSpec::from_wire_slice(wire, 1, i));
                    net_join_db.entry(sig).or_default().insert(format!(
                        "(portRef (member {} {}))",
                        names.id(&wire.name),
                        i
                    ));
                }
            }
        }
        writeln!(f, "        )")?;
        writeln!(f, "        (contents")?;
        writeln!(f, "          (instance GND (viewRef VIEW_NETLIST (cellRef GND (libraryRef LIB))))")?;
        writeln!(f, "          (instance VCC (viewRef VIEW_NETLIST (cellRef VCC (libraryRef LIB))))")?;

        for cell in module.cells.values() {
            writeln!(f, "          (instance {}", names.id(&cell.name))?;
            let lib_ref = if lib_cell_ports.contains_key(&cell.ty) { " (libraryRef LIB)" } else { "" };
            write!(f, "            (viewRef VIEW_NETLIST (cellRef {}{}))", names.id(&cell.ty), lib_ref)?;
            for (param, value) in &cell.parameters {
                if let Some(text) = &value.source {
                    write!(f, "\n            (property {} (string \"{}\"))", names.id(param), text)?;
                } else if value.width() <= 32 && value.is_fully_def() {
                    write!(f, "\n            (property {} (integer {}))", names.id(param), value.as_int())?;
                } else {
                    let hex: String = value
                        .bits
                        .chunks(4)
                        .map(|nibble| {
                            let mut digit: u32 = 0;
                            for (i, &bit) in nibble.iter().enumerate() {
                                if bit == State::S1 {
                                    digit |= 1 << i;
                                }
                            }
                            char::from_digit(digit, 16).unwrap()
                        })
                        .collect::<String>()
                        .chars()
                        .rev()
                        .collect();
                    write!(f, "\n            (property {} (string \"{}\"))", names.id(param), hex)?;
                }
            }
            writeln!(f, ")")?;

            for (port, sig) in &cell.connections {
                let sig = sigmap.map(sig);
                for i in 0..sig.width() {
                    let bit = sig.extract(i, 1);
                    let portname = if sig.width() > 1 {
                        format!("{}[{}]", port.unescape(), i)
                    } else {
                        port.unescape().to_owned()
                    };
                    net_join_db.entry(bit).or_default().insert(format!(
                        "(portRef {} (instanceRef {}))",
                        names.name(&portname),
                        names.id(&cell.name)
                    ));
                }
            }
        }

        for (sig, refs) in &net_join_db {
            let chunk = &sig.chunks()[0];
            let tie = match &chunk.wire {
                None => match chunk.data.bits[0] {
                    State::S0 => Some("            (portRef G (instanceRef GND))"),
                    State::S1 => Some("            (portRef P (instanceRef VCC))"),
                    // Nets that resolve to x or z are not emitted.
                    _ => continue,
                },
                Some(_) => None,
            };
            writeln!(f, "          (net {} (joined", names.name(&net_name(module, sig)))?;
            for join_ref in refs.iter().sorted() {
                writeln!(f, "            {}", join_ref)?;
            }
            if let Some(tie) = tie {
                writeln!(f, "{}", tie)?;
            }
            writeln!(f, "          ))")?;
        }
        writeln!(f, "        )")?;
        writeln!(f, "      )")?;
        writeln!(f, "    )")?;
    }
    writeln!(f, "  )")?;

    writeln!(f, "  (design {}", names.id(&top_module_name))?;
    writeln!(f, "    (cellRef {} (libraryRef DESIGN))", names.id(&top_module_name))?;
    writeln!(f, "  )")?;
    writeln!(f, ")")?;
    Ok(())
}

/// The `write_edif` backend command
pub struct WriteEdifPass;

impl Pass for WriteEdifPass {
    fn name(&self) -> &'static str {
        "write_edif"
    }

    fn help(&self) -> &'static str {
        "write_edif [-top module] [filename]: write the design to an EDIF file"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        let mut top = None;
        let mut filename = None;
        let mut argidx = 1;
        while argidx < args.len() {
            match args[argidx].as_str() {
                "-top" if argidx + 1 < args.len() => {
                    top = Some(args[argidx + 1].clone());
                    argidx += 2;
                }
                arg if !arg.starts_with('-') && filename.is_none() => {
                    filename = Some(arg.to_owned());
                    argidx += 1;
                }
                arg => return Err(Error::Cmd(format!("unknown option `{arg}'"))),
            }
        }

        match filename {
            Some(path) => {
                let mut f = std::fs::File::create(&path).map_err(Error::Io)?;
                write_edif(&mut f, design, top.as_deref())
            }
            None => {
                let mut out = std::io::stdout().lock();
                write_edif(&mut out, design, top.as_deref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtlil::{Cell, Wire};

    #[test]
    fn test_name_mangling() {
        let mut names = EdifNames::new();
        assert_eq!(names.name("good_name"), "good_name");
        // The same invalid identifier maps to the same generated name.
        let first = names.name("3bad");
        assert!(first.starts_with("(rename id00001"));
        assert_eq!(names.name("3bad"), "id00001");
        assert!(names.name("GND").starts_with("(rename id"));
        assert!(names.name("_lead").starts_with("(rename id"));
        assert!(names.name("trail_").starts_with("(rename id"));
    }

    #[test]
    fn test_write_simple_netlist() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let mut a = Wire::new(escape_id("a"), 1);
        a.port_input = true;
        a.port_id = 1;
        let a = module.add_wire(a).clone();
        let mut y = Wire::new(escape_id("y"), 1);
        y.port_output = true;
        y.port_id = 2;
        let y = module.add_wire(y).clone();
        let mut cell = Cell::new(escape_id("g"), IdString::from("$_INV_"));
        cell.connections.insert(IdString::from("\\A"), SigSpec::from_wire(&a));
        cell.connections.insert(IdString::from("\\Y"), SigSpec::from_wire(&y));
        module.add_cell(cell);
        design.add_module(module);

        let mut out = Vec::new();
        write_edif(&mut out, &design, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(edifVersion 2 0 0)"));
        assert!(text.contains("(external LIB"));
        assert!(text.contains("(cell GND"));
        assert!(text.contains("(cell VCC"));
        // $_INV_ is undefined in the design, so it lands in LIB with
        // proper directions, under a generated name.
        assert!(text.contains("(port A (direction INPUT))"));
        assert!(text.contains("(port Y (direction OUTPUT))"));
        assert!(text.contains("(library DESIGN"));
        assert!(text.contains("(design top"));
        assert!(text.contains("(net a (joined"));
        assert!(text.contains("(net y (joined"));
    }

    #[test]
    fn test_constant_nets_tie_to_rails() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let y = SigSpec::from_wire(module.new_wire(escape_id("y"), 1));
        let mut cell = Cell::new(escape_id("g"), IdString::from("$_INV_"));
        cell.connections.insert(IdString::from("\\A"), SigSpec::from_state(State::S0, 1));
        cell.connections.insert(IdString::from("\\Y"), y);
        module.add_cell(cell);
        design.add_module(module);

        let mut out = Vec::new();
        write_edif(&mut out, &design, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(portRef G (instanceRef GND))"));
    }

    #[test]
    fn test_multibit_library_port_rejected() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let d = SigSpec::from_wire(module.new_wire(escape_id("d"), 2));
        let mut cell = Cell::new(escape_id("g"), escape_id("ext"));
        cell.connections.insert(escape_id("D"), d);
        module.add_cell(cell);
        design.add_module(module);

        let mut out = Vec::new();
        assert!(matches!(write_edif(&mut out, &design, None), Err(Error::Unsupported(_))));
    }
}
