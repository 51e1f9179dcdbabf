//! BLIF writer and ABC-compatible BLIF reader
//!
//! The format specification is available
//! [here](https://course.ece.cmu.edu/~ee760/760docs/blif.pdf). The reader
//! supports the single-module `.names` subset that logic optimizers emit
//! and follows the ABC convention for unspecified minterms: they default
//! to the opposite polarity of the last cover line's output.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};

use crate::pass::{tokenize, Pass};
use crate::rtlil::{Cell, Const, Design, IdString, Module, SigSpec, State, Wire};
use crate::Error;

/// Output options of the BLIF writer
#[derive(Default, Clone)]
pub struct BlifConfig {
    /// Emit `.subckt` for every cell instead of translating gates
    pub subckt_mode: bool,
    /// Use the non-standard `.conn` statement for connections
    pub conn_mode: bool,
    /// Omit the implicit `$true`/`$false` net definitions
    pub impltf_mode: bool,
    /// Cell type and port names used for connection buffers
    pub buf: Option<(String, String, String)>,
    /// Cell type and output port driving the `$true` net
    pub true_cell: Option<(String, String)>,
    /// Cell type and output port driving the `$false` net
    pub false_cell: Option<(String, String)>,
}

/// BLIF does not allow `#` and `=` in identifiers
fn blif_escape(name: &str) -> String {
    name.chars().map(|c| if c == '#' || c == '=' { '?' } else { c }).collect()
}

fn blif_id(id: &IdString) -> String {
    blif_escape(id.unescape())
}

/// Render a single-bit signal as a BLIF net name
fn blif_sig(module: &Module, sig: &SigSpec) -> String {
    let mut sig = sig.clone();
    sig.optimize();
    assert_eq!(sig.width(), 1);
    let chunk = &sig.chunks()[0];
    match &chunk.wire {
        None => {
            if chunk.data.bits[0] == State::S1 { "$true" } else { "$false" }.to_owned()
        }
        Some(name) => {
            let mut str = blif_escape(name.unescape());
            if module.wires[name].width != 1 {
                str += &format!("[{}]", chunk.offset);
            }
            str
        }
    }
}

fn dump_module<W: Write>(f: &mut W, module: &Module, config: &BlifConfig) -> std::io::Result<()> {
    writeln!(f)?;
    writeln!(f, ".model {}", blif_id(&module.name))?;

    let mut inputs: BTreeMap<usize, &Wire> = BTreeMap::new();
    let mut outputs: BTreeMap<usize, &Wire> = BTreeMap::new();
    for wire in module.wires.values() {
        if wire.port_input {
            inputs.insert(wire.port_id, wire);
        }
        if wire.port_output {
            outputs.insert(wire.port_id, wire);
        }
    }

    write!(f, ".inputs")?;
    for wire in inputs.values() {
        for i in 0..wire.width {
            write!(f, " {}", blif_sig(module, &SigSpec::from_wire_slice(wire, 1, i)))?;
        }
    }
    writeln!(f)?;

    write!(f, ".outputs")?;
    for wire in outputs.values() {
        for i in 0..wire.width {
            write!(f, " {}", blif_sig(module, &SigSpec::from_wire_slice(wire, 1, i)))?;
        }
    }
    writeln!(f)?;

    if !config.impltf_mode {
        match &config.false_cell {
            Some((ty, port)) => writeln!(f, ".subckt {} {}=$false", ty, port)?,
            None => writeln!(f, ".names $false")?,
        }
        match &config.true_cell {
            Some((ty, port)) => writeln!(f, ".subckt {} {}=$true", ty, port)?,
            None => writeln!(f, ".names $true\n1")?,
        }
    }

    for cell in module.cells.values() {
        let conn = |port: &str| blif_sig(module, &cell.connections[&IdString::from(port)]);
        if !config.subckt_mode {
            match cell.ty.as_str() {
                "$_INV_" => {
                    writeln!(f, ".names {} {}\n0 1", conn("\\A"), conn("\\Y"))?;
                    continue;
                }
                "$_AND_" => {
                    writeln!(f, ".names {} {} {}\n11 1", conn("\\A"), conn("\\B"), conn("\\Y"))?;
                    continue;
                }
                "$_OR_" => {
                    writeln!(f, ".names {} {} {}\n1- 1\n-1 1", conn("\\A"), conn("\\B"), conn("\\Y"))?;
                    continue;
                }
                "$_XOR_" => {
                    writeln!(f, ".names {} {} {}\n10 1\n01 1", conn("\\A"), conn("\\B"), conn("\\Y"))?;
                    continue;
                }
                "$_MUX_" => {
                    writeln!(
                        f,
                        ".names {} {} {} {}\n1-0 1\n-11 1",
                        conn("\\A"),
                        conn("\\B"),
                        conn("\\S"),
                        conn("\\Y")
                    )?;
                    continue;
                }
                "$_DFF_N_" => {
                    writeln!(f, ".latch {} {} fe {}", conn("\\D"), conn("\\Q"), conn("\\C"))?;
                    continue;
                }
                "$_DFF_P_" => {
                    writeln!(f, ".latch {} {} re {}", conn("\\D"), conn("\\Q"), conn("\\C"))?;
                    continue;
                }
                _ => {}
            }
        }

        write!(f, ".subckt {}", blif_id(&cell.ty))?;
        for (port, sig) in &cell.connections {
            for i in 0..sig.width() {
                if sig.width() == 1 {
                    write!(f, " {}", blif_id(port))?;
                } else {
                    write!(f, " {}[{}]", blif_id(port), i)?;
                }
                write!(f, "={}", blif_sig(module, &sig.extract(i, 1)))?;
            }
        }
        writeln!(f)?;
    }

    for (lhs, rhs) in &module.connections {
        for i in 0..lhs.width() {
            let driven = blif_sig(module, &lhs.extract(i, 1));
            let driver = blif_sig(module, &rhs.extract(i, 1));
            if config.conn_mode {
                writeln!(f, ".conn {} {}", driver, driven)?;
            } else if let Some((ty, in_port, out_port)) = &config.buf {
                writeln!(f, ".subckt {} {}={} {}={}", ty, in_port, driver, out_port, driven)?;
            } else {
                writeln!(f, ".names {} {}\n1 1", driver, driven)?;
            }
        }
    }

    writeln!(f, ".end")
}

/// Write a design to BLIF
///
/// With `top` given, that module is written first; every module must be
/// free of processes and memories.
pub fn write_blif<W: Write>(
    f: &mut W,
    design: &Design,
    config: &BlifConfig,
    top: Option<&str>,
) -> Result<(), Error> {
    let placeholder = IdString::from("\\placeholder");
    let top_name = top.map(crate::rtlil::escape_id);
    let mut deferred = Vec::new();
    let mut top_seen = false;

    for module in design.modules.values() {
        if module.get_bool_attribute(&placeholder) {
            continue;
        }
        if !module.processes.is_empty() {
            return Err(Error::Unsupported(format!(
                "found unmapped processes in module {}: not supported by the BLIF backend",
                module.name
            )));
        }
        if !module.memories.is_empty() {
            return Err(Error::Unsupported(format!(
                "found unmapped memories in module {}: not supported by the BLIF backend",
                module.name
            )));
        }
        if top_name.as_ref() == Some(&module.name) {
            dump_module(f, module, config).map_err(Error::Io)?;
            top_seen = true;
        } else {
            deferred.push(module);
        }
    }

    if top_name.is_some() && !top_seen {
        return Err(Error::Cmd(format!("can't find top module `{}'", top.unwrap())));
    }
    for module in deferred {
        dump_module(f, module, config).map_err(Error::Io)?;
    }
    Ok(())
}

/// Read a single-module BLIF file into a design of `$lut` cells
pub fn read_blif<R: Read>(r: R) -> Result<Design, Error> {
    let mut design = Design::new();
    let mut module = Module::new(IdString::from("\\logic"));
    let mut port_count = 0;

    // Name of the cell whose LUT table the cover lines fill, plus the
    // default for minterms the covers leave unspecified.
    let mut lut_cell: Option<IdString> = None;
    let mut lut_default = State::Sx;

    let mut line_count = 0;
    let syntax_error = |line: usize| Error::Cmd(format!("syntax error in BLIF line {line}"));

    let mut pending = String::new();
    let mut logical_lines: Vec<(usize, String)> = Vec::new();
    for line in BufReader::new(r).lines() {
        let line = line.map_err(Error::Io)?;
        line_count += 1;
        let trimmed = line.trim_end();
        if let Some(stripped) = trimmed.strip_suffix('\\') {
            pending += stripped;
            continue;
        }
        pending += trimmed;
        logical_lines.push((line_count, std::mem::take(&mut pending)));
    }
    if !pending.is_empty() {
        logical_lines.push((line_count, pending));
    }

    for (line_no, line) in logical_lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('.') {
            if let Some(cell_name) = lut_cell.take() {
                let table = module
                    .cells
                    .get_mut(&cell_name)
                    .unwrap()
                    .parameters
                    .get_mut(&IdString::from("\\LUT"))
                    .unwrap();
                for bit in &mut table.bits {
                    if *bit == State::Sx {
                        *bit = lut_default;
                    }
                }
                lut_default = State::Sx;
            }

            let tokens = tokenize(line);
            match tokens[0].as_str() {
                ".model" => continue,
                ".end" => {
                    design.add_module(module);
                    return Ok(design);
                }
                ".inputs" | ".outputs" => {
                    for name in &tokens[1..] {
                        let id = IdString::from(format!("\\{name}"));
                        if module.wires.contains_key(&id) {
                            return Err(Error::Cmd(format!("net {name} is defined twice")));
                        }
                        port_count += 1;
                        let wire = module.new_wire(id, 1);
                        wire.port_id = port_count;
                        if tokens[0] == ".inputs" {
                            wire.port_input = true;
                        } else {
                            wire.port_output = true;
                        }
                    }
                    continue;
                }
                ".names" => {
                    let mut sig = SigSpec::new();
                    for name in &tokens[1..] {
                        let id = IdString::from(format!("\\{name}"));
                        if !module.wires.contains_key(&id) {
                            module.new_wire(id.clone(), 1);
                        }
                        sig.append(&SigSpec::from_wire(&module.wires[&id]));
                    }
                    if sig.is_empty() {
                        return Err(syntax_error(line_no));
                    }
                    let output_sig = sig.extract(sig.width() - 1, 1);
                    let mut input_sig = sig.extract(0, sig.width() - 1);
                    input_sig.optimize();

                    let mut cell = Cell::new(IdString::fresh(), IdString::from("$lut"));
                    cell.parameters
                        .insert(IdString::from("\\WIDTH"), Const::from_int(input_sig.width() as i64, 32));
                    cell.parameters
                        .insert(IdString::from("\\LUT"), Const::fill(State::Sx, 1 << input_sig.width()));
                    cell.connections.insert(IdString::from("\\I"), input_sig);
                    cell.connections.insert(IdString::from("\\O"), output_sig);
                    lut_cell = Some(cell.name.clone());
                    lut_default = State::Sx;
                    module.add_cell(cell);
                    continue;
                }
                _ => return Err(syntax_error(line_no)),
            }
        }

        // A cover line of the open `.names` statement.
        let Some(cell_name) = &lut_cell else {
            return Err(syntax_error(line_no));
        };
        let tokens = tokenize(line);
        let (pattern, output) = match tokens.as_slice() {
            [output] => (String::new(), output.clone()),
            [pattern, output] => (pattern.clone(), output.clone()),
            _ => return Err(syntax_error(line_no)),
        };
        if output != "0" && output != "1" {
            return Err(syntax_error(line_no));
        }
        if pattern.len() > 8 {
            return Err(syntax_error(line_no));
        }

        let cell = module.cells.get_mut(cell_name).unwrap();
        let width = cell.parameters[&IdString::from("\\WIDTH")].as_int() as usize;
        if pattern.len() != width {
            return Err(syntax_error(line_no));
        }
        let table = cell.parameters.get_mut(&IdString::from("\\LUT")).unwrap();
        let pattern = pattern.as_bytes();
        'minterm: for i in 0..1usize << width {
            for (j, &c) in pattern.iter().enumerate() {
                if c != b'-' {
                    let expect = if i >> j & 1 != 0 { b'1' } else { b'0' };
                    if c != expect {
                        continue 'minterm;
                    }
                }
            }
            table.bits[i] = if output == "0" { State::S0 } else { State::S1 };
        }
        lut_default = if output == "0" { State::S1 } else { State::S0 };
    }

    Err(syntax_error(line_count))
}

/// The `write_blif` backend command
pub struct WriteBlifPass;

impl Pass for WriteBlifPass {
    fn name(&self) -> &'static str {
        "write_blif"
    }

    fn help(&self) -> &'static str {
        "write_blif [options] [filename]: write the design to a BLIF file"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        let mut config = BlifConfig::default();
        let mut top = None;
        let mut filename = None;

        let mut argidx = 1;
        while argidx < args.len() {
            match args[argidx].as_str() {
                "-top" if argidx + 1 < args.len() => {
                    top = Some(args[argidx + 1].clone());
                    argidx += 2;
                }
                "-buf" if argidx + 3 < args.len() => {
                    config.buf = Some((
                        args[argidx + 1].clone(),
                        args[argidx + 2].clone(),
                        args[argidx + 3].clone(),
                    ));
                    argidx += 4;
                }
                "-true" if argidx + 2 < args.len() => {
                    config.true_cell = Some((args[argidx + 1].clone(), args[argidx + 2].clone()));
                    argidx += 3;
                }
                "-false" if argidx + 2 < args.len() => {
                    config.false_cell = Some((args[argidx + 1].clone(), args[argidx + 2].clone()));
                    argidx += 3;
                }
                "-subckt" => {
                    config.subckt_mode = true;
                    argidx += 1;
                }
                "-conn" => {
                    config.conn_mode = true;
                    argidx += 1;
                }
                "-impltf" => {
                    config.impltf_mode = true;
                    argidx += 1;
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
                write_blif(&mut f, design, &config, top.as_deref())
            }
            None => {
                let mut out = std::io::stdout().lock();
                write_blif(&mut out, design, &config, top.as_deref())
            }
        }
    }
}
