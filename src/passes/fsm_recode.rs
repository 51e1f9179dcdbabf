//! Re-encoding of `$fsm` cell state tables

use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::{info, warn};

use crate::pass::{extra_args, Pass, Scope};
use crate::rtlil::{Cell, Const, Design, IdString, State};
use crate::Error;

/// The data embedded in the parameters of a `$fsm` cell
///
/// `\STATE_TABLE` packs the state codes back to back, `\STATE_BITS` bits
/// apiece in table order; `\STATE_RST` is the reset state index or -1.
/// `\TRANS_TABLE` packs `\TRANS_NUM` transition quadruples (state-in
/// index, ctrl-in pattern, state-out index, ctrl-out pattern); it
/// references states by index and is untouched by re-encoding.
#[derive(Clone, Debug)]
pub struct FsmData {
    /// Source name of the state register (`\NAME`)
    pub name: Const,
    /// Width of a state code in bits
    pub state_bits: usize,
    /// Index of the reset state, or -1 when there is none
    pub reset_state: i32,
    /// State codes in table order
    pub state_table: Vec<Const>,
    /// Number of transitions in the transition table
    pub trans_num: usize,
    /// Packed transition quadruples
    pub trans_table: Const,
    /// Width of the control input of the FSM
    pub ctrl_in_width: usize,
    /// Width of the control output of the FSM
    pub ctrl_out_width: usize,
}

impl FsmData {
    /// Read the FSM description from the parameters of a `$fsm` cell
    pub fn from_cell(cell: &Cell) -> Result<FsmData, Error> {
        let param = |name: &str| {
            cell.parameters
                .get(&IdString::from(name))
                .ok_or_else(|| Error::Cmd(format!("cell `{}' has no {} parameter", cell.name, name)))
        };
        let name = param("\\NAME")?.clone();
        let state_bits = param("\\STATE_BITS")?.as_int() as usize;
        let state_num = param("\\STATE_NUM")?.as_int() as usize;
        let reset_state = param("\\STATE_RST")?.as_int();
        let table = param("\\STATE_TABLE")?;
        if table.width() != state_bits * state_num {
            return Err(Error::Cmd(format!(
                "cell `{}' has an inconsistent state table",
                cell.name
            )));
        }
        let state_table = (0..state_num)
            .map(|i| Const::from_bits(table.bits[i * state_bits..(i + 1) * state_bits].to_vec()))
            .collect();
        let trans_num = param("\\TRANS_NUM")?.as_int() as usize;
        let trans_table = param("\\TRANS_TABLE")?.clone();
        let ctrl_in_width = param("\\CTRL_IN_WIDTH")?.as_int() as usize;
        let ctrl_out_width = param("\\CTRL_OUT_WIDTH")?.as_int() as usize;
        Ok(FsmData {
            name,
            state_bits,
            reset_state,
            state_table,
            trans_num,
            trans_table,
            ctrl_in_width,
            ctrl_out_width,
        })
    }

    /// Write the FSM description back into the parameters of a `$fsm` cell
    pub fn to_cell(&self, cell: &mut Cell) {
        let mut table = Const::new();
        for code in &self.state_table {
            assert_eq!(code.width(), self.state_bits);
            table.bits.extend(code.bits.iter().copied());
        }
        cell.parameters.insert(IdString::from("\\NAME"), self.name.clone());
        cell.parameters.insert(IdString::from("\\STATE_BITS"), Const::from_int(self.state_bits as i64, 32));
        cell.parameters.insert(IdString::from("\\STATE_NUM"), Const::from_int(self.state_table.len() as i64, 32));
        cell.parameters.insert(IdString::from("\\STATE_RST"), Const::from_int(self.reset_state as i64, 32));
        cell.parameters.insert(IdString::from("\\STATE_TABLE"), table);
        cell.parameters.insert(IdString::from("\\TRANS_NUM"), Const::from_int(self.trans_num as i64, 32));
        cell.parameters.insert(IdString::from("\\TRANS_TABLE"), self.trans_table.clone());
        cell.parameters.insert(IdString::from("\\CTRL_IN_WIDTH"), Const::from_int(self.ctrl_in_width as i64, 32));
        cell.parameters.insert(IdString::from("\\CTRL_OUT_WIDTH"), Const::from_int(self.ctrl_out_width as i64, 32));
    }
}

/// Write Synopsys Formality `set_fsm_*` commands describing an encoding
fn fm_set_fsm_print(
    cell: &Cell,
    module_name: &IdString,
    fsm_data: &FsmData,
    prefix: &str,
    f: &mut File,
) -> std::io::Result<()> {
    let name_param =
        fsm_data.name.source.clone().unwrap_or_else(|| cell.name.as_str().to_owned());
    let reg_name = name_param.strip_prefix('\\').unwrap_or(&name_param);

    write!(f, "set_fsm_state_vector {{")?;
    for i in (0..fsm_data.state_bits).rev() {
        write!(f, " {}_reg[{}]", reg_name, i)?;
    }
    writeln!(f, " }} -name {{{}_{}}} {{{}:/WORK/{}}}", prefix, reg_name, prefix, module_name.unescape())?;

    write!(f, "set_fsm_encoding {{")?;
    for (i, code) in fsm_data.state_table.iter().enumerate() {
        write!(f, " s{}=2#", i)?;
        for bit in code.bits.iter().rev() {
            write!(f, "{}", if *bit == State::S1 { '1' } else { '0' })?;
        }
    }
    writeln!(f, " }} -name {{{}_{}}} {{{}:/WORK/{}}}", prefix, reg_name, prefix, module_name.unescape())
}

fn recode_fsm(
    cell: &mut Cell,
    module_name: &IdString,
    fm_file: Option<&mut File>,
    default_encoding: &str,
) -> Result<(), Error> {
    let mut encoding = cell
        .attributes
        .get(&IdString::from("\\fsm_encoding"))
        .and_then(|v| v.source.clone())
        .unwrap_or_else(|| "auto".to_owned());

    info!("recoding FSM `{}' from module `{}' using `{}' encoding", cell.name, module_name, encoding);
    if !matches!(encoding.as_str(), "none" | "one-hot" | "binary") {
        if encoding != "auto" {
            warn!("unknown encoding `{}': using auto ({}) instead", encoding, default_encoding);
        }
        encoding = default_encoding.to_owned();
    }

    if encoding == "none" {
        info!("nothing to do for encoding `none'");
        return Ok(());
    }

    let mut fsm_data = FsmData::from_cell(cell)?;
    let mut fm_file = fm_file;

    if let Some(f) = fm_file.as_deref_mut() {
        fm_set_fsm_print(cell, module_name, &fsm_data, "r", f).map_err(Error::Io)?;
    }

    let state_num = fsm_data.state_table.len();
    fsm_data.state_bits = match encoding.as_str() {
        "one-hot" => state_num,
        "auto" | "binary" => (state_num.max(1) as f64).log2().ceil() as usize,
        other => return Err(Error::Cmd(format!("FSM encoding `{other}' is not supported"))),
    };

    let mut state_idx_counter = if fsm_data.reset_state >= 0 { 1 } else { 0 };
    for i in 0..state_num {
        let state_idx = if fsm_data.reset_state == i as i32 {
            0
        } else {
            let idx = state_idx_counter;
            state_idx_counter += 1;
            idx
        };
        let new_code = match encoding.as_str() {
            "one-hot" => {
                let mut code = Const::fill(State::Sa, fsm_data.state_bits);
                code.bits[state_idx] = State::S1;
                code
            }
            _ => Const::from_int(state_idx as i64, fsm_data.state_bits),
        };
        info!("  {} -> {}", fsm_data.state_table[i].as_string(), new_code.as_string());
        fsm_data.state_table[i] = new_code;
    }

    if let Some(f) = fm_file.as_deref_mut() {
        fm_set_fsm_print(cell, module_name, &fsm_data, "i", f).map_err(Error::Io)?;
    }

    fsm_data.to_cell(cell);
    Ok(())
}

/// Re-assign the state encodings of `$fsm` cells
pub struct FsmRecodePass;

impl Pass for FsmRecodePass {
    fn name(&self) -> &'static str {
        "fsm_recode"
    }

    fn help(&self) -> &'static str {
        "fsm_recode [-encoding type] [-fm_set_fsm_file file] [selection]"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        let mut fm_file: Option<File> = None;
        let mut default_encoding = "one-hot".to_owned();

        let mut argidx = 1;
        while argidx < args.len() {
            match args[argidx].as_str() {
                "-fm_set_fsm_file" if argidx + 1 < args.len() && fm_file.is_none() => {
                    let path = &args[argidx + 1];
                    fm_file = Some(File::create(Path::new(path)).map_err(Error::Io)?);
                    argidx += 2;
                }
                "-encoding" if argidx + 1 < args.len() => {
                    default_encoding = args[argidx + 1].clone();
                    argidx += 2;
                }
                _ => break,
            }
        }
        extra_args(args, argidx, design)?;

        let scope = Scope::of(design);
        let mod_names: Vec<IdString> = design.modules.keys().cloned().collect();
        for mod_name in mod_names {
            if !scope.module(&mod_name) {
                continue;
            }
            let cell_names: Vec<IdString> = design.modules[&mod_name]
                .cells
                .iter()
                .filter(|(name, cell)| {
                    cell.ty.as_str() == "$fsm" && scope.member(&mod_name, name)
                })
                .map(|(name, _)| name.clone())
                .collect();
            for cell_name in cell_names {
                let module = design.modules.get_mut(&mod_name).unwrap();
                let cell = module.cells.get_mut(&cell_name).unwrap();
                recode_fsm(cell, &mod_name, fm_file.as_mut(), &default_encoding)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::call;
    use crate::rtlil::{escape_id, Module};

    fn fsm_cell(state_bits: usize, states: &[Const], reset: i32) -> Cell {
        let mut cell = Cell::new(escape_id("fsm"), IdString::from("$fsm"));
        let mut table = Const::new();
        for code in states {
            table.bits.extend(code.bits.iter().copied());
        }
        cell.parameters.insert(IdString::from("\\NAME"), Const::from_string("\\state"));
        cell.parameters.insert(IdString::from("\\STATE_BITS"), Const::from_int(state_bits as i64, 32));
        cell.parameters.insert(IdString::from("\\STATE_NUM"), Const::from_int(states.len() as i64, 32));
        cell.parameters.insert(IdString::from("\\STATE_RST"), Const::from_int(reset as i64, 32));
        cell.parameters.insert(IdString::from("\\STATE_TABLE"), table);
        cell.parameters.insert(IdString::from("\\TRANS_NUM"), Const::from_int(1, 32));
        cell.parameters
            .insert(IdString::from("\\TRANS_TABLE"), Const::from_int(0b01_1_00, state_bits * 2 + 1));
        cell.parameters.insert(IdString::from("\\CTRL_IN_WIDTH"), Const::from_int(1, 32));
        cell.parameters.insert(IdString::from("\\CTRL_OUT_WIDTH"), Const::from_int(0, 32));
        cell
    }

    fn design_with_fsm(encoding: Option<&str>) -> Design {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let states: Vec<Const> = (0..4).map(|i| Const::from_int(i, 2)).collect();
        let mut cell = fsm_cell(2, &states, 2);
        if let Some(encoding) = encoding {
            cell.attributes.insert(IdString::from("\\fsm_encoding"), Const::from_string(encoding));
        }
        module.add_cell(cell);
        design.add_module(module);
        design
    }

    #[test]
    fn test_one_hot_recode() {
        let mut design = design_with_fsm(Some("one-hot"));
        call(&mut design, "fsm_recode").unwrap();
        let cell = &design.modules[&escape_id("top")].cells[&escape_id("fsm")];
        let data = FsmData::from_cell(cell).unwrap();
        assert_eq!(data.state_bits, 4);
        // Reset state (index 2) takes encoding slot 0; the rest follow in
        // table order. One-hot codes are don't-care filled.
        let hot = |code: &Const| code.bits.iter().position(|&b| b == State::S1).unwrap();
        assert_eq!(hot(&data.state_table[0]), 1);
        assert_eq!(hot(&data.state_table[1]), 2);
        assert_eq!(hot(&data.state_table[2]), 0);
        assert_eq!(hot(&data.state_table[3]), 3);
        for code in &data.state_table {
            assert_eq!(code.bits.iter().filter(|&&b| b == State::S1).count(), 1);
            assert!(code.bits.iter().all(|&b| b == State::S1 || b == State::Sa));
        }
        assert_eq!(data.state_table[2].as_string(), "---1");
        assert_eq!(data.state_table[3].as_string(), "1---");
    }

    #[test]
    fn test_binary_recode() {
        let mut design = design_with_fsm(Some("binary"));
        call(&mut design, "fsm_recode").unwrap();
        let cell = &design.modules[&escape_id("top")].cells[&escape_id("fsm")];
        let data = FsmData::from_cell(cell).unwrap();
        assert_eq!(data.state_bits, 2);
        assert_eq!(data.state_table[2], Const::from_int(0, 2));
        assert_eq!(data.state_table[0], Const::from_int(1, 2));
        assert_eq!(data.state_table[1], Const::from_int(2, 2));
        assert_eq!(data.state_table[3], Const::from_int(3, 2));
    }

    #[test]
    fn test_codec_roundtrips_all_parameters() {
        let states: Vec<Const> = (0..4).map(|i| Const::from_int(i, 2)).collect();
        let cell = fsm_cell(2, &states, 2);
        let data = FsmData::from_cell(&cell).unwrap();
        assert_eq!(data.name.source.as_deref(), Some("\\state"));
        assert_eq!(data.trans_num, 1);
        assert_eq!(data.ctrl_in_width, 1);
        assert_eq!(data.ctrl_out_width, 0);

        // Rebuilding a fresh cell from the codec reproduces every
        // parameter, not just the state table.
        let mut rebuilt = Cell::new(escape_id("fsm"), IdString::from("$fsm"));
        data.to_cell(&mut rebuilt);
        assert_eq!(rebuilt.parameters, cell.parameters);
        assert_eq!(
            rebuilt.parameters[&IdString::from("\\NAME")].source.as_deref(),
            Some("\\state")
        );
    }

    #[test]
    fn test_none_is_noop() {
        let mut design = design_with_fsm(Some("none"));
        let before = design.modules[&escape_id("top")].cells[&escape_id("fsm")].parameters.clone();
        call(&mut design, "fsm_recode").unwrap();
        let after = &design.modules[&escape_id("top")].cells[&escape_id("fsm")].parameters;
        assert_eq!(before, *after);
    }

    #[test]
    fn test_auto_uses_default_encoding() {
        let mut design = design_with_fsm(None);
        call(&mut design, "fsm_recode -encoding binary").unwrap();
        let cell = &design.modules[&escape_id("top")].cells[&escape_id("fsm")];
        assert_eq!(FsmData::from_cell(cell).unwrap().state_bits, 2);

        let mut design = design_with_fsm(None);
        call(&mut design, "fsm_recode").unwrap();
        let cell = &design.modules[&escape_id("top")].cells[&escape_id("fsm")];
        // The default for auto is one-hot.
        assert_eq!(FsmData::from_cell(cell).unwrap().state_bits, 4);
    }
}
