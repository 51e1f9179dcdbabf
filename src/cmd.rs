//! Command line interface

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::io::{read_design_file, write_design_file};
use crate::pass;
use crate::rtlil::Design;
use crate::Error;

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Command line arguments
#[derive(Subcommand)]
pub enum Commands {
    /// Show statistics about a design
    ///
    /// Prints the number of wires, cells per type and connections of each
    /// module.
    #[clap()]
    Show(ShowArgs),

    /// Run the cleanup passes: opt_const, opt_share, opt_rmdff
    #[clap(alias = "optimize")]
    Opt(PassArgs),

    /// Fold cells with constant inputs into constant drivers
    OptConst(PassArgs),

    /// Merge cells with identical type, parameters and inputs
    OptShare(OptShareArgs),

    /// Remove flip-flops with constant or feedback inputs
    OptRmdff(PassArgs),

    /// Prove nets functionally equivalent with SAT and merge them
    Freduce(FreduceArgs),

    /// Re-assign the state encodings of FSM cells
    FsmRecode(FsmRecodeArgs),

    /// Replace cells with implementations from a map library
    Techmap(TechmapArgs),

    /// Expand module instances in place
    Flatten(PassArgs),

    /// Rename an object, or enumerate all generated names
    Rename(RenameArgs),

    /// Write the design to a BLIF file
    WriteBlif(WriteBlifArgs),

    /// Write the design to an EDIF file
    WriteEdif(WriteEdifArgs),
}

impl Commands {
    /// Run the selected command
    pub fn run(&self) -> Result<(), Error> {
        match self {
            Commands::Show(args) => args.run(),
            Commands::Opt(args) => args.run("opt"),
            Commands::OptConst(args) => args.run("opt_const"),
            Commands::OptShare(args) => args.run(),
            Commands::OptRmdff(args) => args.run("opt_rmdff"),
            Commands::Freduce(args) => args.run(),
            Commands::FsmRecode(args) => args.run(),
            Commands::Techmap(args) => args.run(),
            Commands::Flatten(args) => args.run("flatten"),
            Commands::Rename(args) => args.run(),
            Commands::WriteBlif(args) => args.run(),
            Commands::WriteEdif(args) => args.run(),
        }
    }
}

fn run_command(
    file: &PathBuf,
    output: Option<&PathBuf>,
    command: Vec<String>,
) -> Result<(), Error> {
    let mut design = read_design_file(file)?;
    pass::call_args(&mut design, &command)?;
    design.check();
    if let Some(path) = output {
        write_design_file(path, &design)?;
    }
    Ok(())
}

fn push_selection(command: &mut Vec<String>, select: &Option<String>) {
    if let Some(select) = select {
        command.push(select.clone());
    }
}

/// Command arguments shared by the plain transformation passes
#[derive(Args)]
pub struct PassArgs {
    /// Design to transform
    file: PathBuf,

    /// Output file for the transformed design
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Restrict the pass to a selection (`module` or `module/member`)
    #[arg(long)]
    select: Option<String>,
}

impl PassArgs {
    fn run(&self, pass_name: &str) -> Result<(), Error> {
        let mut command = vec![pass_name.to_owned()];
        push_selection(&mut command, &self.select);
        run_command(&self.file, self.output.as_ref(), command)
    }
}

/// Command arguments for design statistics
#[derive(Args)]
pub struct ShowArgs {
    /// Design to show
    file: PathBuf,
}

impl ShowArgs {
    fn run(&self) -> Result<(), Error> {
        let design = read_design_file(&self.file)?;
        for module in design.modules.values() {
            println!("module {}:", module.name.unescape());
            println!("  {} wires", module.wires.len());
            println!("  {} connections", module.connections.len());
            let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
            for cell in module.cells.values() {
                *by_type.entry(cell.ty.as_str()).or_default() += 1;
            }
            for (ty, count) in by_type {
                println!("  {} {} cells", count, ty);
            }
        }
        Ok(())
    }
}

/// Command arguments for cell sharing
#[derive(Args)]
pub struct OptShareArgs {
    /// Design to transform
    file: PathBuf,

    /// Output file for the transformed design
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Do not merge MUX cells
    #[arg(long)]
    nomux: bool,

    /// Restrict the pass to a selection
    #[arg(long)]
    select: Option<String>,
}

impl OptShareArgs {
    fn run(&self) -> Result<(), Error> {
        let mut command = vec!["opt_share".to_owned()];
        if self.nomux {
            command.push("-nomux".to_owned());
        }
        push_selection(&mut command, &self.select);
        run_command(&self.file, self.output.as_ref(), command)
    }
}

/// Command arguments for functional reduction
#[derive(Args)]
pub struct FreduceArgs {
    /// Design to transform
    file: PathBuf,

    /// Output file for the transformed design
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Degrade analysis failures to warnings
    #[arg(long)]
    try_mode: bool,

    /// Restrict the pass to a selection
    #[arg(long)]
    select: Option<String>,
}

impl FreduceArgs {
    fn run(&self) -> Result<(), Error> {
        let mut command = vec!["freduce".to_owned()];
        if self.try_mode {
            command.push("-try".to_owned());
        }
        push_selection(&mut command, &self.select);
        run_command(&self.file, self.output.as_ref(), command)
    }
}

/// Command arguments for FSM re-encoding
#[derive(Args)]
pub struct FsmRecodeArgs {
    /// Design to transform
    file: PathBuf,

    /// Output file for the transformed design
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Default encoding for FSMs without one: none, one-hot, binary, auto
    #[arg(long)]
    encoding: Option<String>,

    /// Write Synopsys Formality set_fsm_* commands to this file
    #[arg(long)]
    fm_set_fsm_file: Option<PathBuf>,

    /// Restrict the pass to a selection
    #[arg(long)]
    select: Option<String>,
}

impl FsmRecodeArgs {
    fn run(&self) -> Result<(), Error> {
        let mut command = vec!["fsm_recode".to_owned()];
        if let Some(path) = &self.fm_set_fsm_file {
            command.push("-fm_set_fsm_file".to_owned());
            command.push(path.to_string_lossy().into_owned());
        }
        if let Some(encoding) = &self.encoding {
            command.push("-encoding".to_owned());
            command.push(encoding.clone());
        }
        push_selection(&mut command, &self.select);
        run_command(&self.file, self.output.as_ref(), command)
    }
}

/// Command arguments for technology mapping
#[derive(Args)]
pub struct TechmapArgs {
    /// Design to transform
    file: PathBuf,

    /// Library of cell implementations to use
    #[arg(short = 'm', long)]
    map: PathBuf,

    /// Output file for the transformed design
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Run opt on map modules and opt_const on fresh cells
    #[arg(long)]
    opt: bool,

    /// Restrict the pass to a selection
    #[arg(long)]
    select: Option<String>,
}

impl TechmapArgs {
    fn run(&self) -> Result<(), Error> {
        let mut command = vec![
            "techmap".to_owned(),
            "-map".to_owned(),
            self.map.to_string_lossy().into_owned(),
        ];
        if self.opt {
            command.push("-opt".to_owned());
        }
        push_selection(&mut command, &self.select);
        run_command(&self.file, self.output.as_ref(), command)
    }
}

/// Command arguments for renaming
#[derive(Args)]
pub struct RenameArgs {
    /// Design to transform
    file: PathBuf,

    /// Old and new name, unless -enumerate is given
    names: Vec<String>,

    /// Output file for the transformed design
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Rename all selected objects with generated names
    #[arg(long)]
    enumerate: bool,

    /// Restrict the pass to a selection
    #[arg(long)]
    select: Option<String>,
}

impl RenameArgs {
    fn run(&self) -> Result<(), Error> {
        let mut command = vec!["rename".to_owned()];
        if self.enumerate {
            command.push("-enumerate".to_owned());
        }
        command.extend(self.names.iter().cloned());
        push_selection(&mut command, &self.select);
        run_command(&self.file, self.output.as_ref(), command)
    }
}

/// Command arguments for the BLIF backend
#[derive(Args)]
pub struct WriteBlifArgs {
    /// Design to write
    file: PathBuf,

    /// Output file; stdout if omitted
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Set the top module of the design
    #[arg(long)]
    top: Option<String>,

    /// Emit .subckt lines for all cells instead of gate translations
    #[arg(long)]
    subckt: bool,

    /// Use the non-standard .conn statement instead of buffers
    #[arg(long)]
    conn: bool,

    /// Omit the implicit $true/$false definitions
    #[arg(long)]
    impltf: bool,

    /// Buffer cell type, input port and output port
    #[arg(long, num_args = 3, value_names = ["TYPE", "IN", "OUT"])]
    buf: Option<Vec<String>>,

    /// Cell type and output port driving constant-1 nets
    #[arg(long = "true", num_args = 2, value_names = ["TYPE", "OUT"])]
    true_cell: Option<Vec<String>>,

    /// Cell type and output port driving constant-0 nets
    #[arg(long = "false", num_args = 2, value_names = ["TYPE", "OUT"])]
    false_cell: Option<Vec<String>>,
}

impl WriteBlifArgs {
    fn run(&self) -> Result<(), Error> {
        let mut design = read_design_file(&self.file)?;
        let mut command = vec!["write_blif".to_owned()];
        if let Some(top) = &self.top {
            command.extend(["-top".to_owned(), top.clone()]);
        }
        for (flag, set) in [("-subckt", self.subckt), ("-conn", self.conn), ("-impltf", self.impltf)] {
            if set {
                command.push(flag.to_owned());
            }
        }
        for (flag, values) in [("-buf", &self.buf), ("-true", &self.true_cell), ("-false", &self.false_cell)] {
            if let Some(values) = values {
                command.push(flag.to_owned());
                command.extend(values.iter().cloned());
            }
        }
        if let Some(path) = &self.output {
            command.push(path.to_string_lossy().into_owned());
        }
        pass::call_args(&mut design, &command)
    }
}

/// Command arguments for the EDIF backend
#[derive(Args)]
pub struct WriteEdifArgs {
    /// Design to write
    file: PathBuf,

    /// Output file; stdout if omitted
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Set the top module of the design
    #[arg(long)]
    top: Option<String>,
}

impl WriteEdifArgs {
    fn run(&self) -> Result<(), Error> {
        let mut design: Design = read_design_file(&self.file)?;
        let mut command = vec!["write_edif".to_owned()];
        if let Some(top) = &self.top {
            command.extend(["-top".to_owned(), top.clone()]);
        }
        if let Some(path) = &self.output {
            command.push(path.to_string_lossy().into_owned());
        }
        pass::call_args(&mut design, &command)
    }
}
