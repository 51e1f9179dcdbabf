//! Register-transfer-level netlist manipulation and synthesis passes
//!
//! This crate provides the in-memory register-transfer-level intermediate
//! representation shared by netlist frontends, transformation passes and
//! backends, together with a pipeline of named passes that rewrite it.
//!
//! # Usage and features
//!
//! Skein ships a command line tool. To show available commands:
//! ```bash
//! skein help
//! ```
//!
//! The `opt` command runs the cleanup pipeline (constant folding, cell
//! sharing and flip-flop removal) over a BLIF netlist:
//! ```bash
//! skein opt mydesign.blif -o optimized.blif
//! ```
//!
//! The `freduce` command proves nets functionally equivalent with a SAT
//! solver and merges their drivers:
//! ```bash
//! skein freduce mydesign.blif -o reduced.blif
//! ```
//!
//! Designs are written back with the `write-blif` and `write-edif`
//! backends.
//!
//! # Development
//!
//! ## Philosophy
//!
//! All passes operate on a single datastructure, the [`rtlil::Design`]: a
//! set of modules holding named wires, cells, memories and processes,
//! connected by bit-accurate [`rtlil::SigSpec`] signals. Unlike flat
//! gate-level graphs, the representation keeps names, hierarchy, and
//! word-level cells, so structural rewrites (technology mapping,
//! flattening), structural identity (cell sharing) and SAT-backed
//! functional reduction all work on the same in-memory design.
//!
//! ## Datastructures
//!
//! A [`rtlil::SigSpec`] is an ordered concatenation of wire slices and
//! constants with a canonical form, so two spellings of the same signal
//! compare equal. [`sigtools::SigMap`] canonicalizes signals that are
//! connected together. The [`celltypes::CellTypes`] catalog knows the
//! built-in cell types, their port directions, and how to constant-fold
//! them.
//!
//! For example, here is a module computing `y = a & b`:
//! ```
//! use skein::rtlil::{escape_id, Cell, Design, IdString, Module, SigSpec};
//! let mut design = Design::new();
//! let mut module = Module::new(escape_id("top"));
//! let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
//! let b = SigSpec::from_wire(module.new_wire(escape_id("b"), 1));
//! let y = SigSpec::from_wire(module.new_wire(escape_id("y"), 1));
//! let mut cell = Cell::new(escape_id("g"), IdString::from("$_AND_"));
//! cell.connections.insert(IdString::from("\\A"), a);
//! cell.connections.insert(IdString::from("\\B"), b);
//! cell.connections.insert(IdString::from("\\Y"), y);
//! module.add_cell(cell);
//! design.add_module(module);
//! ```

#![warn(missing_docs)]

pub mod celltypes;
pub mod cmd;
pub mod consteval;
pub mod io;
pub mod pass;
pub mod passes;
pub mod rtlil;
pub mod sat;
pub mod sigtools;

pub use pass::Pass;
pub use rtlil::{Cell, Const, Design, IdString, Module, SigSpec, State, Wire};

/// Errors reported by passes, frontends and backends
///
/// Structural invariant violations are not represented here; they are
/// assertion failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad arguments or an unknown object; the design is untouched
    #[error("{0}")]
    Cmd(String),
    /// A construct the invoked pass or backend cannot handle
    #[error("{0}")]
    Unsupported(String),
    /// An analysis failure that `-try` downgrades to a warning
    #[error("{0}")]
    Analysis(String),
    /// An underlying I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
