//! Reading and writing designs to netlist files
//!
//! The BLIF reader is the tool's input format; the BLIF and EDIF writers
//! are the backends of the pass pipeline.

pub mod blif;
pub mod edif;

use std::fs::File;
use std::path::Path;

use crate::rtlil::Design;
use crate::Error;

/// Read a design from a BLIF file
pub fn read_design_file(path: &Path) -> Result<Design, Error> {
    let f = File::open(path).map_err(Error::Io)?;
    blif::read_blif(f)
}

/// Write a design to a BLIF file with default options
pub fn write_design_file(path: &Path, design: &Design) -> Result<(), Error> {
    let mut f = File::create(path).map_err(Error::Io)?;
    blif::write_blif(&mut f, design, &blif::BlifConfig::default(), None)
}
