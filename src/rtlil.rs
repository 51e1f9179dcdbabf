//! The register-transfer-level intermediate representation
//!
//! A [`Design`] owns named [`Module`]s; a module owns its [`Wire`]s,
//! [`Memory`]s, [`Cell`]s and [`Process`]es and a list of connections.
//! Signals are expressed as [`SigSpec`]s, bit-accurate concatenations of
//! wire slices and constants. All frontends, passes and backends share
//! this representation.

/// Identifiers and the fresh-name generator
pub mod id;
/// Design, module, wire, memory, cell and selection containers
pub mod module;
/// Behavioral process trees
pub mod process;
/// The signal algebra
pub mod sigspec;
/// Multi-valued logic states and constants
pub mod value;

pub use id::{escape_id, IdString};
pub use module::{Cell, Design, Memory, Module, Selection, SigSig, Wire};
pub use process::{CaseRule, Process, SwitchRule, SyncRule, SyncType};
pub use sigspec::{SigBit, SigChunk, SigSpec};
pub use value::{Const, State};
