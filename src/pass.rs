//! The pass registry and command dispatch
//!
//! Passes register under a command name; [`call`] tokenizes a command
//! line, looks the pass up and runs it against the design with a scoped
//! selection pushed onto the selection stack.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use log::debug;

use crate::rtlil::{escape_id, Design, IdString, Selection};
use crate::Error;

/// A named command operating on a design
pub trait Pass: Send + Sync {
    /// The command name the pass registers under
    fn name(&self) -> &'static str;
    /// One-line summary shown in help output
    fn help(&self) -> &'static str;
    /// Run the pass; `args[0]` is the command name
    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error>;
}

static REGISTRY: OnceLock<BTreeMap<&'static str, Box<dyn Pass>>> = OnceLock::new();

/// The process-wide registry of passes, built on first use
pub fn registry() -> &'static BTreeMap<&'static str, Box<dyn Pass>> {
    REGISTRY.get_or_init(|| {
        let mut map: BTreeMap<&'static str, Box<dyn Pass>> = BTreeMap::new();
        for pass in crate::passes::all_passes() {
            let name = pass.name();
            assert!(map.insert(name, pass).is_none(), "duplicate pass {name}");
        }
        map
    })
}

/// Split a command line into tokens, honoring double quotes
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in command.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Tokenize and execute a command against the design
///
/// The active selection is inherited by the invoked pass and restored
/// afterwards, so nested calls can narrow scope without leaking it.
pub fn call(design: &mut Design, command: &str) -> Result<(), Error> {
    let args = tokenize(command);
    if args.is_empty() {
        return Ok(());
    }
    call_args(design, &args)
}

/// Execute an already-tokenized command against the design
pub fn call_args(design: &mut Design, args: &[String]) -> Result<(), Error> {
    let pass = registry()
        .get(args[0].as_str())
        .ok_or_else(|| Error::Cmd(format!("unknown command `{}'", args[0])))?;
    debug!("executing {} pass", pass.name());
    let inherited = design.selection_stack.last().cloned().unwrap_or_else(Selection::full);
    design.selection_stack.push(inherited);
    let result = pass.execute(args, design);
    design.selection_stack.pop();
    debug!("finished {} pass", pass.name());
    result
}

/// Parse trailing selection arguments and install them as the active
/// selection
///
/// Accepted forms: `*` for everything, `module` for a whole module, and
/// `module/member` for a single member. Multiple arguments union. With no
/// arguments the inherited selection stays active. Flags are rejected.
pub fn extra_args(args: &[String], argidx: usize, design: &mut Design) -> Result<(), Error> {
    if argidx >= args.len() {
        return Ok(());
    }
    let mut selection = Selection::empty();
    for arg in &args[argidx..] {
        if arg.starts_with('-') {
            return Err(Error::Cmd(format!("unknown option `{arg}'")));
        }
        if arg == "*" {
            selection = Selection::full();
            break;
        }
        match arg.split_once('/') {
            Some((module, member)) => {
                selection.select_member(&escape_id(module), &escape_id(member));
            }
            None => selection.select_module(&escape_id(arg)),
        }
    }
    selection.optimize(design);
    *design.selection_stack.last_mut().expect("selection stack may not be empty") = selection;
    Ok(())
}

/// Snapshot of the active selection, detached from the design
///
/// Pass workers hold a mutable borrow of one module while they rewrite it;
/// this captures the scope queries they need up front.
#[derive(Clone)]
pub struct Scope {
    selection: Selection,
    active: Option<IdString>,
}

impl Scope {
    /// Capture the active selection of a design
    pub fn of(design: &Design) -> Scope {
        Scope {
            selection: design.selection_stack.last().cloned().unwrap_or_else(Selection::full),
            active: design.selected_active_module.clone(),
        }
    }

    fn active_allows(&self, mod_name: &IdString) -> bool {
        self.active.as_ref().map(|a| a == mod_name).unwrap_or(true)
    }

    /// Returns true if the module is at least partially selected
    pub fn module(&self, mod_name: &IdString) -> bool {
        self.active_allows(mod_name) && self.selection.selected_module(mod_name)
    }

    /// Returns true if a member of a module is selected
    pub fn member(&self, mod_name: &IdString, memb_name: &IdString) -> bool {
        self.active_allows(mod_name) && self.selection.selected_member(mod_name, memb_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtlil::Module;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("opt_share -nomux top"), vec!["opt_share", "-nomux", "top"]);
        assert_eq!(tokenize("  a  \"b c\"  "), vec!["a", "b c"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_unknown_command() {
        let mut design = Design::new();
        assert!(matches!(call(&mut design, "no_such_pass"), Err(Error::Cmd(_))));
    }

    #[test]
    fn test_selection_restored_after_call() {
        let mut design = Design::new();
        design.add_module(Module::new(escape_id("m")));
        design.add_module(Module::new(escape_id("n")));
        let depth = design.selection_stack.len();
        call(&mut design, "opt_rmdff m").unwrap();
        assert_eq!(design.selection_stack.len(), depth);
        assert!(design.selected_module(&escape_id("n")));
    }

    #[test]
    fn test_extra_args_scoping() {
        let mut design = Design::new();
        design.add_module(Module::new(escape_id("m")));
        design.add_module(Module::new(escape_id("n")));
        design.selection_stack.push(Selection::full());
        let args: Vec<String> = vec!["x".into(), "m".into()];
        extra_args(&args, 1, &mut design).unwrap();
        assert!(design.selected_module(&escape_id("m")));
        assert!(!design.selected_module(&escape_id("n")));
        design.selection_stack.pop();
    }

    #[test]
    fn test_extra_args_rejects_flags() {
        let mut design = Design::new();
        design.selection_stack.push(Selection::full());
        let args: Vec<String> = vec!["x".into(), "-bogus".into()];
        assert!(matches!(extra_args(&args, 1, &mut design), Err(Error::Cmd(_))));
        design.selection_stack.pop();
    }
}
