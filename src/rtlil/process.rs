use std::collections::BTreeMap;

use crate::rtlil::id::IdString;
use crate::rtlil::sigspec::SigSpec;
use crate::rtlil::value::Const;

/// Edge or level sensitivity of a synchronization rule
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SyncType {
    /// Rising edge of the signal
    Posedge,
    /// Falling edge of the signal
    Negedge,
    /// Any edge of the signal
    Edge,
    /// Unconditional update
    Always,
    /// Initial value assignment
    Init,
}

/// One branch of a switch, with compare patterns and parallel actions
#[derive(Clone, Debug, Default)]
pub struct CaseRule {
    /// Patterns matched against the switch signal; empty matches always
    pub compare: Vec<SigSpec>,
    /// Assignments performed when the case matches
    pub actions: Vec<(SigSpec, SigSpec)>,
    /// Nested switches
    pub switches: Vec<SwitchRule>,
}

/// A decision on a signal, with its cases in priority order
#[derive(Clone, Debug, Default)]
pub struct SwitchRule {
    /// The signal the cases compare against
    pub signal: SigSpec,
    /// Free-form attributes
    pub attributes: BTreeMap<IdString, Const>,
    /// Cases in priority order
    pub cases: Vec<CaseRule>,
}

/// A synchronization rule: actions applied on an event of a signal
#[derive(Clone, Debug)]
pub struct SyncRule {
    /// Sensitivity of the rule
    pub ty: SyncType,
    /// The triggering signal
    pub signal: SigSpec,
    /// Assignments performed on the event
    pub actions: Vec<(SigSpec, SigSpec)>,
}

/// A behavioral remnant not yet lowered to cells
///
/// Cloning a process deep-copies the whole decision tree.
#[derive(Clone, Debug, Default)]
pub struct Process {
    /// Name of the process; the key in the module's process map
    pub name: IdString,
    /// Free-form attributes
    pub attributes: BTreeMap<IdString, Const>,
    /// Root of the decision tree
    pub root_case: CaseRule,
    /// Synchronization rules
    pub syncs: Vec<SyncRule>,
}

impl CaseRule {
    fn rewrite_sigspecs<F: FnMut(&mut SigSpec)>(&mut self, f: &mut F) {
        for sig in &mut self.compare {
            f(sig);
        }
        for (lhs, rhs) in &mut self.actions {
            f(lhs);
            f(rhs);
        }
        for switch in &mut self.switches {
            f(&mut switch.signal);
            for case in &mut switch.cases {
                case.rewrite_sigspecs(f);
            }
        }
    }
}

impl Process {
    /// Apply a rewrite function to every signal in the process
    pub fn rewrite_sigspecs<F: FnMut(&mut SigSpec)>(&mut self, mut f: F) {
        self.root_case.rewrite_sigspecs(&mut f);
        for sync in &mut self.syncs {
            f(&mut sync.signal);
            for (lhs, rhs) in &mut sync.actions {
                f(lhs);
                f(rhs);
            }
        }
    }

    /// Canonicalize every signal in the process
    pub fn optimize(&mut self) {
        self.rewrite_sigspecs(|sig| sig.optimize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtlil::id::escape_id;
    use crate::rtlil::sigspec::SigSpec;

    #[test]
    fn test_clone_is_deep() {
        let mut proc = Process { name: escape_id("p"), ..Process::default() };
        let mut switch = SwitchRule { signal: SigSpec::from_int(1, 2), ..SwitchRule::default() };
        switch.cases.push(CaseRule {
            compare: vec![SigSpec::from_int(0, 2)],
            actions: vec![(SigSpec::from_int(0, 1), SigSpec::from_int(1, 1))],
            switches: Vec::new(),
        });
        proc.root_case.switches.push(switch);
        proc.syncs.push(SyncRule {
            ty: SyncType::Posedge,
            signal: SigSpec::from_int(0, 1),
            actions: Vec::new(),
        });

        let mut copy = proc.clone();
        copy.root_case.switches[0].cases[0].compare[0] = SigSpec::from_int(3, 2);
        assert_eq!(proc.root_case.switches[0].cases[0].compare[0], SigSpec::from_int(0, 2));
        assert_eq!(copy.syncs.len(), 1);
    }

    #[test]
    fn test_rewrite_visits_all() {
        let mut proc = Process { name: escape_id("p"), ..Process::default() };
        proc.root_case.actions.push((SigSpec::from_int(0, 1), SigSpec::from_int(1, 1)));
        proc.syncs.push(SyncRule {
            ty: SyncType::Always,
            signal: SigSpec::from_int(0, 1),
            actions: vec![(SigSpec::from_int(0, 1), SigSpec::from_int(1, 1))],
        });
        let mut count = 0;
        proc.rewrite_sigspecs(|_| count += 1);
        assert_eq!(count, 5);
    }
}
