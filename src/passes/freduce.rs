//! Functional reduction: prove nets equivalent and merge their drivers
//!
//! Nodes are fingerprinted by simulating a pool of test vectors, clustered
//! by equal fingerprints, and each cluster is proved equivalent with the
//! SAT solver. Counterexamples from failed proofs feed back into the
//! vector pool. Proved clusters are rewired so a single topological root
//! drives every member.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::celltypes::CellTypes;
use crate::consteval::ConstEval;
use crate::pass::{extra_args, Pass, Scope};
use crate::rtlil::{Const, Design, IdString, Module, SigBit, SigSpec, State, Wire};
use crate::sat::SatGen;
use crate::sigtools::{SigMap, SigPool, SigSet};
use crate::Error;

const NUM_INITIAL_RANDOM_TEST_VECTORS: usize = 10;

struct FreduceWorker<'a> {
    module: &'a mut Module,
    try_mode: bool,
    sigmap: SigMap,
    satgen: SatGen,
    inputs: SigPool,
    nodes: SigPool,
    input_sigs: SigSpec,
    source_signals: SigSet<SigSpec>,
    test_vectors: Vec<Const>,
    node_to_data: BTreeMap<SigSpec, Const>,
    node_result: BTreeMap<SigSpec, SigSpec>,
    xorshift32_state: u32,
}

fn logic_cell_types() -> CellTypes<'static> {
    let mut ct = CellTypes::new();
    ct.setup_internals();
    ct.setup_stdcells();
    ct
}

impl<'a> FreduceWorker<'a> {
    fn new(module: &'a mut Module, try_mode: bool) -> FreduceWorker<'a> {
        let sigmap = SigMap::from_module(module);
        let mut worker = FreduceWorker {
            module,
            try_mode,
            sigmap,
            satgen: SatGen::new(),
            inputs: SigPool::new(),
            nodes: SigPool::new(),
            input_sigs: SigSpec::new(),
            source_signals: SigSet::new(),
            test_vectors: Vec::new(),
            node_to_data: BTreeMap::new(),
            node_result: BTreeMap::new(),
            xorshift32_state: 123456789,
        };
        worker.xorshift32();
        worker.xorshift32();
        worker.xorshift32();
        worker
    }

    fn xorshift32(&mut self) -> u32 {
        self.xorshift32_state ^= self.xorshift32_state << 13;
        self.xorshift32_state ^= self.xorshift32_state >> 17;
        self.xorshift32_state ^= self.xorshift32_state << 5;
        self.xorshift32_state
    }

    fn analysis_failed(&self, message: String) -> Result<bool, Error> {
        if self.try_mode {
            warn!("{message}");
            Ok(false)
        } else {
            Err(Error::Analysis(message))
        }
    }

    /// Simulate one test vector and append a bit to every fingerprint
    fn run_test(&mut self, test_vec: &Const) -> Result<bool, Error> {
        let module: &Module = self.module;
        let mut ce = ConstEval::new(module);
        ce.set(&self.input_sigs, test_vec);

        let node_bits: Vec<SigBit> = self.nodes.bits.iter().cloned().collect();
        for bit in node_bits {
            let node_sig = SigSpec::from_bits([bit]);
            let mut node_val = node_sig.clone();
            if !ce.eval(&mut node_val) {
                return self.analysis_failed(format!("evaluation of node {node_sig} failed"));
            }
            self.node_to_data
                .entry(node_sig)
                .or_default()
                .bits
                .push(node_val.as_const().bits[0]);
        }
        Ok(true)
    }

    /// SAT-prove two signals equal, feeding counterexamples back into the
    /// test vector pool
    fn check(&mut self, sig1: &SigSpec, sig2: &SigSpec) -> Result<bool, Error> {
        debug!("performing SAT proof: {sig1} == {sig2}");
        let vec1 = self.satgen.import_sigspec(&self.sigmap, sig1);
        let vec2 = self.satgen.import_sigspec(&self.sigmap, sig2);
        let model = self.satgen.import_sigspec(&self.sigmap, &self.input_sigs.clone());
        let ne = self.satgen.vec_ne(&vec1, &vec2);

        match self.satgen.solve(&[vec![ne]], &model) {
            Some(counterexample) => {
                let test_vec = Const::from_bits(
                    counterexample.iter().map(|&b| State::from(b)).collect(),
                );
                debug!("proof failed, counterexample {}", test_vec.as_string());
                self.test_vectors.push(test_vec.clone());
                self.run_test(&test_vec)
            }
            None => {
                debug!("proof succeeded");
                if !sig1.is_fully_const() {
                    self.node_result.entry(sig1.clone()).or_default().append(sig2);
                }
                if !sig2.is_fully_const() {
                    self.node_result.entry(sig2.clone()).or_default().append(sig1);
                }
                Ok(true)
            }
        }
    }

    /// Prove nodes with all-zero or all-one fingerprints constant
    fn analyze_const(&mut self) -> Result<bool, Error> {
        let candidates: Vec<(SigSpec, Const)> =
            self.node_to_data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (node, data) in candidates {
            if self.node_result.contains_key(&node) {
                continue;
            }
            if data == Const::fill(State::S0, data.width())
                && !self.check(&node, &SigSpec::from_state(State::S0, 1))?
            {
                return Ok(false);
            }
            if data == Const::fill(State::S1, data.width())
                && !self.check(&node, &SigSpec::from_state(State::S1, 1))?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Prove pairwise equivalence within every fingerprint cluster
    fn analyze_alias(&mut self) -> Result<bool, Error> {
        'restart: loop {
            let mut reverse_map: BTreeMap<Const, SigSpec> = BTreeMap::new();
            for (node, data) in &self.node_to_data {
                if self.node_result.get(node).is_some_and(|r| r.is_fully_const()) {
                    continue;
                }
                reverse_map.entry(data.clone()).or_default().append(node);
            }

            for group in reverse_map.into_values() {
                if group.width() <= 1 {
                    continue;
                }
                let members: Vec<SigSpec> =
                    group.bits().into_iter().map(|bit| SigSpec::from_bits([bit])).collect();
                for i in 0..members.len() {
                    for j in i + 1..members.len() {
                        if self.node_result.contains_key(&members[i])
                            && self.node_result.contains_key(&members[j])
                        {
                            continue;
                        }
                        // A counterexample may have split the cluster.
                        if self.node_to_data[&members[i]] != self.node_to_data[&members[j]] {
                            continue 'restart;
                        }
                        if !self.check(&members[i], &members[j])? {
                            return Ok(false);
                        }
                    }
                }
            }
            return Ok(true);
        }
    }

    fn toproot_helper(
        &self,
        cursor: &SigSpec,
        mut stoplist: SigSpec,
        donelist: &mut SigSpec,
    ) -> bool {
        if stoplist.extract_pattern(cursor, None).width() != 0 {
            return false;
        }
        if donelist.extract_pattern(cursor, None).width() != 0 {
            return true;
        }
        stoplist.append(cursor);
        for next in self.source_signals.find(cursor) {
            if !self.toproot_helper(&next, stoplist.clone(), donelist) {
                return false;
            }
        }
        donelist.append(cursor);
        true
    }

    /// One member of `sig` with no fan-in path to the other members, or an
    /// empty signal if the group is not a DAG
    fn toproot(&self, sig: &SigSpec) -> SigSpec {
        let mut sig = sig.clone();
        sig.expand();
        for chunk in sig.chunks() {
            let cursor = SigSpec::from(chunk.clone());
            let mut stoplist = sig.clone();
            stoplist.remove_pattern(&cursor);
            let mut donelist = SigSpec::new();
            if self.toproot_helper(&cursor, stoplist, &mut donelist) {
                return cursor;
            }
        }
        SigSpec::new()
    }

    /// Redirect the drivers of `rest` to fresh dangling wires and connect
    /// every member to the root
    fn update_design_for_group(&mut self, root: &SigSpec, rest: &SigSpec) {
        let ct = logic_cell_types();
        let mut unlink = SigPool::new();
        unlink.add(rest);

        let cell_names: Vec<IdString> = self.module.cells.keys().cloned().collect();
        for name in cell_names {
            let cell = &self.module.cells[&name];
            if !ct.cell_known(&cell.ty) {
                continue;
            }
            let out_ports: Vec<(IdString, SigSpec)> = cell
                .connections
                .iter()
                .filter(|(port, _)| ct.cell_output(&cell.ty, port))
                .map(|(port, sig)| (port.clone(), sig.clone()))
                .collect();

            for (port, sig) in out_ports {
                let mapped = self.sigmap.map(&sig);
                let mut bits = mapped.bits();
                let mut fresh_wires: Vec<Wire> = Vec::new();
                for bit in bits.iter_mut() {
                    let bit_sig = SigSpec::from_bits([bit.clone()]);
                    if matches!(bit, SigBit::Wire { .. }) && unlink.check_any(&bit_sig) {
                        let wire = Wire::new(IdString::fresh(), 1);
                        *bit = SigBit::Wire { name: wire.name.clone(), offset: 0 };
                        fresh_wires.push(wire);
                    }
                }
                if !fresh_wires.is_empty() {
                    for wire in fresh_wires {
                        self.module.add_wire(wire);
                    }
                    let new_sig = SigSpec::from_bits(bits);
                    self.module
                        .cells
                        .get_mut(&name)
                        .unwrap()
                        .connections
                        .insert(port, new_sig);
                }
            }
        }

        for bit in rest.bits() {
            let bit_sig = SigSpec::from_bits([bit.clone()]);
            if matches!(bit, SigBit::Wire { .. }) && !root.is_fully_const() {
                self.source_signals.erase(&bit_sig);
                self.source_signals.insert(&bit_sig, root.clone());
            }
            self.module.connections.push((bit_sig, root.clone()));
        }
    }

    /// Pick a topological root for every proved cluster and rewire
    fn analyze_groups(&mut self) -> Result<(), Error> {
        let mut to_group_major = SigMap::new();
        for (node, partners) in self.node_result.clone() {
            for bit in partners.bits() {
                to_group_major.add(&node, &SigSpec::from_bits([bit]));
            }
        }

        let mut major_to_rest: BTreeMap<SigSpec, SigSpec> = BTreeMap::new();
        for node in self.node_result.keys() {
            major_to_rest.entry(to_group_major.map(node)).or_default().append(node);
        }

        for (major, members) in major_to_rest {
            let (mut root, mut rest) = if major.is_fully_const() {
                (major, members)
            } else {
                let root = self.toproot(&members);
                if root.is_empty() {
                    self.analysis_failed(format!(
                        "operating on non-DAG input: failed to find topological root for {members}"
                    ))?;
                    return Ok(());
                }
                let mut rest = members;
                rest.remove_pattern(&root);
                (root, rest)
            };

            root.optimize();
            rest.sort_and_unify();
            info!("found group: {root} -> {rest}");
            self.update_design_for_group(&root, &rest);
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), Error> {
        info!("functionally reducing module {}", self.module.name);

        // Classify nets into inputs and nodes, index fan-in, and feed
        // every known cell into the solver.
        let ct = logic_cell_types();
        let mut import_failure = None;
        for cell in self.module.cells.values() {
            if !ct.cell_known(&cell.ty) {
                continue;
            }
            let mut cell_inputs = SigSpec::new();
            let mut cell_outputs = SigSpec::new();
            for (port, sig) in &cell.connections {
                let mapped = self.sigmap.map(sig);
                if ct.cell_output(&cell.ty, port) {
                    self.nodes.add(&mapped);
                    cell_outputs.append(&mapped);
                } else {
                    self.inputs.add(&mapped);
                    cell_inputs.append(&mapped);
                }
            }
            cell_inputs.sort_and_unify();
            cell_outputs.sort_and_unify();
            for bit in cell_inputs.bits() {
                if matches!(bit, SigBit::Wire { .. }) {
                    self.source_signals.insert(&cell_outputs, SigSpec::from_bits([bit]));
                }
            }
            if !self.satgen.import_cell(&self.sigmap, cell) {
                import_failure =
                    Some(format!("failed to import cell {} ({}) into the solver", cell.name, cell.ty));
                break;
            }
        }
        if let Some(message) = import_failure {
            self.analysis_failed(message)?;
            return Ok(());
        }

        self.inputs.del_pool(&self.nodes.clone());
        self.nodes.add_pool(&self.inputs.clone());
        info!("found {} nodes ({} inputs)", self.nodes.len(), self.inputs.len());

        // Seed the test vector pool: all-zeros, all-ones, and a batch of
        // vectors from the deterministic generator.
        self.input_sigs = self.inputs.export_all();
        let width = self.input_sigs.width();
        self.test_vectors.push(Const::fill(State::S0, width));
        self.test_vectors.push(Const::fill(State::S1, width));
        for _ in 0..NUM_INITIAL_RANDOM_TEST_VECTORS {
            let bits = (0..width).map(|_| State::from(self.xorshift32() % 2 != 0)).collect();
            self.test_vectors.push(Const::from_bits(bits));
        }

        for test_vec in self.test_vectors.clone() {
            if !self.run_test(&test_vec)? {
                return Ok(());
            }
        }

        if !self.analyze_const()? {
            return Ok(());
        }
        if !self.analyze_alias()? {
            return Ok(());
        }
        self.analyze_groups()
    }
}

/// Merge functionally equivalent nodes, proving equivalence with SAT
pub struct FreducePass;

impl Pass for FreducePass {
    fn name(&self) -> &'static str {
        "freduce"
    }

    fn help(&self) -> &'static str {
        "freduce [-try] [selection]: perform functional reduction"
    }

    fn execute(&self, args: &[String], design: &mut Design) -> Result<(), Error> {
        let mut try_mode = false;
        let mut argidx = 1;
        while argidx < args.len() {
            match args[argidx].as_str() {
                "-try" => {
                    try_mode = true;
                    argidx += 1;
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
            let module = design.modules.get_mut(&mod_name).unwrap();
            FreduceWorker::new(module, try_mode).run()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::call;
    use crate::rtlil::{escape_id, Cell};

    fn inv(module: &mut Module, name: &str, a: &SigSpec, y: &SigSpec) {
        let mut cell = Cell::new(escape_id(name), IdString::from("$_INV_"));
        cell.connections.insert(IdString::from("\\A"), a.clone());
        cell.connections.insert(IdString::from("\\Y"), y.clone());
        module.add_cell(cell);
    }

    #[test]
    fn test_inverter_chain_reduced() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
        let w1 = SigSpec::from_wire(module.new_wire(escape_id("w1"), 1));
        let w2 = SigSpec::from_wire(module.new_wire(escape_id("w2"), 1));
        let y = SigSpec::from_wire(module.new_wire(escape_id("y"), 1));
        inv(&mut module, "i1", &a, &w1);
        inv(&mut module, "i2", &w1, &w2);
        inv(&mut module, "i3", &w2, &y);
        design.add_module(module);

        call(&mut design, "freduce").unwrap();
        let module = &design.modules[&escape_id("top")];
        module.check();

        // y is proved equivalent to w1 (= !a) and connected to it; the
        // inner chain no longer drives y directly.
        assert!(module
            .connections
            .iter()
            .any(|(lhs, rhs)| (*lhs == y && *rhs == w1) || (*lhs == w1 && *rhs == y)));
        // w2 is proved equivalent to the input a.
        assert!(module
            .connections
            .iter()
            .any(|(lhs, rhs)| (*lhs == w2 && *rhs == a) || (*lhs == a && *rhs == w2)));
        // The displaced drivers now feed fresh dangling wires.
        let i3_out = &module.cells[&escape_id("i3")].connections[&IdString::from("\\Y")];
        assert_ne!(*i3_out, y);
    }

    #[test]
    fn test_constant_node_detected() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
        let n = SigSpec::from_wire(module.new_wire(escape_id("n"), 1));
        let y = SigSpec::from_wire(module.new_wire(escape_id("y"), 1));
        inv(&mut module, "i1", &a, &n);
        // y = a & !a == 0
        let mut cell = Cell::new(escape_id("g"), IdString::from("$_AND_"));
        cell.connections.insert(IdString::from("\\A"), a.clone());
        cell.connections.insert(IdString::from("\\B"), n.clone());
        cell.connections.insert(IdString::from("\\Y"), y.clone());
        module.add_cell(cell);
        design.add_module(module);

        call(&mut design, "freduce").unwrap();
        let module = &design.modules[&escape_id("top")];
        assert!(module
            .connections
            .iter()
            .any(|(lhs, rhs)| *lhs == y && *rhs == SigSpec::from_state(State::S0, 1)));
    }

    #[test]
    fn test_loop_fails_without_try() {
        let mut design = Design::new();
        let mut module = Module::new(escape_id("top"));
        let a = SigSpec::from_wire(module.new_wire(escape_id("a"), 1));
        let b = SigSpec::from_wire(module.new_wire(escape_id("b"), 1));
        inv(&mut module, "i1", &a, &b);
        inv(&mut module, "i2", &b, &a);
        design.add_module(module);

        assert!(call(&mut design, "freduce").is_err());
        assert!(call(&mut design, "freduce -try").is_ok());
    }
}
