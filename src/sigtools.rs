//! Signal indexing helpers shared by the passes
//!
//! [`SigMap`] canonicalizes signals that are connected together,
//! [`SigPool`] is a set of single bits, and [`SigSet`] indexes values by
//! the bits of a signal.

use std::collections::{BTreeMap, BTreeSet};

use crate::rtlil::{Module, SigBit, SigSpec};

/// Union-find over single bits, built from a module's connections
///
/// Every bit belongs to an equivalence class; `apply` rewrites each bit of
/// a signal to the representative of its class. The representative is the
/// smallest member under the [`SigBit`] order, so constants are preferred
/// over wires and smaller wire names over larger ones, independent of the
/// order connections were added in.
#[derive(Clone, Default, Debug)]
pub struct SigMap {
    parent: BTreeMap<SigBit, SigBit>,
}

impl SigMap {
    /// An empty map where every bit is its own representative
    pub fn new() -> SigMap {
        SigMap::default()
    }

    /// A map built from the connections of a module
    pub fn from_module(module: &Module) -> SigMap {
        let mut map = SigMap::new();
        map.set(module);
        map
    }

    /// Rebuild the map from the connections of a module
    pub fn set(&mut self, module: &Module) {
        self.parent.clear();
        for (lhs, rhs) in &module.connections {
            self.add(lhs, rhs);
        }
    }

    /// Drop all equivalences
    pub fn clear(&mut self) {
        self.parent.clear();
    }

    fn find(&self, bit: &SigBit) -> SigBit {
        let mut cursor = bit.clone();
        while let Some(next) = self.parent.get(&cursor) {
            cursor = next.clone();
        }
        cursor
    }

    /// Union the bits of two signals pairwise
    pub fn add(&mut self, a: &SigSpec, b: &SigSpec) {
        for (abit, bbit) in a.bits().into_iter().zip(b.bits()) {
            let ra = self.find(&abit);
            let rb = self.find(&bbit);
            if ra == rb {
                continue;
            }
            let (rep, other) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent.insert(other, rep);
        }
    }

    /// Rewrite each bit of a signal to its representative
    pub fn apply(&self, sig: &mut SigSpec) {
        *sig = self.map(sig);
    }

    /// The canonical form of a signal
    pub fn map(&self, sig: &SigSpec) -> SigSpec {
        SigSpec::from_bits(sig.bits().into_iter().map(|bit| self.find(&bit)))
    }
}

/// A set of single wire bits
///
/// Constant bits are ignored on insert.
#[derive(Clone, Default, Debug)]
pub struct SigPool {
    /// The bits in the pool
    pub bits: BTreeSet<SigBit>,
}

impl SigPool {
    /// An empty pool
    pub fn new() -> SigPool {
        SigPool::default()
    }

    /// Insert all wire bits of a signal
    pub fn add(&mut self, sig: &SigSpec) {
        self.bits.extend(sig.bits().into_iter().filter(|b| !b.is_const()));
    }

    /// Insert all bits of another pool
    pub fn add_pool(&mut self, other: &SigPool) {
        self.bits.extend(other.bits.iter().cloned());
    }

    /// Remove all bits of a signal
    pub fn del(&mut self, sig: &SigSpec) {
        for bit in sig.bits() {
            self.bits.remove(&bit);
        }
    }

    /// Remove all bits of another pool
    pub fn del_pool(&mut self, other: &SigPool) {
        for bit in &other.bits {
            self.bits.remove(bit);
        }
    }

    /// Returns true if any wire bit of the signal is in the pool
    pub fn check_any(&self, sig: &SigSpec) -> bool {
        sig.bits().iter().any(|b| self.bits.contains(b))
    }

    /// Returns true if every wire bit of the signal is in the pool
    pub fn check_all(&self, sig: &SigSpec) -> bool {
        sig.bits().iter().filter(|b| !b.is_const()).all(|b| self.bits.contains(b))
    }

    /// All bits of the pool as one sorted signal
    pub fn export_all(&self) -> SigSpec {
        SigSpec::from_bits(self.bits.iter().cloned())
    }

    /// Number of bits in the pool
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns true if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

/// A multimap from single bits to values, used for fan-in/fan-out indexes
#[derive(Clone, Debug)]
pub struct SigSet<T: Ord> {
    map: BTreeMap<SigBit, BTreeSet<T>>,
}

impl<T: Ord + Clone> SigSet<T> {
    /// An empty multimap
    pub fn new() -> SigSet<T> {
        SigSet { map: BTreeMap::new() }
    }

    /// Associate a value with every bit of a signal
    pub fn insert(&mut self, sig: &SigSpec, value: T) {
        for bit in sig.bits() {
            self.map.entry(bit).or_default().insert(value.clone());
        }
    }

    /// Drop all associations of every bit of a signal
    pub fn erase(&mut self, sig: &SigSpec) {
        for bit in sig.bits() {
            self.map.remove(&bit);
        }
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// All values associated with any bit of a signal
    pub fn find(&self, sig: &SigSpec) -> BTreeSet<T> {
        let mut ret = BTreeSet::new();
        for bit in sig.bits() {
            if let Some(values) = self.map.get(&bit) {
                ret.extend(values.iter().cloned());
            }
        }
        ret
    }

    /// Returns true if any bit of the signal has an associated value
    pub fn has(&self, sig: &SigSpec) -> bool {
        sig.bits().iter().any(|b| self.map.get(b).is_some_and(|s| !s.is_empty()))
    }
}

impl<T: Ord + Clone> Default for SigSet<T> {
    fn default() -> SigSet<T> {
        SigSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtlil::{escape_id, Module, SigSpec, State};

    fn module_with_chain() -> Module {
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 2).clone();
        let b = module.new_wire(escape_id("b"), 2).clone();
        let c = module.new_wire(escape_id("c"), 2).clone();
        module.connections.push((SigSpec::from_wire(&b), SigSpec::from_wire(&a)));
        module.connections.push((SigSpec::from_wire(&c), SigSpec::from_wire(&b)));
        module
    }

    #[test]
    fn test_sigmap_canonicalizes_connections() {
        let module = module_with_chain();
        let sigmap = SigMap::from_module(&module);
        for (lhs, rhs) in &module.connections {
            assert_eq!(sigmap.map(lhs), sigmap.map(rhs));
        }
        // All three wires collapse onto the lexicographically smallest.
        let c = SigSpec::from_wire(&module.wires[&escape_id("c")]);
        let a = SigSpec::from_wire(&module.wires[&escape_id("a")]);
        assert_eq!(sigmap.map(&c), a);
    }

    #[test]
    fn test_sigmap_prefers_constants() {
        let mut module = Module::new(escape_id("top"));
        let a = module.new_wire(escape_id("a"), 1).clone();
        module.connections.push((SigSpec::from_wire(&a), SigSpec::from_state(State::S1, 1)));
        let sigmap = SigMap::from_module(&module);
        assert_eq!(sigmap.map(&SigSpec::from_wire(&a)), SigSpec::from_state(State::S1, 1));
    }

    #[test]
    fn test_sigmap_order_independent() {
        let module = module_with_chain();
        let mut reversed = SigMap::new();
        for (lhs, rhs) in module.connections.iter().rev() {
            reversed.add(lhs, rhs);
        }
        let forward = SigMap::from_module(&module);
        let c = SigSpec::from_wire(&module.wires[&escape_id("c")]);
        assert_eq!(forward.map(&c), reversed.map(&c));
    }

    #[test]
    fn test_sigpool() {
        let module = module_with_chain();
        let a = SigSpec::from_wire(&module.wires[&escape_id("a")]);
        let b = SigSpec::from_wire(&module.wires[&escape_id("b")]);
        let mut pool = SigPool::new();
        pool.add(&a);
        assert_eq!(pool.len(), 2);
        assert!(pool.check_any(&a));
        assert!(pool.check_all(&a));
        assert!(!pool.check_any(&b));
        let mut ab = a.clone();
        ab.append(&b);
        assert!(pool.check_any(&ab));
        assert!(!pool.check_all(&ab));
        assert_eq!(pool.export_all(), a);
        pool.del(&a);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_sigset() {
        let module = module_with_chain();
        let a = SigSpec::from_wire(&module.wires[&escape_id("a")]);
        let b = SigSpec::from_wire(&module.wires[&escape_id("b")]);
        let mut set: SigSet<u32> = SigSet::new();
        set.insert(&a, 1);
        set.insert(&a.extract(0, 1), 2);
        assert_eq!(set.find(&a), BTreeSet::from([1, 2]));
        assert_eq!(set.find(&a.extract(1, 1)), BTreeSet::from([1]));
        assert!(set.has(&a));
        assert!(!set.has(&b));
        set.erase(&a);
        assert!(!set.has(&a));
    }
}
