//! And-Inverter Graph arena used by the abstraction engine.
//!
//! Objects live in a flat vector indexed by id; all cross-references are
//! indices. Id 0 is the constant-0 object. Combinational inputs are primary
//! inputs followed by register outputs; combinational outputs are primary
//! outputs followed by register inputs, so the register bijection is ordinal
//! arithmetic over the CI/CO lists.

#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::needless_range_loop)]

use hashbrown::HashMap;

pub mod cex;
pub mod dup;
pub mod tersim;

/// An AIG literal: a node id with a complement bit in the low position.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct AigLit(u32);

impl AigLit {
    /// The constant-false literal (uncomplemented constant-0 object).
    pub const FALSE: Self = Self(0);
    /// The constant-true literal.
    pub const TRUE: Self = Self(1);

    pub fn new(id: usize, complement: bool) -> Self {
        Self((id as u32) << 1 | complement as u32)
    }

    pub const fn id(self) -> usize {
        (self.0 >> 1) as usize
    }

    pub const fn is_complement(self) -> bool {
        self.0 & 1 != 0
    }

    /// The same node with the opposite polarity.
    pub const fn not(self) -> Self {
        Self(self.0 ^ 1)
    }

    pub const fn xor_complement(self, complement: bool) -> Self {
        Self(self.0 ^ complement as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum AigNode {
    Const0,
    /// Combinational input; `cio` is its position among CIs.
    Ci { cio: u32 },
    And { fanin0: AigLit, fanin1: AigLit },
    /// Combinational output; `cio` is its position among COs.
    Co { fanin0: AigLit, cio: u32 },
}

/// A sequential AIG.
///
/// Nodes are appended fanins-first, so ascending id order is a topological
/// order of the combinational logic. Registers close the only cycles, and
/// those are broken in time by the frame numbering of the unrolling.
pub struct Aig {
    nodes: Vec<AigNode>,
    cis: Vec<u32>,
    cos: Vec<u32>,
    reg_count: usize,
    /// Epoch-based traversal marking: an object is "current" iff its entry
    /// equals `trav_id`.
    trav_ids: Vec<u32>,
    trav_id: u32,
    /// Structural hashing of AND nodes, keyed by the ordered fanin literals.
    strash: HashMap<(u32, u32), u32>,
    fanout: Option<FanoutIndex>,
}

impl Aig {
    pub fn new() -> Self {
        Self {
            nodes: vec![AigNode::Const0],
            cis: Vec::new(),
            cos: Vec::new(),
            reg_count: 0,
            trav_ids: vec![0],
            trav_id: 0,
            strash: HashMap::new(),
            fanout: None,
        }
    }

    pub fn object_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn ci_count(&self) -> usize {
        self.cis.len()
    }

    pub fn co_count(&self) -> usize {
        self.cos.len()
    }

    pub fn reg_count(&self) -> usize {
        self.reg_count
    }

    pub fn pi_count(&self) -> usize {
        self.cis.len() - self.reg_count
    }

    pub fn po_count(&self) -> usize {
        self.cos.len() - self.reg_count
    }

    pub fn and_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, AigNode::And { .. }))
            .count()
    }

    pub fn ci(&self, index: usize) -> usize {
        self.cis[index] as usize
    }

    pub fn co(&self, index: usize) -> usize {
        self.cos[index] as usize
    }

    pub fn pi(&self, index: usize) -> usize {
        assert!(index < self.pi_count());
        self.cis[index] as usize
    }

    pub fn po(&self, index: usize) -> usize {
        assert!(index < self.po_count());
        self.cos[index] as usize
    }

    /// Register output (flop state) `index`.
    pub fn ro(&self, index: usize) -> usize {
        assert!(index < self.reg_count);
        self.cis[self.pi_count() + index] as usize
    }

    /// Register input (flop next-state) `index`.
    pub fn ri(&self, index: usize) -> usize {
        assert!(index < self.reg_count);
        self.cos[self.po_count() + index] as usize
    }

    pub fn is_const0(&self, id: usize) -> bool {
        id == 0
    }

    pub fn is_ci(&self, id: usize) -> bool {
        matches!(self.nodes[id], AigNode::Ci { .. })
    }

    pub fn is_co(&self, id: usize) -> bool {
        matches!(self.nodes[id], AigNode::Co { .. })
    }

    pub fn is_and(&self, id: usize) -> bool {
        matches!(self.nodes[id], AigNode::And { .. })
    }

    pub fn is_pi(&self, id: usize) -> bool {
        match self.nodes[id] {
            AigNode::Ci { cio } => (cio as usize) < self.pi_count(),
            _ => false,
        }
    }

    pub fn is_ro(&self, id: usize) -> bool {
        match self.nodes[id] {
            AigNode::Ci { cio } => (cio as usize) >= self.pi_count(),
            _ => false,
        }
    }

    pub fn is_po(&self, id: usize) -> bool {
        match self.nodes[id] {
            AigNode::Co { cio, .. } => (cio as usize) < self.po_count(),
            _ => false,
        }
    }

    pub fn is_ri(&self, id: usize) -> bool {
        match self.nodes[id] {
            AigNode::Co { cio, .. } => (cio as usize) >= self.po_count(),
            _ => false,
        }
    }

    /// Position of a CI among CIs, or of a CO among COs.
    pub fn cio_index(&self, id: usize) -> usize {
        match self.nodes[id] {
            AigNode::Ci { cio } | AigNode::Co { cio, .. } => cio as usize,
            _ => panic!("object {id} is not a CI or CO"),
        }
    }

    /// First fanin of an AND or CO node.
    pub fn fanin0(&self, id: usize) -> AigLit {
        match self.nodes[id] {
            AigNode::And { fanin0, .. } | AigNode::Co { fanin0, .. } => fanin0,
            _ => panic!("object {id} has no fanin"),
        }
    }

    /// Second fanin of an AND node.
    pub fn fanin1(&self, id: usize) -> AigLit {
        match self.nodes[id] {
            AigNode::And { fanin1, .. } => fanin1,
            _ => panic!("object {id} is not an AND"),
        }
    }

    /// The register input feeding the given register output.
    pub fn ro_to_ri(&self, id: usize) -> usize {
        assert!(self.is_ro(id));
        let reg = self.cio_index(id) - self.pi_count();
        self.cos[self.po_count() + reg] as usize
    }

    /// The register output fed by the given register input.
    pub fn ri_to_ro(&self, id: usize) -> usize {
        assert!(self.is_ri(id));
        let reg = self.cio_index(id) - self.po_count();
        self.cis[self.pi_count() + reg] as usize
    }

    pub fn po_fanin(&self, po_index: usize) -> AigLit {
        self.fanin0(self.po(po_index))
    }

    // Traversal ids.

    pub fn increment_trav_id(&mut self) {
        self.trav_id += 1;
    }

    pub fn set_trav_id_current(&mut self, id: usize) {
        self.trav_ids[id] = self.trav_id;
    }

    pub fn is_trav_id_current(&self, id: usize) -> bool {
        self.trav_ids[id] == self.trav_id
    }

    // Construction.

    pub fn add_ci(&mut self) -> AigLit {
        let id = self.push(AigNode::Ci {
            cio: self.cis.len() as u32,
        });
        self.cis.push(id as u32);
        AigLit::new(id, false)
    }

    pub fn add_co(&mut self, fanin: AigLit) -> usize {
        assert!(fanin.id() < self.nodes.len());
        let id = self.push(AigNode::Co {
            fanin0: fanin,
            cio: self.cos.len() as u32,
        });
        self.cos.push(id as u32);
        id
    }

    /// Appends an AND with constant folding and structural hashing. This is
    /// where equivalent nodes get merged at construction time.
    pub fn add_and(&mut self, a: AigLit, b: AigLit) -> AigLit {
        if a == b {
            return a;
        }
        if a == b.not() || a == AigLit::FALSE || b == AigLit::FALSE {
            return AigLit::FALSE;
        }
        if a == AigLit::TRUE {
            return b;
        }
        if b == AigLit::TRUE {
            return a;
        }
        let (lo, hi) = if a.index() < b.index() { (a, b) } else { (b, a) };
        if let Some(&id) = self.strash.get(&(lo.0, hi.0)) {
            return AigLit::new(id as usize, false);
        }
        let lit = self.add_and_unhashed(lo, hi);
        self.strash.insert((lo.0, hi.0), lit.id() as u32);
        lit
    }

    /// Appends an AND node without hashing or folding. Duplication passes use
    /// this to keep cones decoupled even when structurally equal.
    pub fn add_and_unhashed(&mut self, fanin0: AigLit, fanin1: AigLit) -> AigLit {
        assert!(fanin0.id() < self.nodes.len() && fanin1.id() < self.nodes.len());
        let id = self.push(AigNode::And { fanin0, fanin1 });
        AigLit::new(id, false)
    }

    /// Declares the last `reg_count` CIs to be register outputs and the last
    /// `reg_count` COs to be register inputs.
    pub fn set_reg_count(&mut self, reg_count: usize) {
        assert!(reg_count <= self.cis.len() && reg_count <= self.cos.len());
        self.reg_count = reg_count;
    }

    fn push(&mut self, node: AigNode) -> usize {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.trav_ids.push(0);
        id
    }

    // Static fanout index.

    /// Builds the static fanout index. Required before any `fanouts` query.
    pub fn build_fanout(&mut self) {
        let n = self.nodes.len();
        let mut counts = vec![0u32; n];
        for node in &self.nodes {
            match *node {
                AigNode::And { fanin0, fanin1 } => {
                    counts[fanin0.id()] += 1;
                    counts[fanin1.id()] += 1;
                }
                AigNode::Co { fanin0, .. } => counts[fanin0.id()] += 1,
                _ => {}
            }
        }
        let mut offsets = vec![0u32; n + 1];
        for i in 0..n {
            offsets[i + 1] = offsets[i] + counts[i];
        }
        let mut data = vec![0u32; offsets[n] as usize];
        let mut next = offsets.clone();
        for (id, node) in self.nodes.iter().enumerate() {
            let mut record = |fanin: AigLit| {
                data[next[fanin.id()] as usize] = id as u32;
                next[fanin.id()] += 1;
            };
            match *node {
                AigNode::And { fanin0, fanin1 } => {
                    record(fanin0);
                    record(fanin1);
                }
                AigNode::Co { fanin0, .. } => record(fanin0),
                _ => {}
            }
        }
        self.fanout = Some(FanoutIndex { offsets, data });
    }

    pub fn has_fanout(&self) -> bool {
        self.fanout.is_some()
    }

    /// Fanout object ids of `id`, in ascending order.
    pub fn fanouts(&self, id: usize) -> &[u32] {
        let index = self
            .fanout
            .as_ref()
            .expect("static fanout index not built");
        &index.data[index.offsets[id] as usize..index.offsets[id + 1] as usize]
    }
}

/// Static fanout index in compressed sparse row form.
struct FanoutIndex {
    offsets: Vec<u32>,
    data: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-flop toggle: flop0 toggles every cycle, flop1 holds flop0's value.
    fn toggle_aig() -> Aig {
        let mut aig = Aig::new();
        let ro0 = aig.add_ci();
        let ro1 = aig.add_ci();
        let po = aig.add_and(ro0, ro1);
        aig.add_co(po);
        aig.add_co(ro0.not());
        aig.add_co(ro0);
        aig.set_reg_count(2);
        aig
    }

    #[test]
    fn test_kinds_and_bijection() {
        let aig = toggle_aig();
        assert_eq!(aig.pi_count(), 0);
        assert_eq!(aig.po_count(), 1);
        assert_eq!(aig.reg_count(), 2);
        let ro0 = aig.ro(0);
        let ro1 = aig.ro(1);
        assert!(aig.is_ro(ro0) && aig.is_ro(ro1));
        assert!(!aig.is_pi(ro0));
        assert_eq!(aig.ri_to_ro(aig.ro_to_ri(ro0)), ro0);
        assert_eq!(aig.ri_to_ro(aig.ro_to_ri(ro1)), ro1);
        assert!(aig.is_po(aig.po(0)));
        assert!(aig.is_ri(aig.ro_to_ri(ro0)));
    }

    #[test]
    fn test_and_folding_and_hashing() {
        let mut aig = Aig::new();
        let a = aig.add_ci();
        let b = aig.add_ci();
        assert_eq!(aig.add_and(a, AigLit::FALSE), AigLit::FALSE);
        assert_eq!(aig.add_and(AigLit::TRUE, b), b);
        assert_eq!(aig.add_and(a, a.not()), AigLit::FALSE);
        assert_eq!(aig.add_and(a, a), a);
        let ab = aig.add_and(a, b);
        let ba = aig.add_and(b, a);
        assert_eq!(ab, ba);
        let raw = aig.add_and_unhashed(a, b);
        assert_ne!(raw, ab);
    }

    #[test]
    fn test_trav_id_epochs() {
        let mut aig = toggle_aig();
        let id = aig.ro(0);
        aig.increment_trav_id();
        assert!(!aig.is_trav_id_current(id));
        aig.set_trav_id_current(id);
        assert!(aig.is_trav_id_current(id));
        aig.increment_trav_id();
        assert!(!aig.is_trav_id_current(id));
    }

    #[test]
    fn test_fanout_index() {
        let mut aig = toggle_aig();
        aig.build_fanout();
        let ro0 = aig.ro(0);
        let fanouts = aig.fanouts(ro0);
        // The AND node, the toggle RI, and the hold RI.
        assert_eq!(fanouts.len(), 3);
        assert!(fanouts.iter().all(|&f| {
            let f = f as usize;
            aig.is_and(f) || aig.is_ri(f)
        }));
        assert!(aig.fanouts(aig.po(0)).is_empty());
    }
}
