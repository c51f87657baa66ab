//! Abstraction-driven AIG duplication.
//!
//! `dup_mapped` copies an AIG through a LUT mapping, decoupling each mapped
//! cone into fresh nodes and recording the source id of every new object.
//! `dup_abs_gates` materializes the abstracted AIG implied by a gate-class
//! vector, turning every frontier fanin into a fresh pseudo-primary input.

use anyhow::{bail, ensure, Result};

use crate::cex::Cex;
use crate::{Aig, AigLit};

/// A 4-feasible LUT mapping: for some AND nodes (the roots), the set of leaf
/// objects whose values the LUT reads. Leaves are CIs, the constant, or other
/// roots.
#[derive(Clone, Debug, Default)]
pub struct LutMapping {
    cuts: Vec<Vec<u32>>,
}

impl LutMapping {
    pub fn new(object_count: usize) -> Self {
        Self {
            cuts: vec![Vec::new(); object_count],
        }
    }

    pub fn set_cut(&mut self, root: usize, leaves: Vec<u32>) {
        assert!(!leaves.is_empty() && leaves.len() <= 4);
        self.cuts[root] = leaves;
    }

    pub fn is_root(&self, id: usize) -> bool {
        id < self.cuts.len() && !self.cuts[id].is_empty()
    }

    pub fn leaves(&self, root: usize) -> &[u32] {
        &self.cuts[root]
    }
}

/// Result of `dup_mapped`: the rebuilt AIG plus, for every new object, the id
/// of the source object it was copied from, and the forward map from source
/// objects to new literals (roots and CI/CO only).
pub struct MappedAig {
    pub aig: Aig,
    pub lut_configs: Vec<u32>,
    pub obj_map: Vec<Option<AigLit>>,
}

/// Copies `aig` while decoupling nodes duplicated in the mapping: each LUT
/// root becomes the output of a freshly rebuilt cone, CI/CO objects are
/// rebuilt 1-to-1, and non-root AND nodes only exist inside the cones that
/// use them. The original AIG is untouched.
pub fn dup_mapped(aig: &Aig, mapping: &LutMapping) -> Result<MappedAig> {
    let n = aig.object_count();
    // Validate the mapping before touching anything.
    for root in 1..n {
        if !mapping.is_root(root) {
            continue;
        }
        ensure!(
            aig.is_and(root),
            "invalid LUT mapping: root {root} is not an AND node"
        );
        for &leaf in mapping.leaves(root) {
            let leaf = leaf as usize;
            ensure!(leaf < n, "invalid LUT mapping: leaf {leaf} does not exist");
            ensure!(
                aig.is_const0(leaf) || aig.is_ci(leaf) || mapping.is_root(leaf),
                "invalid LUT mapping: leaf {leaf} of root {root} is not a root or CI"
            );
        }
    }

    let mut new = Aig::new();
    let mut obj_map: Vec<Option<AigLit>> = vec![None; n];
    obj_map[0] = Some(AigLit::FALSE);
    let mut lut_configs = vec![0u32];

    // Per-cone scratch, epoch-keyed so it resets in O(1) per root.
    let mut value: Vec<AigLit> = vec![AigLit::FALSE; n];
    let mut value_epoch = vec![0u32; n];
    let mut epoch = 0u32;

    for id in 1..n {
        if aig.is_ci(id) {
            obj_map[id] = Some(new.add_ci());
            lut_configs.push(id as u32);
        } else if aig.is_and(id) {
            if !mapping.is_root(id) {
                continue;
            }
            epoch += 1;
            for &leaf in mapping.leaves(id) {
                let leaf = leaf as usize;
                let lit = match obj_map[leaf] {
                    Some(lit) => lit,
                    None => bail!(
                        "invalid LUT mapping: leaf {leaf} of root {id} has no copy yet"
                    ),
                };
                value[leaf] = lit;
                value_epoch[leaf] = epoch;
            }
            let root_lit = dup_cone(
                aig,
                id,
                epoch,
                &mut value,
                &mut value_epoch,
                &mut new,
                &mut lut_configs,
            )?;
            obj_map[id] = Some(root_lit);
        } else if aig.is_co(id) {
            let fanin = aig.fanin0(id);
            let lit = match obj_map[fanin.id()] {
                Some(lit) => lit.xor_complement(fanin.is_complement()),
                None => bail!("invalid LUT mapping: CO {id} reads an unmapped node"),
            };
            let co_id = new.add_co(lit);
            obj_map[id] = Some(AigLit::new(co_id, false));
            lut_configs.push(id as u32);
        }
    }
    new.set_reg_count(aig.reg_count());
    assert_eq!(lut_configs.len(), new.object_count());
    Ok(MappedAig {
        aig: new,
        lut_configs,
        obj_map,
    })
}

/// Rebuilds the cone of `root` above the leaves marked in the current epoch.
/// Iterative post-order; every created node records its source id.
fn dup_cone(
    aig: &Aig,
    root: usize,
    epoch: u32,
    value: &mut Vec<AigLit>,
    value_epoch: &mut Vec<u32>,
    new: &mut Aig,
    lut_configs: &mut Vec<u32>,
) -> Result<AigLit> {
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if id == 0 || value_epoch[id] == epoch {
            continue;
        }
        if !aig.is_and(id) {
            bail!("invalid LUT mapping: cone of root {root} escapes through object {id}");
        }
        let f0 = aig.fanin0(id);
        let f1 = aig.fanin1(id);
        if expanded {
            let lit0 = cone_value(f0, value, value_epoch, epoch);
            let lit1 = cone_value(f1, value, value_epoch, epoch);
            let lit = new.add_and_unhashed(lit0, lit1);
            lut_configs.push(id as u32);
            value[id] = lit;
            value_epoch[id] = epoch;
        } else {
            stack.push((id, true));
            stack.push((f0.id(), false));
            stack.push((f1.id(), false));
        }
    }
    Ok(cone_value(AigLit::new(root, false), value, value_epoch, epoch))
}

fn cone_value(fanin: AigLit, value: &[AigLit], value_epoch: &[u32], epoch: u32) -> AigLit {
    let id = fanin.id();
    let base = if id == 0 {
        AigLit::FALSE
    } else {
        debug_assert_eq!(value_epoch[id], epoch);
        value[id]
    };
    base.xor_complement(fanin.is_complement())
}

/// The abstracted AIG implied by a gate-class vector, together with the
/// source ids of the appended pseudo-primary inputs.
pub struct AbsGates {
    pub aig: Aig,
    /// Source object ids of the PIs appended after the original ones.
    pub ppis: Vec<u32>,
}

/// Materializes the abstraction: included AND/RO objects keep their logic,
/// every non-included fanin of the abstraction becomes a fresh PI appended
/// after the original inputs, and all original outputs are rebuilt.
pub fn dup_abs_gates(aig: &Aig, gate_classes: &[bool]) -> Result<AbsGates> {
    ensure!(
        gate_classes.len() == aig.object_count(),
        "gate-class vector length {} does not match the AIG ({} objects)",
        gate_classes.len(),
        aig.object_count()
    );
    let included =
        |id: usize| id < gate_classes.len() && gate_classes[id] && (aig.is_and(id) || aig.is_ro(id));

    // Frontier fanins that have to become pseudo-primary inputs.
    let mut is_ppi = vec![false; aig.object_count()];
    let frontier = |fanin: AigLit, is_ppi: &mut Vec<bool>| {
        let id = fanin.id();
        if !aig.is_const0(id) && !aig.is_pi(id) && !included(id) {
            is_ppi[id] = true;
        }
    };
    for id in 1..aig.object_count() {
        if included(id) {
            if aig.is_and(id) {
                frontier(aig.fanin0(id), &mut is_ppi);
                frontier(aig.fanin1(id), &mut is_ppi);
            } else {
                frontier(aig.fanin0(aig.ro_to_ri(id)), &mut is_ppi);
            }
        }
    }
    for po in 0..aig.po_count() {
        frontier(aig.po_fanin(po), &mut is_ppi);
    }
    let ppis: Vec<u32> = (0..aig.object_count())
        .filter(|&id| is_ppi[id])
        .map(|id| id as u32)
        .collect();

    let mut new = Aig::new();
    let mut map: Vec<Option<AigLit>> = vec![None; aig.object_count()];
    map[0] = Some(AigLit::FALSE);
    for i in 0..aig.pi_count() {
        map[aig.pi(i)] = Some(new.add_ci());
    }
    for &ppi in &ppis {
        map[ppi as usize] = Some(new.add_ci());
    }
    let kept_ros: Vec<usize> = (0..aig.reg_count())
        .map(|r| aig.ro(r))
        .filter(|&ro| included(ro))
        .collect();
    for &ro in &kept_ros {
        map[ro] = Some(new.add_ci());
    }
    let map_fanin = |fanin: AigLit, map: &[Option<AigLit>]| -> Result<AigLit> {
        match map[fanin.id()] {
            Some(lit) => Ok(lit.xor_complement(fanin.is_complement())),
            None => bail!("abstraction frontier misses object {}", fanin.id()),
        }
    };
    for id in 1..aig.object_count() {
        if included(id) && aig.is_and(id) {
            let lit0 = map_fanin(aig.fanin0(id), &map)?;
            let lit1 = map_fanin(aig.fanin1(id), &map)?;
            map[id] = Some(new.add_and(lit0, lit1));
        }
    }
    for po in 0..aig.po_count() {
        let lit = map_fanin(aig.po_fanin(po), &map)?;
        new.add_co(lit);
    }
    for &ro in &kept_ros {
        let ri = aig.ro_to_ri(ro);
        let lit = map_fanin(aig.fanin0(ri), &map)?;
        new.add_co(lit);
    }
    new.set_reg_count(kept_ros.len());
    Ok(AbsGates { aig: new, ppis })
}

/// Projects a counterexample for the abstracted AIG back onto the original:
/// the abstraction's inputs are the original PIs followed by PPIs, so the
/// original trace is the per-frame prefix of true primary inputs.
pub fn remap_abs_cex(original: &Aig, cex_abs: &Cex) -> Cex {
    let mut cex = Cex::zeroes(original.reg_count(), original.pi_count(), cex_abs.frames);
    cex.po_index = cex_abs.po_index;
    for f in 0..cex_abs.frames {
        for i in 0..original.pi_count().min(cex_abs.pi_count) {
            if cex_abs.pi_bit(f, i) {
                cex.set_pi_bit(f, i, true);
            }
        }
    }
    cex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cex::verify_cex;

    /// a & b & c as two chained ANDs, with the upper AND mapped as one LUT
    /// over {a, b, c}.
    fn chain_aig() -> (Aig, usize, usize) {
        let mut aig = Aig::new();
        let a = aig.add_ci();
        let b = aig.add_ci();
        let c = aig.add_ci();
        let ab = aig.add_and(a, b);
        let abc = aig.add_and(ab, c);
        aig.add_co(abc);
        aig.set_reg_count(0);
        (aig, ab.id(), abc.id())
    }

    #[test]
    fn test_dup_mapped_collapses_cone() {
        let (aig, _ab, abc) = chain_aig();
        let mut mapping = LutMapping::new(aig.object_count());
        mapping.set_cut(abc, vec![aig.pi(0) as u32, aig.pi(1) as u32, aig.pi(2) as u32]);
        let mapped = dup_mapped(&aig, &mapping).unwrap();
        // 1 const + 3 CIs + 2 cone nodes + 1 CO.
        assert_eq!(mapped.aig.object_count(), 7);
        assert_eq!(mapped.lut_configs.len(), 7);
        assert_eq!(mapped.aig.pi_count(), 3);
        // Every new object names its source.
        assert_eq!(mapped.lut_configs[0], 0);
        let root_lit = mapped.obj_map[abc].unwrap();
        assert!(mapped.aig.is_and(root_lit.id()));
        assert_eq!(mapped.lut_configs[root_lit.id()], abc as u32);
    }

    #[test]
    fn test_dup_mapped_rejects_bad_leaf() {
        let (aig, ab, abc) = chain_aig();
        let mut mapping = LutMapping::new(aig.object_count());
        // `ab` is not a root, so it cannot be a leaf.
        mapping.set_cut(abc, vec![ab as u32, aig.pi(2) as u32]);
        assert!(dup_mapped(&aig, &mapping).is_err());

        let mut mapping = LutMapping::new(aig.object_count());
        mapping.set_cut(abc, vec![9999]);
        assert!(dup_mapped(&aig, &mapping).is_err());
    }

    #[test]
    fn test_dup_mapped_duplicates_shared_nodes() {
        // Two roots both covering the shared lower AND: the copy decouples it.
        let mut aig = Aig::new();
        let a = aig.add_ci();
        let b = aig.add_ci();
        let c = aig.add_ci();
        let d = aig.add_ci();
        let ab = aig.add_and(a, b);
        let x = aig.add_and(ab, c);
        let y = aig.add_and(ab, d);
        aig.add_co(x);
        aig.add_co(y);
        aig.set_reg_count(0);
        let mut mapping = LutMapping::new(aig.object_count());
        let leaves = |ids: &[AigLit]| ids.iter().map(|l| l.id() as u32).collect::<Vec<_>>();
        mapping.set_cut(x.id(), leaves(&[a, b, c]));
        mapping.set_cut(y.id(), leaves(&[a, b, d]));
        let mapped = dup_mapped(&aig, &mapping).unwrap();
        // `ab` is rebuilt once per cone: 2 nodes per root.
        assert_eq!(
            mapped
                .lut_configs
                .iter()
                .filter(|&&src| src == ab.id() as u32)
                .count(),
            2
        );
    }

    #[test]
    fn test_dup_abs_gates_frontier_becomes_ppis() {
        // One flop plus logic; abstract only the output AND.
        let mut aig = Aig::new();
        let pi = aig.add_ci();
        let ro = aig.add_ci();
        let inner = aig.add_and(pi, ro);
        let outer = aig.add_and(inner, ro);
        aig.add_co(outer);
        aig.add_co(inner);
        aig.set_reg_count(1);

        let mut gate_classes = vec![false; aig.object_count()];
        gate_classes[0] = true;
        gate_classes[outer.id()] = true;
        let abs = dup_abs_gates(&aig, &gate_classes).unwrap();
        // `inner` and the flop output are the frontier.
        assert_eq!(abs.ppis, vec![ro.id() as u32, inner.id() as u32]);
        assert_eq!(abs.aig.pi_count(), aig.pi_count() + abs.ppis.len());
        assert_eq!(abs.aig.reg_count(), 0);
        assert_eq!(abs.aig.po_count(), aig.po_count());
    }

    #[test]
    fn test_dup_abs_gates_full_inclusion_roundtrip() {
        // Including everything reproduces a behaviorally equal design.
        let mut aig = Aig::new();
        let pi = aig.add_ci();
        let ro = aig.add_ci();
        let next = aig.add_and(pi, ro.not());
        aig.add_co(ro);
        aig.add_co(next);
        aig.set_reg_count(1);

        let mut gate_classes = vec![true; aig.object_count()];
        gate_classes[aig.pi(0)] = false;
        let abs = dup_abs_gates(&aig, &gate_classes).unwrap();
        assert!(abs.ppis.is_empty());
        assert_eq!(abs.aig.pi_count(), 1);
        assert_eq!(abs.aig.reg_count(), 1);

        // A trace asserting the output must replay identically.
        let mut cex = Cex::zeroes(1, 1, 2);
        cex.set_pi_bit(0, 0, true);
        assert_eq!(verify_cex(&aig, &cex), verify_cex(&abs.aig, &cex));
    }

    #[test]
    fn test_remap_abs_cex_projects_prefix() {
        let mut aig = Aig::new();
        let _pi0 = aig.add_ci();
        let _pi1 = aig.add_ci();
        aig.add_co(AigLit::FALSE);
        aig.set_reg_count(0);

        let mut cex_abs = Cex::zeroes(0, 4, 2);
        cex_abs.set_pi_bit(0, 1, true);
        cex_abs.set_pi_bit(1, 3, true);
        let cex = remap_abs_cex(&aig, &cex_abs);
        assert_eq!(cex.pi_count, 2);
        assert!(cex.pi_bit(0, 1));
        assert!(!cex.pi_bit(1, 1));
    }
}
