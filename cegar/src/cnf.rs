//! Per-object CNF templates.
//!
//! For every AIG object that participates in SAT encoding, the builder
//! precomputes its clauses once, in object-id literal space. The timeframe
//! loader later translates template literals into per-frame solver variables.
//! All clause literals live in one packed buffer with an offset table per
//! clause and a first-clause/clause-count table per object.

use anyhow::{ensure, Result};
use cegar_aig::dup::LutMapping;
use cegar_aig::{Aig, AigLit};
use hashbrown::HashMap;

/// Template literal: a variable index with the polarity in the low bit.
pub const fn mk_lit(var: usize, negated: bool) -> i32 {
    ((var as i32) << 1) | negated as i32
}

pub const fn lit_var(lit: i32) -> usize {
    (lit >> 1) as usize
}

pub const fn lit_negated(lit: i32) -> bool {
    lit & 1 != 0
}

const fn aig_lit(lit: AigLit) -> i32 {
    mk_lit(lit.id(), lit.is_complement())
}

/// Precomputed clause templates for one AIG.
#[derive(Clone, Debug)]
pub struct CnfData {
    /// Clauses per object; -1 for objects with no CNF of their own.
    clause_counts: Vec<i32>,
    /// Index of each object's first clause.
    first_clause: Vec<u32>,
    /// Start offset of each clause in `lits`, with a trailing sentinel.
    clause_offsets: Vec<u32>,
    lits: Vec<i32>,
}

impl CnfData {
    /// Derives templates for every object: the unit clause of the constant,
    /// the functional 3-clause encoding of each AND (equivalence classes are
    /// merged upstream by the builder's structural hashing), and the buffer
    /// pair of each CO. CIs carry zero clauses.
    pub fn derive(aig: &Aig) -> Self {
        let mut cnf = Self::empty(aig.object_count());
        for id in 0..aig.object_count() {
            if aig.is_const0(id) {
                cnf.begin_object(id);
                cnf.push_clause(id, &[mk_lit(id, true)]);
            } else if aig.is_ci(id) {
                cnf.begin_object(id);
            } else if aig.is_and(id) {
                cnf.begin_object(id);
                cnf.push_and_clauses(id, aig.fanin0(id), aig.fanin1(id));
            } else {
                debug_assert!(aig.is_co(id));
                cnf.begin_object(id);
                cnf.push_buffer_clauses(id, aig.fanin0(id));
            }
        }
        cnf
    }

    /// Derives templates with a LUT mapping: each root gets a functional CNF
    /// of its cone over the cut leaves (one clause per truth-table row), and
    /// non-root AND nodes get no CNF at all.
    pub fn derive_mapped(aig: &Aig, mapping: &LutMapping) -> Self {
        let mut cnf = Self::empty(aig.object_count());
        for id in 0..aig.object_count() {
            if aig.is_const0(id) {
                cnf.begin_object(id);
                cnf.push_clause(id, &[mk_lit(id, true)]);
            } else if aig.is_ci(id) {
                cnf.begin_object(id);
            } else if aig.is_and(id) {
                if !mapping.is_root(id) {
                    continue;
                }
                cnf.begin_object(id);
                let leaves = mapping.leaves(id);
                let truth = cone_truth_table(aig, id, leaves);
                for row in 0..1usize << leaves.len() {
                    let output = truth >> row & 1 != 0;
                    // Row matching drives the output to its table value: the
                    // clause is (out = value) ∨ some leaf differs from the row.
                    let mut clause = vec![mk_lit(id, !output)];
                    for (i, &leaf) in leaves.iter().enumerate() {
                        clause.push(mk_lit(leaf as usize, row >> i & 1 != 0));
                    }
                    cnf.push_clause(id, &clause);
                }
            } else {
                debug_assert!(aig.is_co(id));
                cnf.begin_object(id);
                cnf.push_buffer_clauses(id, aig.fanin0(id));
            }
        }
        cnf
    }

    fn empty(object_count: usize) -> Self {
        Self {
            clause_counts: vec![-1; object_count],
            first_clause: vec![0; object_count],
            clause_offsets: vec![0],
            lits: Vec::new(),
        }
    }

    fn begin_object(&mut self, id: usize) {
        self.clause_counts[id] = 0;
        self.first_clause[id] = (self.clause_offsets.len() - 1) as u32;
    }

    fn push_clause(&mut self, id: usize, lits: &[i32]) {
        self.lits.extend_from_slice(lits);
        self.clause_offsets.push(self.lits.len() as u32);
        self.clause_counts[id] += 1;
    }

    fn push_and_clauses(&mut self, id: usize, f0: AigLit, f1: AigLit) {
        self.push_clause(id, &[mk_lit(id, true), aig_lit(f0)]);
        self.push_clause(id, &[mk_lit(id, true), aig_lit(f1)]);
        self.push_clause(id, &[mk_lit(id, false), aig_lit(f0.not()), aig_lit(f1.not())]);
    }

    fn push_buffer_clauses(&mut self, id: usize, f0: AigLit) {
        self.push_clause(id, &[mk_lit(id, true), aig_lit(f0)]);
        self.push_clause(id, &[mk_lit(id, false), aig_lit(f0.not())]);
    }

    pub fn object_count(&self) -> usize {
        self.clause_counts.len()
    }

    pub fn num_clauses(&self) -> usize {
        self.clause_offsets.len() - 1
    }

    /// Clauses of `id`; -1 means the object has no CNF.
    pub fn clause_count(&self, id: usize) -> i32 {
        self.clause_counts[id]
    }

    pub fn first_clause(&self, id: usize) -> usize {
        self.first_clause[id] as usize
    }

    pub fn clause_lits(&self, clause: usize) -> &[i32] {
        &self.lits[self.clause_offsets[clause] as usize..self.clause_offsets[clause + 1] as usize]
    }

    /// Iterator over the clause slices of one object.
    pub fn object_clauses(&self, id: usize) -> impl Iterator<Item = &[i32]> + '_ {
        let first = self.first_clause(id);
        let count = self.clause_counts[id].max(0) as usize;
        (first..first + count).map(move |c| self.clause_lits(c))
    }

    /// Rewrites every literal through an object-id map, preserving polarity.
    /// Fails when a literal refers to an object the map does not cover.
    pub fn remap_lits(&mut self, id_map: &[u32]) -> Result<()> {
        for lit in &mut self.lits {
            let var = lit_var(*lit);
            ensure!(
                var < id_map.len() && id_map[var] != u32::MAX,
                "literal variable {var} is out of bounds of the id map"
            );
            *lit = mk_lit(id_map[var] as usize, lit_negated(*lit));
        }
        Ok(())
    }

    /// Moves the per-object tables onto a new object space. Literals are not
    /// touched; remap them separately.
    pub fn reindex(&self, old_to_new: &[Option<u32>], new_object_count: usize) -> Self {
        let mut counts = vec![-1; new_object_count];
        let mut first = vec![0u32; new_object_count];
        for old in 0..self.clause_counts.len() {
            if self.clause_counts[old] < 0 {
                continue;
            }
            if let Some(new) = old_to_new[old] {
                counts[new as usize] = self.clause_counts[old];
                first[new as usize] = self.first_clause[old];
            }
        }
        Self {
            clause_counts: counts,
            first_clause: first,
            clause_offsets: self.clause_offsets.clone(),
            lits: self.lits.clone(),
        }
    }
}

/// Evaluates the cone of `root` above `leaves` for all leaf assignments;
/// bit `row` of the result is the root value when leaf `i` takes bit `i` of
/// `row`.
fn cone_truth_table(aig: &Aig, root: usize, leaves: &[u32]) -> u16 {
    debug_assert!(leaves.len() <= 4);
    let mut truth = 0u16;
    for row in 0..1usize << leaves.len() {
        let mut values: HashMap<usize, bool> = leaves
            .iter()
            .enumerate()
            .map(|(i, &leaf)| (leaf as usize, row >> i & 1 != 0))
            .collect();
        values.insert(0, false);
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if !expanded {
                if values.contains_key(&id) {
                    continue;
                }
                stack.push((id, true));
                stack.push((aig.fanin0(id).id(), false));
                stack.push((aig.fanin1(id).id(), false));
            } else {
                let f0 = aig.fanin0(id);
                let f1 = aig.fanin1(id);
                let v0 = values[&f0.id()] ^ f0.is_complement();
                let v1 = values[&f1.id()] ^ f1.is_complement();
                values.insert(id, v0 & v1);
            }
        }
        if values[&root] {
            truth |= 1 << row;
        }
    }
    truth
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_aig() -> Aig {
        let mut aig = Aig::new();
        let a = aig.add_ci();
        let b = aig.add_ci();
        let ab = aig.add_and(a, b.not());
        aig.add_co(ab.not());
        aig.set_reg_count(0);
        aig
    }

    #[test]
    fn test_derive_shapes() {
        let aig = sample_aig();
        let cnf = CnfData::derive(&aig);
        assert_eq!(cnf.clause_count(0), 1);
        assert_eq!(cnf.clause_lits(0), &[mk_lit(0, true)]);
        let (a, b) = (aig.pi(0), aig.pi(1));
        assert_eq!(cnf.clause_count(a), 0);
        let and_id = aig.fanin0(aig.po(0)).id();
        assert_eq!(cnf.clause_count(and_id), 3);
        let clauses: Vec<&[i32]> = cnf.object_clauses(and_id).collect();
        assert_eq!(clauses[0], &[mk_lit(and_id, true), mk_lit(a, false)]);
        assert_eq!(clauses[1], &[mk_lit(and_id, true), mk_lit(b, true)]);
        assert_eq!(
            clauses[2],
            &[mk_lit(and_id, false), mk_lit(a, true), mk_lit(b, false)]
        );
        assert_eq!(cnf.clause_count(aig.po(0)), 2);
    }

    #[test]
    fn test_remap_lits() {
        let aig = sample_aig();
        let mut cnf = CnfData::derive(&aig);
        // Shift every object up by one.
        let map: Vec<u32> = (0..aig.object_count() as u32).map(|i| i + 1).collect();
        cnf.remap_lits(&map).unwrap();
        assert_eq!(cnf.clause_lits(0), &[mk_lit(1, true)]);

        let holes = vec![u32::MAX; aig.object_count()];
        let mut cnf = CnfData::derive(&aig);
        assert!(cnf.remap_lits(&holes).is_err());
        let mut cnf = CnfData::derive(&aig);
        assert!(cnf.remap_lits(&[0u32]).is_err());
    }

    #[test]
    fn test_mapped_templates_are_functional() {
        // f = (a & b) & ~c as one 3-input LUT.
        let mut aig = Aig::new();
        let a = aig.add_ci();
        let b = aig.add_ci();
        let c = aig.add_ci();
        let ab = aig.add_and(a, b);
        let f = aig.add_and(ab, c.not());
        aig.add_co(f);
        aig.set_reg_count(0);
        let mut mapping = LutMapping::new(aig.object_count());
        let leaves = vec![a.id() as u32, b.id() as u32, c.id() as u32];
        mapping.set_cut(f.id(), leaves.clone());

        let cnf = CnfData::derive_mapped(&aig, &mapping);
        assert_eq!(cnf.clause_count(ab.id()), -1);
        assert_eq!(cnf.clause_count(f.id()), 8);

        // CNF must be satisfied exactly when out == (a & b & !c).
        for assignment in 0..16usize {
            let val = |id: usize| {
                if id == f.id() {
                    assignment >> 3 & 1 != 0
                } else {
                    let pos = leaves.iter().position(|&l| l as usize == id).unwrap();
                    assignment >> pos & 1 != 0
                }
            };
            let consistent =
                (val(a.id()) && val(b.id()) && !val(c.id())) == val(f.id());
            let satisfied = cnf.object_clauses(f.id()).all(|clause| {
                clause
                    .iter()
                    .any(|&lit| val(lit_var(lit)) ^ lit_negated(lit))
            });
            assert_eq!(satisfied, consistent, "assignment {assignment:04b}");
        }
    }

    #[test]
    fn test_reindex() {
        let aig = sample_aig();
        let cnf = CnfData::derive(&aig);
        let and_id = aig.fanin0(aig.po(0)).id();
        let mut old_to_new: Vec<Option<u32>> = vec![None; aig.object_count()];
        old_to_new[0] = Some(0);
        old_to_new[and_id] = Some(3);
        let re = cnf.reindex(&old_to_new, 6);
        assert_eq!(re.clause_count(3), 3);
        assert_eq!(re.clause_count(1), -1);
        assert_eq!(re.first_clause(3), cnf.first_clause(and_id));
    }
}
