//! UNSAT-core extraction.
//!
//! Solves the property assumption for a frame and, on unsatisfiability,
//! translates the proof's clause indices back to GLA objects through the
//! clause map. The returned order puts later-allocated objects first; the
//! driver reloads cores in that order.

use cegar_sat::{Lit, SolveStatus};

use super::GlaMan;

/// Tri-state answer of a core query.
pub(crate) enum CoreResult {
    Unsat(Vec<u32>),
    Sat,
    /// Conflict budget or deadline expired.
    Undef,
}

impl GlaMan<'_> {
    /// The assumption literal asserting the property output in `frame`, or
    /// `None` when the output reads an uncomplemented flop in frame 0 and
    /// the flop-init unit clause contradicts it outright.
    pub(crate) fn out_lit(&mut self, frame: usize) -> Option<Lit> {
        let root = *self.obj(self.root);
        debug_assert_eq!(root.n_fanins, 1);
        let fanin = root.fanins[0];
        if frame == 0 && self.obj(fanin).is_ro && !root.fanin_compl0 {
            return None;
        }
        let var = self.frames.get_var(&self.objs, fanin, frame);
        Some(Lit::new(var, root.fanin_compl0))
    }

    /// Solves frame `frame` under the property assumption and classifies the
    /// answer. Returns the conflicts spent alongside.
    pub(crate) fn unsat_core(&mut self, frame: usize) -> (CoreResult, u64) {
        let Some(lit) = self.out_lit(frame) else {
            // Immediate contradiction with the flop-init clause.
            return (CoreResult::Unsat(vec![self.obj(self.root).fanins[0]]), 0);
        };
        let before = self.solver.num_conflicts();
        let status = self.solver.solve(&[lit], self.params.conflict_limit);
        let spent = self.solver.num_conflicts() - before;
        let result = match status {
            SolveStatus::Undef => CoreResult::Undef,
            SolveStatus::Sat => CoreResult::Sat,
            SolveStatus::Unsat => {
                let mut core: Vec<u32> = self
                    .solver
                    .proof_core()
                    .iter()
                    .map(|&clause| self.clause_map[clause] as u32)
                    .collect();
                core.sort_unstable();
                core.dedup();
                core.reverse();
                CoreResult::Unsat(core)
            }
        };
        (result, spent)
    }
}

#[cfg(test)]
mod tests {
    use cegar_aig::Aig;

    use super::super::GlaMan;
    use super::CoreResult;
    use crate::params::GlaParams;

    #[test]
    fn test_flop_init_short_circuit() {
        // PO reads a flop directly, uncomplemented.
        let mut aig = Aig::new();
        let pi = aig.add_ci();
        let ro = aig.add_ci();
        aig.add_co(ro);
        aig.add_co(pi);
        aig.set_reg_count(1);
        let mut classes = vec![false; aig.object_count()];
        classes[aig.ro(0)] = true;
        let mut man = GlaMan::new(&aig, &classes, GlaParams::default()).unwrap();
        man.add_timeframe(0);
        let (result, spent) = man.unsat_core(0);
        let CoreResult::Unsat(core) = result else {
            panic!("expected an immediate core");
        };
        assert_eq!(spent, 0);
        assert_eq!(core, vec![man.obj2gla[aig.ro(0)]]);
    }

    #[test]
    fn test_core_translates_and_orders() {
        // PO = !flop; flop holds its PI. Asserting the PO in frame 0 hits
        // the init clause through the complement, so a real solve runs.
        let mut aig = Aig::new();
        let pi = aig.add_ci();
        let ro = aig.add_ci();
        aig.add_co(ro.not());
        aig.add_co(pi);
        aig.set_reg_count(1);
        let mut classes = vec![false; aig.object_count()];
        classes[aig.ro(0)] = true;
        let mut man = GlaMan::new(&aig, &classes, GlaParams::default()).unwrap();
        man.add_timeframe(0);
        // PO asserted in frame 0 is satisfiable (flop is 0, PO is 1).
        let (result, _) = man.unsat_core(0);
        assert!(matches!(result, CoreResult::Sat));
    }
}
