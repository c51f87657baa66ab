//! Timeframe loader: emits the clause template of abstraction objects into
//! the solver for a given frame, allocating variables lazily through the
//! frame map. Every clause is tagged in the clause map with its GLA object.

use cegar_sat::Lit;

use super::GlaMan;
use crate::cnf;

impl GlaMan<'_> {
    /// Loads one object into one frame.
    ///
    /// Constants assert 0; flop outputs assert 0 in frame 0 and a buffer to
    /// their next-state fanin of the previous frame otherwise; ANDs emit
    /// their template clauses. Outputs and flop inputs are never loaded.
    pub(crate) fn add_object_clauses(&mut self, gla: u32, frame: usize) {
        let obj = *self.obj(gla);
        if obj.is_const {
            let v = self.frames.get_var(&self.objs, gla, frame);
            self.solver.add_const(v, true, gla as i32);
            self.clause_map.push(gla as i32);
        } else if obj.is_ro {
            debug_assert_eq!(obj.n_fanins, 1);
            if frame == 0 {
                if self.params.use_term_vars {
                    // Initialization through the flop's own terminal
                    // variable in the virtual frame before frame 0. The
                    // terminal is pinned by its defining unit clause once,
                    // and the frame-0 value reads it complemented.
                    let (term, fresh) = self.frames.get_init_var(&self.objs, gla);
                    if fresh {
                        self.solver.add_const(term, false, gla as i32);
                        self.clause_map.push(gla as i32);
                    }
                    let v = self.frames.get_var(&self.objs, gla, 0);
                    self.solver.add_buffer(v, term, true, gla as i32);
                    self.clause_map.push(gla as i32);
                    self.clause_map.push(gla as i32);
                } else {
                    let v = self.frames.get_var(&self.objs, gla, 0);
                    self.solver.add_const(v, true, gla as i32);
                    self.clause_map.push(gla as i32);
                }
            } else {
                let v = self.frames.get_var(&self.objs, gla, frame);
                let fanin = self.frames.get_var(&self.objs, obj.fanins[0], frame - 1);
                self.solver.add_buffer(v, fanin, obj.fanin_compl0, gla as i32);
                self.clause_map.push(gla as i32);
                self.clause_map.push(gla as i32);
            }
        } else {
            debug_assert!(obj.is_and);
            let mut lits: Vec<Lit> = Vec::with_capacity(5);
            let first = self.cnf.first_clause(obj.aig_id as usize);
            let count = self.cnf.clause_count(obj.aig_id as usize).max(0) as usize;
            for clause_idx in first..first + count {
                lits.clear();
                let n_lits = self.cnf.clause_lits(clause_idx).len();
                for k in 0..n_lits {
                    let lit = self.cnf.clause_lits(clause_idx)[k];
                    let var =
                        self.frames
                            .get_var(&self.objs, cnf::lit_var(lit) as u32, frame);
                    lits.push(Lit::new(var, cnf::lit_negated(lit)));
                }
                self.solver.add_clause(&lits, gla as i32);
                self.clause_map.push(gla as i32);
            }
        }
        debug_assert_eq!(self.clause_map.len(), self.solver.num_clauses());
    }

    /// Loads the whole abstraction into one frame.
    pub(crate) fn add_timeframe(&mut self, frame: usize) {
        let order = self.abs.order().to_vec();
        for gla in order {
            self.add_object_clauses(gla, frame);
        }
        self.solver.simplify();
    }

    /// Loads a set of objects into every frame from `frame_hi` down to 0.
    pub(crate) fn add_slice(&mut self, frame_hi: usize, objs: &[u32]) {
        for frame in (0..=frame_hi).rev() {
            for &gla in objs {
                self.add_object_clauses(gla, frame);
            }
        }
        self.solver.simplify();
    }

}
