//! The CDCL search engine.

use std::time::Instant;

use log::debug;

use crate::Lit;

/// Result of an assumption-based solve.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SolveStatus {
    Sat,
    Unsat,
    /// A resource budget (conflicts or wall clock) expired.
    Undef,
}

/// Reference to a clause: original clauses keep stable indices for the
/// lifetime of a bookmark epoch, learnt clauses live in a parallel arena.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum CRef {
    Orig(u32),
    Learnt(u32),
}

struct Clause {
    lits: Vec<Lit>,
    deleted: bool,
}

/// Conflicts before the first restart; later restarts scale by the Luby
/// sequence 1, 1, 2, 1, 1, 2, 4, ...
const RESTART_BASE: u64 = 64;

fn luby(mut x: u64) -> u64 {
    // Find the finite subsequence containing index x and its position in it.
    let mut size = 1u64;
    let mut seq = 0u32;
    while size < x + 1 {
        seq += 1;
        size = 2 * size + 1;
    }
    while size - 1 != x {
        size = (size - 1) >> 1;
        seq -= 1;
        x %= size;
    }
    1u64 << seq
}

#[derive(Clone)]
struct Bookmark {
    n_vars: usize,
    n_clauses: usize,
    n_learnts: usize,
    n_trail: usize,
    qhead: usize,
    root_conflict: Option<CRef>,
}

pub struct Solver {
    clauses: Vec<Clause>,
    /// Proof-id tag per original clause, remembered at add time.
    proof_ids: Vec<i32>,
    learnts: Vec<Clause>,
    /// For each learnt clause, the clauses resolved to derive it. This is the
    /// proof log: the UNSAT core is the transitive closure of the final
    /// conflict over these edges, restricted to original clauses.
    antecedents: Vec<Vec<CRef>>,
    /// For each literal, the clauses containing it.
    occur: Vec<Vec<CRef>>,
    assigns: Vec<Option<bool>>,
    level: Vec<u32>,
    reason: Vec<Option<CRef>>,
    activity: Vec<f64>,
    var_inc: f64,
    /// Saved polarity per variable; decisions repeat the last assignment.
    phase: Vec<bool>,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,
    /// Set once a conflict is derived without any decision: the instance is
    /// unconditionally unsatisfiable until a rollback removes the cause.
    root_conflict: Option<CRef>,
    model: Vec<bool>,
    core: Vec<usize>,
    seen: Vec<bool>,
    conflicts: u64,
    decisions: u64,
    propagations: u64,
    restarts: u64,
    learnt_max: usize,
    deadline: Option<Instant>,
    mark: Option<Bookmark>,
}

impl Solver {
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
            proof_ids: Vec::new(),
            learnts: Vec::new(),
            antecedents: Vec::new(),
            occur: Vec::new(),
            assigns: Vec::new(),
            level: Vec::new(),
            reason: Vec::new(),
            activity: Vec::new(),
            var_inc: 1.0,
            phase: Vec::new(),
            trail: Vec::new(),
            trail_lim: Vec::new(),
            qhead: 0,
            root_conflict: None,
            model: Vec::new(),
            core: Vec::new(),
            seen: Vec::new(),
            conflicts: 0,
            decisions: 0,
            propagations: 0,
            restarts: 0,
            learnt_max: 0,
            deadline: None,
            mark: None,
        }
    }

    pub fn num_vars(&self) -> usize {
        self.assigns.len()
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub fn num_learnts(&self) -> usize {
        self.learnts.iter().filter(|c| !c.deleted).count()
    }

    pub fn num_conflicts(&self) -> u64 {
        self.conflicts
    }

    /// Caps the learnt database; 0 means unlimited.
    pub fn set_learnt_max(&mut self, learnt_max: usize) {
        self.learnt_max = learnt_max;
    }

    /// Installs a wall-clock deadline honored by every subsequent solve.
    pub fn set_runtime_limit(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Value of a variable in the model of the last satisfiable solve.
    pub fn var_value(&self, var: usize) -> bool {
        self.model.get(var).copied().unwrap_or(false)
    }

    /// Original-clause indices involved in the proof of the last UNSAT
    /// answer, in ascending order.
    pub fn proof_core(&self) -> &[usize] {
        &self.core
    }

    pub fn clause_proof_id(&self, clause: usize) -> i32 {
        self.proof_ids[clause]
    }

    // Clause addition. Only legal outside of a solve, at decision level 0.

    /// Adds a clause tagged with `proof_id` and returns its index.
    pub fn add_clause(&mut self, lits: &[Lit], proof_id: i32) -> usize {
        assert!(self.trail_lim.is_empty(), "clauses are added at level 0");
        let index = self.clauses.len();
        for &l in lits {
            self.ensure_var(l.var());
        }
        self.clauses.push(Clause {
            lits: lits.to_vec(),
            deleted: false,
        });
        self.proof_ids.push(proof_id);
        self.attach(CRef::Orig(index as u32));

        // The new clause may already be unit or falsified under the current
        // top-level assignment.
        let mut satisfied = false;
        let mut unit = None;
        let mut n_unassigned = 0;
        for &l in lits {
            match self.value_lit(l) {
                Some(true) => {
                    satisfied = true;
                    break;
                }
                None => {
                    n_unassigned += 1;
                    unit = Some(l);
                }
                Some(false) => {}
            }
        }
        if !satisfied && self.root_conflict.is_none() {
            match n_unassigned {
                0 => self.root_conflict = Some(CRef::Orig(index as u32)),
                1 => self.unchecked_enqueue(unit.unwrap(), Some(CRef::Orig(index as u32))),
                _ => {}
            }
        }
        index
    }

    /// Unit clause asserting `var = !negated`.
    pub fn add_const(&mut self, var: usize, negated: bool, proof_id: i32) {
        self.add_clause(&[Lit::new(var, negated)], proof_id);
    }

    /// Two clauses encoding `out = in ^ complement`.
    pub fn add_buffer(&mut self, out: usize, inp: usize, complement: bool, proof_id: i32) {
        let i = Lit::new(inp, complement);
        self.add_clause(&[Lit::new(out, true), i], proof_id);
        self.add_clause(&[Lit::new(out, false), i.not()], proof_id);
    }

    /// Three clauses encoding `out = (in0 ^ c0) & (in1 ^ c1)`.
    pub fn add_and(
        &mut self,
        out: usize,
        in0: usize,
        in1: usize,
        c0: bool,
        c1: bool,
        proof_id: i32,
    ) {
        let a = Lit::new(in0, c0);
        let b = Lit::new(in1, c1);
        self.add_clause(&[Lit::new(out, true), a], proof_id);
        self.add_clause(&[Lit::new(out, true), b], proof_id);
        self.add_clause(&[Lit::new(out, false), a.not(), b.not()], proof_id);
    }

    /// Top-level propagation. Permitted to be a no-op; here it closes the
    /// unit implications of everything added since the last call.
    pub fn simplify(&mut self) {
        assert!(self.trail_lim.is_empty());
        if self.root_conflict.is_none() {
            if let Some(confl) = self.propagate() {
                self.root_conflict = Some(confl);
            }
        }
    }

    // Bookmark / rollback.

    /// Checkpoints the variable, clause, and trail state. Must be called at
    /// decision level 0.
    pub fn bookmark(&mut self) {
        assert!(self.trail_lim.is_empty());
        self.mark = Some(Bookmark {
            n_vars: self.assigns.len(),
            n_clauses: self.clauses.len(),
            n_learnts: self.learnts.len(),
            n_trail: self.trail.len(),
            qhead: self.qhead,
            root_conflict: self.root_conflict,
        });
    }

    /// Restores the last bookmark: clauses and variables created since are
    /// dropped, as are learnt clauses derived from them, and the trail is cut
    /// back to the checkpoint.
    pub fn rollback(&mut self) {
        let mark = self.mark.clone().expect("rollback without a bookmark");
        self.cancel_until(0);
        for i in (mark.n_trail..self.trail.len()).rev() {
            let v = self.trail[i].var();
            self.assigns[v] = None;
            self.reason[v] = None;
        }
        self.trail.truncate(mark.n_trail);
        self.qhead = mark.qhead;
        self.clauses.truncate(mark.n_clauses);
        self.proof_ids.truncate(mark.n_clauses);
        self.learnts.truncate(mark.n_learnts);
        self.antecedents.truncate(mark.n_learnts);
        self.assigns.truncate(mark.n_vars);
        self.level.truncate(mark.n_vars);
        self.reason.truncate(mark.n_vars);
        self.activity.truncate(mark.n_vars);
        self.phase.truncate(mark.n_vars);
        self.seen.truncate(mark.n_vars);
        self.root_conflict = mark.root_conflict;
        // Occurrence lists are rebuilt rather than surgically repaired.
        self.occur = vec![Vec::new(); 2 * mark.n_vars];
        for i in 0..self.clauses.len() {
            if !self.clauses[i].deleted {
                self.attach(CRef::Orig(i as u32));
            }
        }
        for j in 0..self.learnts.len() {
            if !self.learnts[j].deleted {
                self.attach(CRef::Learnt(j as u32));
            }
        }
    }

    // Solving.

    /// Solves under the given assumptions. `conflict_limit` of 0 means
    /// unlimited. On `Sat` the model is readable through `var_value`; on
    /// `Unsat` the core is readable through `proof_core`.
    pub fn solve(&mut self, assumps: &[Lit], conflict_limit: u64) -> SolveStatus {
        self.model.clear();
        self.core.clear();
        assert!(self.trail_lim.is_empty());
        for &a in assumps {
            self.ensure_var(a.var());
        }
        if let Some(confl) = self.root_conflict {
            self.core = self.collect_core_from_conflict(confl);
            return SolveStatus::Unsat;
        }
        if let Some(confl) = self.propagate() {
            self.root_conflict = Some(confl);
            self.core = self.collect_core_from_conflict(confl);
            return SolveStatus::Unsat;
        }
        let budget = if conflict_limit == 0 {
            u64::MAX
        } else {
            self.conflicts.saturating_add(conflict_limit)
        };
        let status = self.search(assumps, budget);
        debug!(
            "solve: {status:?} at {} conflicts, {} decisions, {} propagations",
            self.conflicts, self.decisions, self.propagations
        );
        status
    }

    fn search(&mut self, assumps: &[Lit], budget: u64) -> SolveStatus {
        // Luby-paced restarts, counted in conflicts.
        let mut restart_at = self.conflicts + RESTART_BASE * luby(self.restarts);
        loop {
            if self.conflicts >= budget || self.deadline_expired() {
                self.cancel_until(0);
                return SolveStatus::Undef;
            }
            if let Some(confl) = self.propagate() {
                self.conflicts += 1;
                if self.decision_level() == 0 {
                    self.root_conflict = Some(confl);
                    self.core = self.collect_core_from_conflict(confl);
                    return SolveStatus::Unsat;
                }
                let (learnt, backjump, ants) = self.analyze(confl);
                self.cancel_until(backjump);
                let asserting = learnt[0];
                let cref = self.attach_learnt(learnt, ants);
                self.unchecked_enqueue(asserting, Some(cref));
                self.decay_activity();
                self.maybe_reduce_db();
                continue;
            }
            if self.conflicts >= restart_at && self.decision_level() > assumps.len() {
                self.restarts += 1;
                restart_at = self.conflicts + RESTART_BASE * luby(self.restarts);
                self.cancel_until(assumps.len());
                continue;
            }
            let level = self.decision_level();
            if level < assumps.len() {
                // Re-assert pending assumptions, one decision level each.
                let a = assumps[level];
                match self.value_lit(a) {
                    Some(true) => self.trail_lim.push(self.trail.len()),
                    Some(false) => {
                        self.core = self.collect_core_from_lit(a);
                        self.cancel_until(0);
                        return SolveStatus::Unsat;
                    }
                    None => {
                        self.trail_lim.push(self.trail.len());
                        self.unchecked_enqueue(a, None);
                    }
                }
            } else if let Some(var) = self.pick_branch() {
                self.decisions += 1;
                self.trail_lim.push(self.trail.len());
                self.unchecked_enqueue(Lit::new(var, !self.phase[var]), None);
            } else {
                self.model = self.assigns.iter().map(|a| a.unwrap_or(false)).collect();
                self.cancel_until(0);
                return SolveStatus::Sat;
            }
        }
    }

    fn propagate(&mut self) -> Option<CRef> {
        while self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            self.propagations += 1;
            let watch = p.not().index();
            let n = self.occur[watch].len();
            for i in 0..n {
                let cref = self.occur[watch][i];
                let (satisfied, n_unassigned, unit) = {
                    let clause = self.clause(cref);
                    if clause.deleted {
                        continue;
                    }
                    let mut satisfied = false;
                    let mut unit = None;
                    let mut n_unassigned = 0;
                    for &l in &clause.lits {
                        match self.value_lit(l) {
                            Some(true) => {
                                satisfied = true;
                                break;
                            }
                            None => {
                                n_unassigned += 1;
                                unit = Some(l);
                                if n_unassigned > 1 {
                                    break;
                                }
                            }
                            Some(false) => {}
                        }
                    }
                    (satisfied, n_unassigned, unit)
                };
                if satisfied || n_unassigned > 1 {
                    continue;
                }
                if n_unassigned == 0 {
                    self.qhead = self.trail.len();
                    return Some(cref);
                }
                self.unchecked_enqueue(unit.unwrap(), Some(cref));
            }
        }
        None
    }

    /// First-UIP conflict analysis. Returns the learnt clause (asserting
    /// literal first), the backjump level, and every clause resolved on the
    /// way, including top-level implication chains, for the proof log.
    fn analyze(&mut self, confl: CRef) -> (Vec<Lit>, usize, Vec<CRef>) {
        let current = self.decision_level() as u32;
        let mut learnt = vec![Lit::new(0, false)];
        let mut ants = Vec::new();
        let mut to_clear = Vec::new();
        let mut counter = 0usize;
        let mut p: Option<Lit> = None;
        let mut index = self.trail.len();
        let mut creason = confl;
        loop {
            ants.push(creason);
            let lits = self.clause(creason).lits.clone();
            for &q in &lits {
                let v = q.var();
                if p.is_some_and(|p| p.var() == v) {
                    continue;
                }
                if self.seen[v] {
                    continue;
                }
                if self.level[v] > 0 {
                    self.seen[v] = true;
                    to_clear.push(v);
                    self.bump_activity(v);
                    if self.level[v] >= current {
                        counter += 1;
                    } else {
                        learnt.push(q);
                    }
                } else {
                    // Top-level antecedent: its derivation belongs to the
                    // proof even though the literal drops out of the clause.
                    self.push_level0_chain(v, &mut ants, &mut to_clear);
                }
            }
            loop {
                index -= 1;
                if self.seen[self.trail[index].var()] {
                    break;
                }
            }
            let pl = self.trail[index];
            self.seen[pl.var()] = false;
            counter -= 1;
            if counter == 0 {
                learnt[0] = pl.not();
                break;
            }
            p = Some(pl);
            creason = self.reason[pl.var()].expect("implied literal without a reason");
        }
        for v in to_clear {
            self.seen[v] = false;
        }
        let backjump = learnt[1..]
            .iter()
            .map(|l| self.level[l.var()] as usize)
            .max()
            .unwrap_or(0);
        (learnt, backjump, ants)
    }

    fn push_level0_chain(&mut self, var: usize, ants: &mut Vec<CRef>, to_clear: &mut Vec<usize>) {
        self.seen[var] = true;
        to_clear.push(var);
        let mut stack = vec![var];
        while let Some(u) = stack.pop() {
            let Some(r) = self.reason[u] else { continue };
            ants.push(r);
            let lits = self.clause(r).lits.clone();
            for &l in &lits {
                let w = l.var();
                if !self.seen[w] {
                    self.seen[w] = true;
                    to_clear.push(w);
                    stack.push(w);
                }
            }
        }
    }

    /// Closes the final conflict over reasons and learnt antecedents down to
    /// original clauses.
    fn collect_core_from_conflict(&self, confl: CRef) -> Vec<usize> {
        let mut seeds = vec![confl];
        self.collect_reason_closure(self.clause(confl).lits.clone(), &mut seeds);
        self.expand_to_originals(seeds)
    }

    /// Core for an assumption literal found already falsified.
    fn collect_core_from_lit(&self, lit: Lit) -> Vec<usize> {
        let mut seeds = Vec::new();
        self.collect_reason_closure(vec![lit], &mut seeds);
        self.expand_to_originals(seeds)
    }

    fn collect_reason_closure(&self, init: Vec<Lit>, seeds: &mut Vec<CRef>) {
        let mut marked = vec![false; self.assigns.len()];
        let mut stack: Vec<usize> = Vec::new();
        for l in init {
            if !marked[l.var()] {
                marked[l.var()] = true;
                stack.push(l.var());
            }
        }
        while let Some(v) = stack.pop() {
            let Some(r) = self.reason[v] else { continue };
            seeds.push(r);
            for &l in &self.clause(r).lits {
                if !marked[l.var()] {
                    marked[l.var()] = true;
                    stack.push(l.var());
                }
            }
        }
    }

    fn expand_to_originals(&self, seeds: Vec<CRef>) -> Vec<usize> {
        let mut in_core = vec![false; self.clauses.len()];
        let mut visited = vec![false; self.learnts.len()];
        let mut stack = seeds;
        while let Some(cref) = stack.pop() {
            match cref {
                CRef::Orig(i) => in_core[i as usize] = true,
                CRef::Learnt(j) => {
                    if !visited[j as usize] {
                        visited[j as usize] = true;
                        stack.extend(self.antecedents[j as usize].iter().copied());
                    }
                }
            }
        }
        (0..self.clauses.len()).filter(|&i| in_core[i]).collect()
    }

    // Internals.

    fn clause(&self, cref: CRef) -> &Clause {
        match cref {
            CRef::Orig(i) => &self.clauses[i as usize],
            CRef::Learnt(j) => &self.learnts[j as usize],
        }
    }

    fn attach(&mut self, cref: CRef) {
        let lits = self.clause(cref).lits.clone();
        for l in lits {
            self.occur[l.index()].push(cref);
        }
    }

    fn attach_learnt(&mut self, lits: Vec<Lit>, ants: Vec<CRef>) -> CRef {
        let j = self.learnts.len();
        self.learnts.push(Clause {
            lits,
            deleted: false,
        });
        self.antecedents.push(ants);
        let cref = CRef::Learnt(j as u32);
        self.attach(cref);
        cref
    }

    fn ensure_var(&mut self, var: usize) {
        while self.assigns.len() <= var {
            self.assigns.push(None);
            self.level.push(0);
            self.reason.push(None);
            self.activity.push(0.0);
            self.phase.push(false);
            self.seen.push(false);
            self.occur.push(Vec::new());
            self.occur.push(Vec::new());
        }
    }

    fn value_lit(&self, lit: Lit) -> Option<bool> {
        self.assigns[lit.var()].map(|v| lit.apply(v))
    }

    fn decision_level(&self) -> usize {
        self.trail_lim.len()
    }

    fn unchecked_enqueue(&mut self, lit: Lit, reason: Option<CRef>) {
        debug_assert!(self.value_lit(lit).is_none());
        let v = lit.var();
        self.assigns[v] = Some(!lit.is_negated());
        self.phase[v] = !lit.is_negated();
        self.level[v] = self.decision_level() as u32;
        self.reason[v] = reason;
        self.trail.push(lit);
    }

    fn cancel_until(&mut self, level: usize) {
        if self.decision_level() <= level {
            return;
        }
        let lim = self.trail_lim[level];
        for i in (lim..self.trail.len()).rev() {
            let v = self.trail[i].var();
            self.assigns[v] = None;
            self.reason[v] = None;
        }
        self.trail.truncate(lim);
        self.trail_lim.truncate(level);
        self.qhead = lim;
    }

    fn pick_branch(&self) -> Option<usize> {
        let mut best = None;
        let mut best_activity = f64::NEG_INFINITY;
        for v in 1..self.assigns.len() {
            if self.assigns[v].is_none() && self.activity[v] > best_activity {
                best = Some(v);
                best_activity = self.activity[v];
            }
        }
        best
    }

    fn bump_activity(&mut self, var: usize) {
        self.activity[var] += self.var_inc;
        if self.activity[var] > 1e100 {
            for a in &mut self.activity {
                *a *= 1e-100;
            }
            self.var_inc *= 1e-100;
        }
    }

    fn decay_activity(&mut self) {
        self.var_inc /= 0.95;
    }

    fn maybe_reduce_db(&mut self) {
        if self.learnt_max == 0 {
            return;
        }
        let live = self.num_learnts();
        if live <= self.learnt_max {
            return;
        }
        let mut is_reason = vec![false; self.learnts.len()];
        for &l in &self.trail {
            if let Some(CRef::Learnt(j)) = self.reason[l.var()] {
                is_reason[j as usize] = true;
            }
        }
        let target = self.learnt_max / 2;
        let mut removed = 0;
        for j in 0..self.learnts.len() {
            if live - removed <= target {
                break;
            }
            if !self.learnts[j].deleted && !is_reason[j] && self.learnts[j].lits.len() > 2 {
                // Tombstoned, never freed: antecedent edges into it must
                // survive for later core extraction.
                self.learnts[j].deleted = true;
                removed += 1;
            }
        }
        debug!("reduce_db: dropped {removed} learnt clauses, {} live", live - removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(var: usize, negated: bool) -> Lit {
        Lit::new(var, negated)
    }

    #[test]
    fn test_luby_sequence() {
        let expected = [1u64, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8];
        let got: Vec<u64> = (0..expected.len() as u64).map(luby).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_basic_sat() {
        let mut s = Solver::new();
        s.add_clause(&[lit(1, false), lit(2, false)], 0);
        s.add_clause(&[lit(1, true), lit(2, false)], 0);
        assert_eq!(s.solve(&[], 0), SolveStatus::Sat);
        assert!(s.var_value(2));
    }

    #[test]
    fn test_basic_unsat_with_core() {
        let mut s = Solver::new();
        s.add_clause(&[lit(1, false)], 10);
        s.add_clause(&[lit(2, false)], 11);
        s.add_clause(&[lit(1, true), lit(2, true)], 12);
        // Clause 1 (proof id 11) and an unrelated extra.
        s.add_clause(&[lit(3, false), lit(4, false)], 13);
        assert_eq!(s.solve(&[], 0), SolveStatus::Unsat);
        let core = s.proof_core().to_vec();
        assert_eq!(core, vec![0, 1, 2]);
        assert_eq!(s.clause_proof_id(core[0]), 10);
        // Unsatisfiability is sticky.
        assert_eq!(s.solve(&[], 0), SolveStatus::Unsat);
    }

    #[test]
    fn test_assumption_solving() {
        let mut s = Solver::new();
        // v1 -> v2, v2 -> v3.
        s.add_clause(&[lit(1, true), lit(2, false)], 0);
        s.add_clause(&[lit(2, true), lit(3, false)], 1);
        assert_eq!(s.solve(&[lit(1, false)], 0), SolveStatus::Sat);
        assert!(s.var_value(1) && s.var_value(2) && s.var_value(3));
        // Same instance stays satisfiable with the opposite assumption.
        assert_eq!(s.solve(&[lit(3, true)], 0), SolveStatus::Sat);
        assert!(!s.var_value(3));
        // Contradictory pair of assumptions after adding ~v3 forced by v1.
        s.add_clause(&[lit(1, true), lit(3, true)], 2);
        assert_eq!(s.solve(&[lit(1, false), lit(2, false)], 0), SolveStatus::Unsat);
        let core = s.proof_core();
        assert!(core.contains(&2));
    }

    #[test]
    fn test_assumption_core_excludes_unrelated() {
        let mut s = Solver::new();
        s.add_clause(&[lit(1, true), lit(2, false)], 0);
        s.add_clause(&[lit(2, true)], 1);
        // Unrelated satisfiable cluster.
        s.add_clause(&[lit(5, false), lit(6, false)], 2);
        assert_eq!(s.solve(&[lit(1, false)], 0), SolveStatus::Unsat);
        let core = s.proof_core().to_vec();
        assert_eq!(core, vec![0, 1]);
        // Without the assumption the instance is satisfiable.
        assert_eq!(s.solve(&[], 0), SolveStatus::Sat);
    }

    #[test]
    fn test_gate_encodings() {
        let mut s = Solver::new();
        // out3 = v1 & ~v2, buf4 = ~out3.
        s.add_and(3, 1, 2, false, true, 0);
        s.add_buffer(4, 3, true, 0);
        assert_eq!(s.solve(&[lit(1, false), lit(2, true)], 0), SolveStatus::Sat);
        assert!(s.var_value(3));
        assert!(!s.var_value(4));
        assert_eq!(s.solve(&[lit(4, false), lit(1, false)], 0), SolveStatus::Sat);
        assert!(s.var_value(2));
        s.add_const(2, true, 0);
        assert_eq!(s.solve(&[lit(4, false), lit(1, false)], 0), SolveStatus::Unsat);
    }

    #[test]
    fn test_bookmark_rollback_restores_state() {
        let mut s = Solver::new();
        s.add_clause(&[lit(1, false), lit(2, false)], 0);
        s.simplify();
        s.bookmark();
        let (vars, clauses) = (s.num_vars(), s.num_clauses());
        // Make it unsatisfiable, solve, then roll back.
        s.add_const(1, true, 1);
        s.add_const(2, true, 2);
        assert_eq!(s.solve(&[], 0), SolveStatus::Unsat);
        s.rollback();
        assert_eq!(s.num_vars(), vars);
        assert_eq!(s.num_clauses(), clauses);
        assert_eq!(s.solve(&[], 0), SolveStatus::Sat);
        // The epoch can be replayed with different clauses.
        s.add_const(1, false, 3);
        assert_eq!(s.solve(&[lit(2, true)], 0), SolveStatus::Sat);
        assert!(s.var_value(1));
    }

    #[test]
    fn test_rollback_drops_learnts_of_epoch() {
        let mut s = Solver::new();
        // A small pigeonhole-ish instance that forces learning.
        s.add_clause(&[lit(1, false), lit(2, false)], 0);
        s.add_clause(&[lit(3, false), lit(4, false)], 0);
        s.bookmark();
        s.add_clause(&[lit(1, true), lit(3, true)], 0);
        s.add_clause(&[lit(1, true), lit(4, true)], 0);
        s.add_clause(&[lit(2, true), lit(3, true)], 0);
        s.add_clause(&[lit(2, true), lit(4, true)], 0);
        assert_eq!(s.solve(&[], 0), SolveStatus::Unsat);
        s.rollback();
        assert_eq!(s.num_learnts(), 0);
        assert_eq!(s.solve(&[], 0), SolveStatus::Sat);
    }

    #[test]
    fn test_conflict_limit_returns_undef() {
        let mut s = Solver::new();
        // 6-variable parity-ish instance with no solution: every clause set
        // over 3 disjoint equivalences forced inconsistent.
        for v in [1usize, 3, 5] {
            s.add_clause(&[lit(v, false), lit(v + 1, false)], 0);
            s.add_clause(&[lit(v, true), lit(v + 1, true)], 0);
            s.add_clause(&[lit(v, false), lit(v + 1, true)], 0);
            s.add_clause(&[lit(v, true), lit(v + 1, false)], 0);
        }
        assert_eq!(s.solve(&[], 1), SolveStatus::Undef);
        assert_eq!(s.solve(&[], 0), SolveStatus::Unsat);
    }

    #[test]
    fn test_random_instances_against_brute_force() {
        use rand::rngs::OsRng;
        use rand::Rng;
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = OsRng;
        for _ in 0..40 {
            let n_vars = 5;
            let n_clauses = rng.gen_range(4..14);
            let clauses: Vec<Vec<Lit>> = (0..n_clauses)
                .map(|_| {
                    let len = rng.gen_range(1..=3);
                    (0..len)
                        .map(|_| Lit::new(rng.gen_range(1..=n_vars), rng.gen()))
                        .collect()
                })
                .collect();
            let brute_sat = (0..1u32 << n_vars).any(|assignment| {
                clauses.iter().all(|clause| {
                    clause
                        .iter()
                        .any(|l| l.apply(assignment >> (l.var() - 1) & 1 != 0))
                })
            });
            let mut s = Solver::new();
            for (i, clause) in clauses.iter().enumerate() {
                s.add_clause(clause, i as i32);
            }
            let status = s.solve(&[], 0);
            assert_eq!(
                status,
                if brute_sat {
                    SolveStatus::Sat
                } else {
                    SolveStatus::Unsat
                },
                "clauses: {clauses:?}"
            );
            if status == SolveStatus::Sat {
                // The model must satisfy every clause.
                for clause in &clauses {
                    assert!(clause.iter().any(|l| l.apply(s.var_value(l.var()))));
                }
            } else {
                // The core must itself be unsatisfiable.
                let core = s.proof_core().to_vec();
                let core_sat = (0..1u32 << n_vars).any(|assignment| {
                    core.iter().all(|&c| {
                        clauses[c]
                            .iter()
                            .any(|l| l.apply(assignment >> (l.var() - 1) & 1 != 0))
                    })
                });
                assert!(!core_sat, "core is not a proof: {core:?}");
            }
        }
    }

    #[test]
    fn test_implication_chain_core() {
        let mut s = Solver::new();
        s.set_learnt_max(2);
        let n = 8;
        // Chain of implications ending in a contradiction under assumption.
        for v in 1..n {
            s.add_clause(&[lit(v, true), lit(v + 1, false)], v as i32);
        }
        s.add_clause(&[lit(n, true)], 99);
        assert_eq!(s.solve(&[lit(1, false)], 0), SolveStatus::Unsat);
        assert!(s.proof_core().contains(&(n - 1)));
    }
}
