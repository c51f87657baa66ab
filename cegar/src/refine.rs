//! Refinement manager.
//!
//! Given a spurious abstract counterexample, selects a minimal-size set of
//! pseudo-primary inputs whose values must be preserved to keep the property
//! output asserted. The manager is started once against an AIG and reused
//! across calls; it holds no state tied to a particular counterexample.
//!
//! Each call runs three passes over the logic between the output and the
//! abstraction's inputs:
//! 1. collect the cone (flop outputs, ANDs, and outputs in topological
//!    order), expanding through register boundaries;
//! 2. sensitize forward, labeling every object with the Boolean value the
//!    counterexample implies and a justification priority (0 means the value
//!    is forced without any pseudo-input);
//! 3. justify backward from the asserted output, descending only into
//!    fanins whose priorities show they carry the reason, and collecting the
//!    pseudo-inputs reached.
//!
//! An empty result means the counterexample needs no pseudo-inputs at all,
//! so it is real. A post-filter keeps only selections that can constrain the
//! next SAT run: flop outputs, objects with a fanin inside the justified
//! area, and objects with shared fanins.

use anyhow::{bail, ensure, Result};
use itertools::Itertools;

use cegar_aig::cex::Cex;
use cegar_aig::tersim::{Ternary, TernarySim};
use cegar_aig::Aig;

const NO_LOCAL: u32 = u32::MAX;

/// Priorities are packed into 24 bits in spirit: a slot index within one
/// frame of the arena, always well under this bound.
const PRIO_LIMIT: u32 = 1 << 24;

#[derive(Clone, Copy, Default)]
struct RnmObj {
    value: bool,
    visited: bool,
    /// Set on the frame-0 slot once the object is visited in any frame.
    visited_frame0: bool,
    is_ppi: bool,
    prio: u32,
}

pub struct RnmMan<'a> {
    aig: &'a Aig,
    /// Cone objects (ROs, ANDs, COs) in topological order.
    objs: Vec<u32>,
    /// Per-object slot within a frame; `NO_LOCAL` outside the cone and map.
    local: Vec<u32>,
    /// Visit marks for cone collection, epoch-keyed.
    mark: Vec<u32>,
    epoch: u32,
    objs_frame: usize,
    frames: usize,
    /// Flat arena of `frames * objs_frame` refinement objects.
    rnm: Vec<RnmObj>,
    /// Fanin sharing counters for the post-filter, plus the ids touched.
    counts: Vec<u8>,
    touched: Vec<u32>,
    calls: u64,
    refined: u64,
}

impl<'a> RnmMan<'a> {
    pub fn new(aig: &'a Aig) -> Result<Self> {
        ensure!(
            aig.po_count() == 1,
            "refinement expects a single property output, found {}",
            aig.po_count()
        );
        Ok(Self {
            aig,
            objs: Vec::new(),
            local: vec![NO_LOCAL; aig.object_count()],
            mark: vec![0; aig.object_count()],
            epoch: 0,
            objs_frame: 0,
            frames: 0,
            rnm: Vec::new(),
            counts: vec![0; aig.object_count()],
            touched: Vec::new(),
            calls: 0,
            refined: 0,
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Total objects selected over the manager's lifetime.
    pub fn refined(&self) -> u64 {
        self.refined
    }

    /// Computes the refinement for a spurious abstract counterexample.
    ///
    /// `pi_map` assigns each counterexample input column to an AIG object:
    /// true primary inputs first, then pseudo-primary inputs, whose column
    /// index doubles as their justification priority. `post_filter` engages
    /// the reconvergence filter on the selection. Returns the selected
    /// pseudo-input object ids; an empty result means the counterexample is
    /// real. Fails if the sensitized output disagrees with the
    /// counterexample, which indicates a bookkeeping bug upstream.
    pub fn refine(
        &mut self,
        cex: &Cex,
        pi_map: &[u32],
        prop_fanout: bool,
        post_filter: bool,
    ) -> Result<Vec<u32>> {
        self.calls += 1;
        ensure!(
            cex.pi_count == pi_map.len(),
            "counterexample carries {} inputs but the map has {}",
            cex.pi_count,
            pi_map.len()
        );
        ensure!(
            !prop_fanout || self.aig.has_fanout(),
            "fanout propagation requires the static fanout index"
        );
        let result = self.refine_inner(cex, pi_map, prop_fanout, post_filter);
        // The local-slot table is shared scratch; clear it even on failure.
        self.cleanup(pi_map);
        result
    }

    fn refine_inner(
        &mut self,
        cex: &Cex,
        pi_map: &[u32],
        prop_fanout: bool,
        post_filter: bool,
    ) -> Result<Vec<u32>> {
        self.frames = cex.frames;
        self.collect(pi_map)?;
        self.objs_frame = 1 + pi_map.len() + self.objs.len();
        debug_assert!((self.objs_frame as u32) < PRIO_LIMIT);
        let needed = self.objs_frame * cex.frames;
        if self.rnm.len() < needed {
            self.rnm.resize(needed, RnmObj::default());
        }
        self.rnm[..needed].fill(RnmObj::default());

        let po_prio = self.sensitize(cex, pi_map)?;
        let mut selected = Vec::new();
        if po_prio > 0 {
            let start = self.aig.fanin0(self.aig.po(0)).id();
            self.justify(start, cex.last_frame(), prop_fanout, &mut selected);
            selected = selected.into_iter().sorted_unstable().dedup().collect();
        }
        let result = if post_filter {
            let filtered = self.filter_selected(&selected);
            if filtered.is_empty() {
                selected
            } else {
                filtered
            }
        } else {
            selected
        };
        self.refined += result.len() as u64;
        Ok(result)
    }

    // Pass 1: cone collection.

    fn collect(&mut self, pi_map: &[u32]) -> Result<()> {
        self.epoch += 1;
        self.local[0] = 0;
        self.mark[0] = self.epoch;
        for (i, &id) in pi_map.iter().enumerate() {
            let id = id as usize;
            ensure!(
                self.aig.is_ci(id) || self.aig.is_and(id),
                "map entry {id} is not a CI or AND"
            );
            self.local[id] = 1 + i as u32;
            self.mark[id] = self.epoch;
        }
        self.objs.clear();
        let base = 1 + pi_map.len();
        self.collect_cone(self.aig.po(0), base)?;
        // Expand the cone over register boundaries without duplication.
        let mut k = 0;
        while k < self.objs.len() {
            let id = self.objs[k] as usize;
            if self.aig.is_ro(id) {
                self.collect_cone(self.aig.ro_to_ri(id), base)?;
            }
            k += 1;
        }
        Ok(())
    }

    fn collect_cone(&mut self, start: usize, base: usize) -> Result<()> {
        let mut stack = vec![(start, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                self.local[id] = (base + self.objs.len()) as u32;
                self.objs.push(id as u32);
                continue;
            }
            if self.mark[id] == self.epoch {
                continue;
            }
            self.mark[id] = self.epoch;
            stack.push((id, true));
            if self.aig.is_co(id) {
                stack.push((self.aig.fanin0(id).id(), false));
            } else if self.aig.is_and(id) {
                stack.push((self.aig.fanin0(id).id(), false));
                stack.push((self.aig.fanin1(id).id(), false));
            } else if !self.aig.is_ro(id) {
                bail!("cone reaches object {id} outside the input map");
            }
        }
        Ok(())
    }

    // Pass 2: forward sensitization.

    fn sensitize(&mut self, cex: &Cex, pi_map: &[u32]) -> Result<u32> {
        let aig = self.aig;
        for f in 0..cex.frames {
            for (i, &id) in pi_map.iter().enumerate() {
                let value = cex.pi_bit(f, i);
                let is_pi = aig.is_pi(id as usize);
                let slot = self.slot(id as usize, f);
                let r = &mut self.rnm[slot];
                r.value = value;
                if !is_pi {
                    r.prio = (1 + i) as u32;
                    r.is_ppi = true;
                }
            }
            for k in 0..self.objs.len() {
                let id = self.objs[k] as usize;
                if aig.is_ro(id) {
                    if f == 0 {
                        // Zero-initialized: value 0, priority 0.
                        continue;
                    }
                    let src = *self.obj(aig.ro_to_ri(id), f - 1);
                    let r = self.obj_mut(id, f);
                    r.value = src.value;
                    r.prio = src.prio;
                } else if aig.is_co(id) {
                    let fanin = aig.fanin0(id);
                    let src = *self.obj(fanin.id(), f);
                    let r = self.obj_mut(id, f);
                    r.value = src.value ^ fanin.is_complement();
                    r.prio = src.prio;
                } else {
                    let f0 = aig.fanin0(id);
                    let f1 = aig.fanin1(id);
                    let r0 = *self.obj(f0.id(), f);
                    let r1 = *self.obj(f1.id(), f);
                    let v0 = r0.value ^ f0.is_complement();
                    let v1 = r1.value ^ f1.is_complement();
                    let r = self.obj_mut(id, f);
                    r.value = v0 & v1;
                    r.prio = if r.value {
                        r0.prio.max(r1.prio)
                    } else if !v0 && !v1 {
                        // Two independent reasons: the earlier one wins.
                        r0.prio.min(r1.prio)
                    } else if !v0 {
                        r0.prio
                    } else {
                        r1.prio
                    };
                }
            }
        }
        let po = *self.obj(aig.po(0), cex.last_frame());
        if !po.value {
            bail!("sensitized output is 0 in the last frame: SAT values and simulation disagree");
        }
        Ok(po.prio)
    }

    // Pass 3: backward justification.

    fn justify(&mut self, start: usize, last: usize, prop_fanout: bool, selected: &mut Vec<u32>) {
        let aig = self.aig;
        let mut stack: Vec<(u32, u32)> = vec![(start as u32, last as u32)];
        while let Some((id, f)) = stack.pop() {
            let (id, f) = (id as usize, f as usize);
            if self.obj(id, f).visited {
                continue;
            }
            if prop_fanout {
                self.justify_fanout(id, f, selected);
            } else {
                self.mark_visited(id, f);
            }
            let r = *self.obj(id, f);
            if r.is_ppi {
                debug_assert!(r.prio > 0);
                if !prop_fanout {
                    selected.push(id as u32);
                }
                continue;
            }
            if aig.is_pi(id) || aig.is_const0(id) {
                continue;
            }
            if aig.is_ro(id) {
                if f > 0 {
                    let prev = aig.fanin0(aig.ro_to_ri(id)).id();
                    stack.push((prev as u32, (f - 1) as u32));
                }
                continue;
            }
            debug_assert!(aig.is_and(id));
            let f0 = aig.fanin0(id);
            let f1 = aig.fanin1(id);
            let r0 = *self.obj(f0.id(), f);
            let r1 = *self.obj(f1.id(), f);
            if r.value {
                // Both sides are required unless rooted in constants.
                if r1.prio > 0 {
                    stack.push((f1.id() as u32, f as u32));
                }
                if r0.prio > 0 {
                    stack.push((f0.id() as u32, f as u32));
                }
            } else {
                let v0 = r0.value ^ f0.is_complement();
                let v1 = r1.value ^ f1.is_complement();
                if !v0 && !v1 {
                    // Either side justifies a 0 output; ties go to fanin 0.
                    if r0.prio <= r1.prio {
                        if r0.prio > 0 {
                            stack.push((f0.id() as u32, f as u32));
                        }
                    } else if r1.prio > 0 {
                        stack.push((f1.id() as u32, f as u32));
                    }
                } else if !v0 {
                    if r0.prio > 0 {
                        stack.push((f0.id() as u32, f as u32));
                    }
                } else if !v1 {
                    if r1.prio > 0 {
                        stack.push((f1.id() as u32, f as u32));
                    }
                } else {
                    unreachable!("AND sensitized to 0 without a 0 fanin");
                }
            }
        }
    }

    /// Marks the object and drives its implication through fanouts whose
    /// value is already determined by justified fanins, across frames via
    /// register boundaries. Selected pseudo-inputs are marked in every frame
    /// so later descents do not pick a redundant second witness.
    fn justify_fanout(&mut self, id: usize, f: usize, selected: &mut Vec<u32>) {
        let aig = self.aig;
        let last = self.frames - 1;
        let mut stack: Vec<(u32, u32)> = vec![(id as u32, f as u32)];
        while let Some((id, f)) = stack.pop() {
            let (id, f) = (id as usize, f as usize);
            if self.obj(id, f).visited {
                continue;
            }
            self.mark_visited(id, f);
            let r = *self.obj(id, f);
            if r.is_ppi {
                debug_assert!(r.prio > 0);
                for i in (0..=last).rev() {
                    if !self.obj(id, i).visited {
                        stack.push((id as u32, i as u32));
                    }
                }
                selected.push(id as u32);
                continue;
            }
            if (aig.is_co(id) && f == last) || aig.is_po(id) {
                continue;
            }
            if aig.is_ri(id) {
                let ro = aig.ri_to_ro(id);
                if !self.obj(ro, f + 1).visited {
                    stack.push((ro as u32, (f + 1) as u32));
                }
                continue;
            }
            debug_assert!(aig.is_ro(id) || aig.is_and(id));
            for &fanout in aig.fanouts(id) {
                let fanout = fanout as usize;
                if self.local[fanout] == NO_LOCAL {
                    continue;
                }
                let rf = *self.obj(fanout, f);
                if rf.is_ppi || rf.visited {
                    continue;
                }
                if aig.is_co(fanout) {
                    stack.push((fanout as u32, f as u32));
                    continue;
                }
                debug_assert!(aig.is_and(fanout));
                let g0 = aig.fanin0(fanout);
                let g1 = aig.fanin1(fanout);
                let r0 = *self.obj(g0.id(), f);
                let r1 = *self.obj(g1.id(), f);
                let v0 = r0.value ^ g0.is_complement();
                let v1 = r1.value ^ g1.is_complement();
                if (!v0 && r0.visited)
                    || (!v1 && r1.visited)
                    || (v0 && r0.visited && v1 && r1.visited)
                {
                    stack.push((fanout as u32, f as u32));
                }
            }
        }
    }

    // Pass 4: reconvergence post-filter.

    /// Keeps selections that can actually constrain the next run: flop
    /// outputs, objects with a constant or already-justified fanin, and
    /// objects sharing fanins with another selection. Never grows the set.
    fn filter_selected(&mut self, selected: &[u32]) -> Vec<u32> {
        let aig = self.aig;
        self.touched.clear();
        for &id in selected {
            let id = id as usize;
            if aig.is_ro(id) {
                continue;
            }
            for fanin in [aig.fanin0(id).id(), aig.fanin1(id).id()] {
                if self.counts[fanin] == 0 {
                    self.touched.push(fanin as u32);
                }
                if self.counts[fanin] < u8::MAX {
                    self.counts[fanin] += 1;
                }
            }
        }
        let mut kept = Vec::new();
        for &id in selected {
            let idu = id as usize;
            if aig.is_ro(idu) {
                kept.push(id);
                continue;
            }
            for fanin in [aig.fanin0(idu).id(), aig.fanin1(idu).id()] {
                let justified = self.local[fanin] != NO_LOCAL
                    && self.obj(fanin, 0).visited_frame0;
                if aig.is_const0(fanin) || justified || self.counts[fanin] > 1 {
                    kept.push(id);
                    break;
                }
            }
        }
        for k in 0..self.touched.len() {
            self.counts[self.touched[k] as usize] = 0;
        }
        kept
    }

    // Bookkeeping.

    fn slot(&self, id: usize, frame: usize) -> usize {
        debug_assert!(self.local[id] != NO_LOCAL);
        debug_assert!(frame < self.frames);
        frame * self.objs_frame + self.local[id] as usize
    }

    fn obj(&self, id: usize, frame: usize) -> &RnmObj {
        &self.rnm[self.slot(id, frame)]
    }

    fn obj_mut(&mut self, id: usize, frame: usize) -> &mut RnmObj {
        let slot = self.slot(id, frame);
        &mut self.rnm[slot]
    }

    fn mark_visited(&mut self, id: usize, frame: usize) {
        self.obj_mut(id, frame).visited = true;
        let zero = self.slot(id, 0);
        self.rnm[zero].visited_frame0 = true;
    }

    fn cleanup(&mut self, pi_map: &[u32]) {
        self.local[0] = NO_LOCAL;
        for &id in pi_map {
            self.local[id as usize] = NO_LOCAL;
        }
        for k in 0..self.objs.len() {
            self.local[self.objs[k] as usize] = NO_LOCAL;
        }
    }
}

/// Replays a refinement through the ternary simulator: primary inputs and
/// selected pseudo-inputs take their counterexample values, every other
/// pseudo-input is released to X. A correct refinement drives the output to
/// 1 in the last frame regardless of the X values.
pub fn verify_refinement(
    aig: &Aig,
    cex: &Cex,
    pi_map: &[u32],
    cone: &[u32],
    selected: &[u32],
) -> bool {
    let mut is_selected = vec![false; aig.object_count()];
    for &id in selected {
        is_selected[id as usize] = true;
    }
    let mut sim = TernarySim::new(aig);
    for f in 0..cex.frames {
        sim.set(0, Ternary::Zero);
        for (i, &id) in pi_map.iter().enumerate() {
            let id = id as usize;
            if !aig.is_pi(id) && !is_selected[id] {
                sim.set(id, Ternary::X);
            } else {
                sim.set(id, Ternary::from_bool(cex.pi_bit(f, i)));
            }
        }
        for &id in cone {
            let id = id as usize;
            if aig.is_co(id) {
                sim.eval_co(aig, id);
            } else if aig.is_and(id) {
                sim.eval_and(aig, id);
            } else if f == 0 {
                sim.set(id, Ternary::Zero);
            } else {
                sim.eval_ro(aig, id);
            }
        }
    }
    sim.get(aig.po(0)) == Ternary::One
}
