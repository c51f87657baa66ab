//! Frame-variable map.
//!
//! Maps `(object, frame)` pairs to SAT variables, allocating lazily and in
//! lockstep with the solver. Every allocation since the last mark is
//! journaled so a solver rollback can be mirrored exactly.

use super::GlaObj;

/// Journal tag for an object's initialization slot, the virtual frame before
/// frame 0 that holds its terminal variable.
const INIT_SLOT: u32 = u32::MAX;

pub struct FrameMap {
    /// Per-object variables indexed by frame; 0 means no variable yet.
    vars: Vec<Vec<i32>>,
    /// Per-object terminal variable of the virtual init frame; 0 when absent.
    init_vars: Vec<i32>,
    /// Pairs allocated since the last mark.
    just_added: Vec<(u32, u32)>,
    next_var: usize,
    mark_var: usize,
}

impl FrameMap {
    pub fn new(n_objs: usize) -> Self {
        Self {
            vars: vec![Vec::new(); n_objs],
            init_vars: vec![0; n_objs],
            just_added: Vec::new(),
            // Variable 0 stays reserved so that 0 can mean "absent".
            next_var: 1,
            mark_var: 1,
        }
    }

    /// Next variable the map would hand out; no mapped variable is ≥ this.
    pub fn num_vars(&self) -> usize {
        self.next_var
    }

    /// Whether a variable exists. Outputs and flop inputs are never mapped;
    /// they are resolved through their fanin.
    pub fn check_var(&self, objs: &[GlaObj], gla: u32, frame: usize) -> bool {
        let obj = &objs[gla as usize];
        assert!(!obj.is_po && !obj.is_ri, "PO/RI objects carry no variables");
        self.var(gla, frame) > 0
    }

    /// Raw read; 0 when absent.
    pub fn var(&self, gla: u32, frame: usize) -> i32 {
        self.vars[gla as usize].get(frame).copied().unwrap_or(0)
    }

    /// Existing variable, or a fresh sequential one recorded in the journal.
    pub fn get_var(&mut self, objs: &[GlaObj], gla: u32, frame: usize) -> usize {
        let obj = &objs[gla as usize];
        assert!(!obj.is_po && !obj.is_ri, "PO/RI objects carry no variables");
        let slots = &mut self.vars[gla as usize];
        if slots.len() <= frame {
            slots.resize(frame + 1, 0);
        }
        if slots[frame] == 0 {
            slots[frame] = self.next_var as i32;
            self.next_var += 1;
            self.just_added.push((gla, frame as u32));
        }
        slots[frame] as usize
    }

    /// The object's terminal variable in the virtual frame before frame 0,
    /// allocating on first use. Returns the variable and whether it is fresh,
    /// so the caller can emit its defining clause exactly once.
    pub fn get_init_var(&mut self, objs: &[GlaObj], gla: u32) -> (usize, bool) {
        let obj = &objs[gla as usize];
        assert!(!obj.is_po && !obj.is_ri, "PO/RI objects carry no variables");
        if self.init_vars[gla as usize] == 0 {
            self.init_vars[gla as usize] = self.next_var as i32;
            self.next_var += 1;
            self.just_added.push((gla, INIT_SLOT));
            return (self.init_vars[gla as usize] as usize, true);
        }
        (self.init_vars[gla as usize] as usize, false)
    }

    /// Starts a new journal epoch, aligned with a solver bookmark.
    pub fn mark(&mut self) {
        self.just_added.clear();
        self.mark_var = self.next_var;
    }

    /// Clears every variable allocated since the mark and resets the
    /// counter, mirroring the solver's rollback.
    pub fn shrink_after_rollback(&mut self) {
        for &(gla, frame) in &self.just_added {
            if frame == INIT_SLOT {
                debug_assert!(self.init_vars[gla as usize] > 0);
                self.init_vars[gla as usize] = 0;
            } else {
                debug_assert!(self.vars[gla as usize][frame as usize] > 0);
                self.vars[gla as usize][frame as usize] = 0;
            }
        }
        self.just_added.clear();
        self.next_var = self.mark_var;
    }
}
