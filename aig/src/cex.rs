//! Counterexample storage and concrete replay.

use cegar_util::BitVec;

use crate::Aig;

/// A counterexample trace for a sequential AIG.
///
/// The bit layout is the register initial values (always 0 in this engine)
/// followed by one block of primary-input assignments per frame, in input
/// declaration order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cex {
    pub reg_count: usize,
    pub pi_count: usize,
    /// Index of the asserted output.
    pub po_index: usize,
    /// Number of frames; the output is asserted in frame `frames - 1`.
    pub frames: usize,
    pub data: BitVec,
}

impl Cex {
    pub fn zeroes(reg_count: usize, pi_count: usize, frames: usize) -> Self {
        assert!(frames > 0);
        Self {
            reg_count,
            pi_count,
            po_index: 0,
            frames,
            data: BitVec::zeroes(reg_count + pi_count * frames),
        }
    }

    pub fn last_frame(&self) -> usize {
        self.frames - 1
    }

    pub fn pi_bit(&self, frame: usize, input: usize) -> bool {
        assert!(frame < self.frames && input < self.pi_count);
        self.data.get(self.reg_count + frame * self.pi_count + input)
    }

    pub fn set_pi_bit(&mut self, frame: usize, input: usize, value: bool) {
        assert!(frame < self.frames && input < self.pi_count);
        self.data
            .set(self.reg_count + frame * self.pi_count + input, value);
    }
}

/// Replays `cex` on the concrete model and reports whether the target output
/// is asserted in the last frame.
pub fn verify_cex(aig: &Aig, cex: &Cex) -> bool {
    if cex.pi_count != aig.pi_count() || cex.reg_count != aig.reg_count() {
        return false;
    }
    if cex.po_index >= aig.po_count() {
        return false;
    }
    let mut values = vec![false; aig.object_count()];
    let mut regs = vec![false; aig.reg_count()];
    for f in 0..cex.frames {
        for i in 0..aig.pi_count() {
            values[aig.pi(i)] = cex.pi_bit(f, i);
        }
        for r in 0..aig.reg_count() {
            values[aig.ro(r)] = regs[r];
        }
        // Ascending id order is topological for the combinational logic.
        for id in 1..aig.object_count() {
            if aig.is_and(id) {
                let f0 = aig.fanin0(id);
                let f1 = aig.fanin1(id);
                values[id] = (values[f0.id()] ^ f0.is_complement())
                    & (values[f1.id()] ^ f1.is_complement());
            } else if aig.is_co(id) {
                let f0 = aig.fanin0(id);
                values[id] = values[f0.id()] ^ f0.is_complement();
            }
        }
        for r in 0..aig.reg_count() {
            regs[r] = values[aig.ri(r)];
        }
    }
    values[aig.po(cex.po_index)]
}
