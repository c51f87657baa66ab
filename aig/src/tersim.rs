//! Three-valued simulation over {0, 1, X}.
//!
//! Used to check that a refinement keeps the property output asserted when
//! every unselected pseudo-input is released to X.

use crate::Aig;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum Ternary {
    Zero,
    One,
    #[default]
    X,
}

impl Ternary {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::One
        } else {
            Self::Zero
        }
    }

    /// AND is 0-dominant: a single 0 fanin forces 0 regardless of X.
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Zero, _) | (_, Self::Zero) => Self::Zero,
            (Self::One, Self::One) => Self::One,
            _ => Self::X,
        }
    }

    pub fn complement_if(self, complement: bool) -> Self {
        match (self, complement) {
            (Self::Zero, true) => Self::One,
            (Self::One, true) => Self::Zero,
            (v, _) => v,
        }
    }
}

/// Per-object ternary values for one frame of simulation.
///
/// Frames are advanced in place: register outputs read the value their
/// register input held in the previous frame, so within a frame the caller
/// must evaluate register outputs before overwriting the register inputs.
pub struct TernarySim {
    values: Vec<Ternary>,
}

impl TernarySim {
    pub fn new(aig: &Aig) -> Self {
        let mut values = vec![Ternary::X; aig.object_count()];
        values[0] = Ternary::Zero;
        Self { values }
    }

    pub fn get(&self, id: usize) -> Ternary {
        self.values[id]
    }

    pub fn set(&mut self, id: usize, value: Ternary) {
        self.values[id] = value;
    }

    pub fn eval_and(&mut self, aig: &Aig, id: usize) {
        let f0 = aig.fanin0(id);
        let f1 = aig.fanin1(id);
        let v0 = self.values[f0.id()].complement_if(f0.is_complement());
        let v1 = self.values[f1.id()].complement_if(f1.is_complement());
        self.values[id] = v0.and(v1);
    }

    pub fn eval_co(&mut self, aig: &Aig, id: usize) {
        let f0 = aig.fanin0(id);
        self.values[id] = self.values[f0.id()].complement_if(f0.is_complement());
    }

    /// Copies the previous-frame value of the feeding register input.
    pub fn eval_ro(&mut self, aig: &Aig, id: usize) {
        let ri = aig.ro_to_ri(id);
        self.values[id] = self.values[ri];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ternary_and_table() {
        use Ternary::*;
        assert_eq!(Zero.and(X), Zero);
        assert_eq!(X.and(Zero), Zero);
        assert_eq!(One.and(One), One);
        assert_eq!(One.and(X), X);
        assert_eq!(X.and(X), X);
    }

    #[test]
    fn test_x_propagation_through_flop() {
        // PI and RO conjoined into the PO; the RI copies the PI.
        let mut aig = Aig::new();
        let pi = aig.add_ci();
        let ro = aig.add_ci();
        let out = aig.add_and(pi, ro);
        aig.add_co(out);
        aig.add_co(pi);
        aig.set_reg_count(1);

        let ro_id = aig.ro(0);
        let ri_id = aig.ro_to_ri(ro_id);
        let and_id = out.id();
        let po_id = aig.po(0);

        let mut sim = TernarySim::new(&aig);
        // Frame 0: flop initializes to 0, input unknown.
        sim.set(aig.pi(0), Ternary::X);
        sim.set(ro_id, Ternary::Zero);
        sim.eval_and(&aig, and_id);
        sim.eval_co(&aig, po_id);
        sim.eval_co(&aig, ri_id);
        assert_eq!(sim.get(po_id), Ternary::Zero);
        assert_eq!(sim.get(ri_id), Ternary::X);

        // Frame 1: the X stored in the flop absorbs the known input.
        sim.set(aig.pi(0), Ternary::One);
        sim.eval_ro(&aig, ro_id);
        sim.eval_and(&aig, and_id);
        sim.eval_co(&aig, po_id);
        assert_eq!(sim.get(ro_id), Ternary::X);
        assert_eq!(sim.get(po_id), Ternary::X);
    }
}
