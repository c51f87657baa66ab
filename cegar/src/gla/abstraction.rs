//! The abstraction set: membership flags plus an insertion-ordered list.
//!
//! Iteration is always over the list, so clause loading and reporting are
//! deterministic. Rollback restores the set to an earlier size exactly.

pub struct Abstraction {
    in_abs: Vec<bool>,
    order: Vec<u32>,
}

impl Abstraction {
    pub fn new(n_objs: usize) -> Self {
        Self {
            in_abs: vec![false; n_objs],
            order: Vec::new(),
        }
    }

    pub fn contains(&self, gla: u32) -> bool {
        self.in_abs[gla as usize]
    }

    /// Adds an object; returns false if it was already included.
    pub fn add(&mut self, gla: u32) -> bool {
        if self.in_abs[gla as usize] {
            return false;
        }
        self.in_abs[gla as usize] = true;
        self.order.push(gla);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Members in insertion order.
    pub fn order(&self) -> &[u32] {
        &self.order
    }

    /// Truncates back to a previously recorded size, clearing the membership
    /// flag of everything beyond it.
    pub fn rollback_to(&mut self, old_len: usize) {
        assert!(old_len <= self.order.len());
        for &gla in &self.order[old_len..] {
            debug_assert!(self.in_abs[gla as usize]);
            self.in_abs[gla as usize] = false;
        }
        self.order.truncate(old_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut abs = Abstraction::new(8);
        assert!(abs.add(3));
        assert!(!abs.add(3));
        assert!(abs.add(5));
        assert_eq!(abs.order(), &[3, 5]);
        assert_eq!(abs.len(), 2);
        assert!(abs.contains(3) && abs.contains(5) && !abs.contains(4));
    }

    #[test]
    fn test_rollback_restores_exactly() {
        let mut abs = Abstraction::new(8);
        abs.add(1);
        abs.add(2);
        let mark = abs.len();
        abs.add(3);
        abs.add(4);
        // Re-adding an existing member must not duplicate it in the list.
        abs.add(2);
        abs.rollback_to(mark);
        assert_eq!(abs.order(), &[1, 2]);
        assert!(!abs.contains(3) && !abs.contains(4));
        assert!(abs.contains(2));
        // The rolled-back objects can be re-added.
        assert!(abs.add(3));
        assert_eq!(abs.order(), &[1, 2, 3]);
    }
}
