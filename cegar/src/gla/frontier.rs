//! Frontier selection: pseudo-primary inputs of the current abstraction and
//! the heuristic filters that keep refinement from wandering.

use super::GlaMan;

impl GlaMan<'_> {
    /// Inputs of the abstraction: true primary inputs and pseudo-primary
    /// inputs (any other fanin not itself included). Both deduplicated; the
    /// pseudo-inputs come in reverse id order.
    pub(crate) fn collect_pis_ppis(&self) -> (Vec<u32>, Vec<u32>) {
        let mut pis = Vec::new();
        let mut ppis = Vec::new();
        for &gla in self.abs.order() {
            let obj = self.obj(gla);
            debug_assert!(obj.is_const || obj.is_ro || obj.is_and);
            for &fanin in obj.fanins() {
                if self.abs.contains(fanin) {
                    continue;
                }
                if self.obj(fanin).is_pi {
                    pis.push(fanin);
                } else {
                    ppis.push(fanin);
                }
            }
        }
        pis.sort_unstable();
        pis.dedup();
        ppis.sort_unstable();
        ppis.dedup();
        ppis.reverse();
        (pis, ppis)
    }

    pub(crate) fn count_ppis(&self) -> usize {
        self.collect_pis_ppis().1.len()
    }

    /// Round-alternating frontier filter: drops pseudo-inputs none (or, on
    /// odd rounds, at most one) of whose own fanins are included yet, so the
    /// one-layer refinement does not chase logic far from the abstraction.
    /// Every fifth round passes everything through.
    pub(crate) fn explore_ppis(&mut self, ppis: &mut Vec<u32>) {
        let round = self.explore_round;
        self.explore_round += 1;
        if round % 5 == 0 {
            return;
        }
        let abs = &self.abs;
        let objs = &self.objs;
        ppis.retain(|&gla| {
            debug_assert!(!abs.contains(gla));
            let count = objs[gla as usize]
                .fanins()
                .iter()
                .filter(|&&f| abs.contains(f))
                .count();
            !(count == 0 || (round & 1 == 1 && count == 1))
        });
    }

    /// Members of a core that are not yet included; seeds the previous-core
    /// region for the next frame.
    pub(crate) fn region_start(&self, core: &[u32]) -> Vec<u32> {
        core.iter()
            .copied()
            .filter(|&gla| !self.abs.contains(gla))
            .collect()
    }

    /// Objects adjacent to the previous core: fanins of its members that are
    /// not included, drawn from `selected` when given, from the whole arena
    /// otherwise.
    pub(crate) fn region_filter(&mut self, selected: Option<&[u32]>, prev_core: &[u32]) -> Vec<u32> {
        for &gla in prev_core {
            let fanins = self.obj(gla).fanins().to_vec();
            for fanin in fanins {
                self.objs[fanin as usize].mark = true;
            }
        }
        let mut result = Vec::new();
        match selected {
            None => {
                for gla in 1..self.objs.len() as u32 {
                    if !self.abs.contains(gla) && self.objs[gla as usize].mark {
                        result.push(gla);
                    }
                }
            }
            Some(selected) => {
                for &gla in selected {
                    if !self.abs.contains(gla) && self.objs[gla as usize].mark {
                        result.push(gla);
                    }
                }
            }
        }
        for &gla in prev_core {
            let fanins = self.obj(gla).fanins().to_vec();
            for fanin in fanins {
                self.objs[fanin as usize].mark = false;
            }
        }
        result
    }

    /// Previous-core restriction of the frontier: most rounds the candidate
    /// set is replaced by the core's neighborhood plus any old candidate
    /// with two or more fanins already placed; every tenth round only the
    /// region itself is renewed.
    pub(crate) fn explore_ppis2(&mut self, ppis: &mut Vec<u32>) {
        let Some(prev) = self.prev_core.take() else {
            return;
        };
        let round = self.region_round;
        self.region_round += 1;
        if round % 10 == 0 {
            let region = self.region_filter(Some(ppis.as_slice()), &prev);
            self.prev_core = Some(region);
            return;
        }
        let region = self.region_filter(None, &prev);
        let old = std::mem::take(ppis);
        *ppis = region.clone();
        let mut in_new = vec![false; self.objs.len()];
        for &gla in ppis.iter() {
            in_new[gla as usize] = true;
        }
        for &gla in &old {
            if in_new[gla as usize] {
                continue;
            }
            let count = self.objs[gla as usize]
                .fanins()
                .iter()
                .filter(|&&f| self.abs.contains(f) || in_new[f as usize])
                .count();
            if count >= 2 {
                ppis.push(gla);
            }
        }
        self.prev_core = Some(region);
    }
}
