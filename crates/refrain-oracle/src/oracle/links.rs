//! Suffix-link queries used during insertion and generation.

use std::collections::BTreeSet;

use super::Oracle;

impl Oracle {
    /// Length of the common suffix shared by `p1` and `p2`.
    ///
    /// Walks `p2` down its suffix chain until it shares `p1`'s suffix link or
    /// reaches the root.
    pub(crate) fn len_common_suffix(&self, p1: usize, p2: usize) -> usize {
        if self.sfx[p1] == Some(p2) {
            return self.lrs[p1];
        }

        let mut p2 = p2;
        while self.sfx[p2] != self.sfx[p1] && p2 != 0 {
            p2 = self.sfx[p2].unwrap_or(0);
        }
        self.lrs[p1].min(self.lrs[p2])
    }

    /// Looks for a sibling of `n` under its suffix target whose context one
    /// symbol further back also matches.
    ///
    /// Returns the better suffix target and the extended lrs.
    pub(crate) fn find_better(&self, n: usize) -> Option<(usize, usize)> {
        let target = self.sfx[n]?;
        let lrs = self.lrs[n];
        let symbol = self.data[n.checked_sub(lrs)?];

        self.rsfx[target]
            .iter()
            .copied()
            .find(|&j| {
                self.lrs[j] == lrs
                    && j.checked_sub(lrs).map(|back| self.data[back]) == Some(symbol)
            })
            .map(|j| (j, lrs + 1))
    }

    /// Every state reachable from `k` through suffix and reverse-suffix links.
    ///
    /// The root bounds the search: it is neither expanded nor returned, and
    /// `k` itself is excluded. The result is ascending.
    pub fn suffix_links(&self, k: usize) -> Vec<usize> {
        if k == 0 || k >= self.n_states() {
            return Vec::new();
        }

        let mut visited = BTreeSet::new();
        let mut worklist = vec![k];
        visited.insert(k);

        while let Some(state) = worklist.pop() {
            let up = self.sfx(state).into_iter();
            let down = self.rsfx(state).iter().copied();
            for next in up.chain(down) {
                if next != 0 && visited.insert(next) {
                    worklist.push(next);
                }
            }
        }

        visited.remove(&k);
        visited.into_iter().collect()
    }
}
