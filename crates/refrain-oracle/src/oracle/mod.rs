//! The pattern-index automaton.
//!
//! An [`Oracle`] is an append-only arena of states. State 0 is the root;
//! state `i > 0` corresponds to the `i-1`th input vector. Each state carries
//! a suffix link (`sfx`), forward transitions (`trn`), the inverse of the
//! suffix links (`rsfx`), the length of its longest repeated suffix (`lrs`)
//! and the symbol class it was merged into (`data`).
//!
//! Oracles are grown only through an [`crate::builder::OracleBuilder`] and are
//! read-only afterwards, so a built oracle can be shared across threads.

use serde::{Deserialize, Serialize};

use crate::config::OracleParams;

mod links;


/// How an oracle compares incoming vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    /// Thresholded distance over continuous features (variable Markov oracle).
    Continuous,
    /// Exact vector equality (plain factor oracle).
    Symbolic,
}

/// A built or partially built oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Oracle {
    kind: OracleKind,
    params: OracleParams,
    sfx: Vec<Option<usize>>,
    trn: Vec<Vec<usize>>,
    rsfx: Vec<Vec<usize>>,
    lrs: Vec<usize>,
    data: Vec<Option<usize>>,
    features: Vec<Vec<f64>>,
    latent: Vec<Vec<usize>>,
    max_lrs: Vec<usize>,
    avg_lrs: Vec<f64>,
}

impl Oracle {
    /// Creates an oracle holding only the root state.
    pub(crate) fn with_root(kind: OracleKind, params: OracleParams) -> Self {
        Self {
            kind,
            params,
            sfx: vec![None],
            trn: vec![Vec::new()],
            rsfx: vec![Vec::new()],
            lrs: vec![0],
            data: vec![None],
            features: vec![Vec::new()],
            latent: Vec::new(),
            max_lrs: vec![0],
            avg_lrs: vec![0.0],
        }
    }

    /// Appends one state for `vector` and returns its index.
    ///
    /// `distance` compares the new vector with stored ones and `accepts`
    /// decides whether a distance counts as a match. Among matching targets
    /// of one suffix state the nearest wins, earliest state on ties.
    pub(crate) fn push_state<D, A>(&mut self, vector: Vec<f64>, distance: D, accepts: A) -> usize
    where
        D: Fn(&[f64], &[f64]) -> f64,
        A: Fn(f64) -> bool,
    {
        let n = self.sfx.len();
        self.sfx.push(None);
        self.trn.push(Vec::new());
        self.rsfx.push(Vec::new());
        self.lrs.push(0);
        self.data.push(None);
        self.features.push(vector);
        self.trn[n - 1].push(n);

        let mut last_extended = n - 1;
        let mut k = self.sfx[n - 1];
        let mut candidate = None;

        while let Some(state) = k {
            let mut best: Option<(usize, f64)> = None;
            for &target in &self.trn[state] {
                let d = distance(&self.features[n], &self.features[target]);
                if accepts(d) && best.map_or(true, |(_, best_d)| d < best_d) {
                    best = Some((target, d));
                }
            }

            match best {
                Some((target, _)) => {
                    candidate = Some(target);
                    break;
                }
                None => {
                    self.trn[state].push(n);
                    last_extended = state;
                    k = self.sfx[state];
                }
            }
        }

        match candidate.and_then(|c| self.data[c].map(|symbol| (c, symbol))) {
            Some((target, symbol)) => {
                self.sfx[n] = Some(target);
                self.lrs[n] = self.len_common_suffix(last_extended, target - 1) + 1;
                self.latent[symbol].push(n);
                self.data[n] = Some(symbol);
            }
            None => {
                self.sfx[n] = Some(0);
                self.lrs[n] = 0;
                self.data[n] = Some(self.latent.len());
                self.latent.push(vec![n]);
            }
        }

        if let Some((better, lrs)) = self.find_better(n) {
            self.sfx[n] = Some(better);
            self.lrs[n] = lrs;
        }

        if let Some(s) = self.sfx[n] {
            self.rsfx[s].push(n);
        }

        self.max_lrs.push(self.max_lrs[n - 1].max(self.lrs[n]));
        let count = n as f64;
        self.avg_lrs
            .push(self.avg_lrs[n - 1] * ((count - 1.0) / count) + self.lrs[n] as f64 / count);

        n
    }

    /// Kind of comparison this oracle was built with.
    pub fn kind(&self) -> OracleKind {
        self.kind
    }

    /// Parameters this oracle was built with.
    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    /// Number of states including the root.
    pub fn n_states(&self) -> usize {
        self.sfx.len()
    }

    /// True when the oracle holds only the root.
    pub fn is_empty(&self) -> bool {
        self.n_states() <= 1
    }

    /// Index of the last state (0 for an empty oracle).
    pub fn last_state(&self) -> usize {
        self.n_states() - 1
    }

    /// True when `k` is the last state.
    pub fn is_last(&self, k: usize) -> bool {
        k == self.last_state()
    }

    /// Suffix link of `k`; the root has none.
    pub fn sfx(&self, k: usize) -> Option<usize> {
        self.sfx.get(k).copied().flatten()
    }

    /// Forward transitions of `k`, in insertion order.
    pub fn trn(&self, k: usize) -> &[usize] {
        self.trn.get(k).map_or(&[], Vec::as_slice)
    }

    /// States whose suffix link points at `k`, ascending.
    pub fn rsfx(&self, k: usize) -> &[usize] {
        self.rsfx.get(k).map_or(&[], Vec::as_slice)
    }

    /// Longest repeated suffix ending at `k`.
    pub fn lrs(&self, k: usize) -> usize {
        self.lrs.get(k).copied().unwrap_or(0)
    }

    /// Longest repeated suffix of every state.
    pub fn lrs_all(&self) -> &[usize] {
        &self.lrs
    }

    /// Symbol class of `k`; the root has none.
    pub fn symbol(&self, k: usize) -> Option<usize> {
        self.data.get(k).copied().flatten()
    }

    /// Stored feature vector of `k`; empty for the root.
    pub fn features(&self, k: usize) -> &[f64] {
        self.features.get(k).map_or(&[], Vec::as_slice)
    }

    /// Feature vectors of the real states, in input order.
    pub fn feature_rows(&self) -> &[Vec<f64>] {
        &self.features[1..]
    }

    /// Members of every symbol class.
    pub fn latent(&self) -> &[Vec<usize>] {
        &self.latent
    }

    /// Number of distinct symbols.
    pub fn num_symbols(&self) -> usize {
        self.latent.len()
    }

    /// Number of states whose suffix link points at the root.
    pub fn num_clusters(&self) -> usize {
        self.rsfx(0).len()
    }

    /// Running maximum of `lrs` over `0..=k`.
    pub fn max_lrs(&self, k: usize) -> usize {
        self.max_lrs.get(k).copied().unwrap_or(0)
    }

    /// Running maximum of `lrs` for every state.
    pub fn max_lrs_all(&self) -> &[usize] {
        &self.max_lrs
    }

    /// Running average of `lrs` over `0..=k`.
    pub fn avg_lrs(&self, k: usize) -> f64 {
        self.avg_lrs.get(k).copied().unwrap_or(0.0)
    }
}
