//! Compror encoding and information rate.
//!
//! The compror code compresses an oracle into codewords: a new symbol, or a
//! copy of an earlier block found through the suffix links. The information
//! rate compares the cost of coding each state without context (`h0`) with
//! its cost given the compror code (`h1`); it is the score the threshold
//! sweep maximizes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::oracle::Oracle;

/// One compror codeword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codeword {
    /// Block length; 0 for a new symbol.
    pub len: usize,
    /// For a new symbol, the state it introduces. For a copy, the 1-based
    /// start of the earlier block being copied.
    pub pos: usize,
}

impl Codeword {
    /// True when the codeword introduces a new symbol.
    pub fn is_new_symbol(&self) -> bool {
        self.len == 0
    }

    /// Number of states the codeword covers.
    pub fn span(&self) -> usize {
        self.len.max(1)
    }
}

/// Compror code of `oracle`; consecutive codewords may overlap their sources.
pub fn encode(oracle: &Oracle) -> Vec<Codeword> {
    let last = oracle.last_state();
    let lrs = oracle.lrs_all();
    let mut code = Vec::new();

    let mut j = 0;
    let mut i = 0;
    while j < last {
        while i < last && lrs[i + 1] >= i - j + 1 {
            i += 1;
        }
        if i == j {
            i += 1;
            code.push(Codeword { len: 0, pos: i });
        } else {
            code.push(Codeword {
                len: i - j,
                pos: copy_start(oracle, i, j),
            });
        }
        j = i;
    }
    code
}

/// Non-overlapping variant of [`encode`]: a copy block never reads from the
/// part of the sequence it is itself encoding.
pub fn segment(oracle: &Oracle) -> Vec<Codeword> {
    let last = oracle.last_state();
    let lrs = oracle.lrs_all();
    let mut seg = Vec::new();

    let mut j = 0;
    let mut i = 0;
    while j < last {
        while i < last && lrs[i + 1] >= i - j + 1 {
            i += 1;
        }
        if i == j {
            i += 1;
            seg.push(Codeword { len: 0, pos: i });
        } else {
            let sfx = oracle.sfx(i).unwrap_or(0);
            if sfx + lrs[i] <= i {
                seg.push(Codeword {
                    len: i - j,
                    pos: copy_start(oracle, i, j),
                });
            } else {
                // Source overlaps the block: split at the overlap.
                let mut inner = (j + i).saturating_sub(sfx).min(i);
                seg.push(Codeword {
                    len: inner - j,
                    pos: copy_start(oracle, i, j),
                });
                let inner_start = inner;
                while inner < i
                    && lrs[inner + 1] as isize - lrs[inner_start] as isize
                        >= (inner - inner_start + 1) as isize
                {
                    inner += 1;
                }
                if inner == inner_start {
                    inner += 1;
                    seg.push(Codeword { len: 0, pos: inner });
                } else {
                    seg.push(Codeword {
                        len: inner - inner_start,
                        pos: copy_start(oracle, inner, inner_start),
                    });
                }
                i = i.max(inner);
            }
        }
        j = i;
    }
    seg
}

/// `sfx[i] - (i - j) + 1`, clamped at the first state.
fn copy_start(oracle: &Oracle, i: usize, j: usize) -> usize {
    let sfx = oracle.sfx(i).unwrap_or(0);
    (sfx + j + 1).saturating_sub(i).max(1)
}

/// Which information-rate formula to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IrMethod {
    /// Cumulative codeword counts over the compror code.
    #[default]
    Cumulative,
    /// Context cost from the running maximum lrs.
    MaxLrs,
    /// Whole-oracle cluster count against the final maximum lrs.
    Fixed,
}

impl IrMethod {
    /// Name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            IrMethod::Cumulative => "cumulative",
            IrMethod::MaxLrs => "max-lrs",
            IrMethod::Fixed => "fixed",
        }
    }
}

impl fmt::Display for IrMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IrMethod {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cumulative" | "cum" => Ok(IrMethod::Cumulative),
            "max-lrs" | "cum2" => Ok(IrMethod::MaxLrs),
            "fixed" => Ok(IrMethod::Fixed),
            other => Err(OracleError::config(format!(
                "unknown information-rate method '{}'",
                other
            ))),
        }
    }
}

/// Per-state information-rate curve of an oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InformationRate {
    /// `max(0, alpha * h0 - h1)` for every real state.
    pub ir: Vec<f64>,
    /// Context-free coding cost.
    pub h0: Vec<f64>,
    /// Coding cost given the compror code.
    pub h1: Vec<f64>,
}

impl InformationRate {
    /// Total information rate.
    pub fn total(&self) -> f64 {
        self.ir.iter().sum()
    }

    /// Sum of `h0`.
    pub fn h0_total(&self) -> f64 {
        self.h0.iter().sum()
    }

    /// Sum of `h1`.
    pub fn h1_total(&self) -> f64 {
        self.h1.iter().sum()
    }
}

/// Computes the information-rate curve of `oracle`.
pub fn information_rate(oracle: &Oracle, method: IrMethod, alpha: f64) -> InformationRate {
    let code = encode(oracle);
    let states = oracle.last_state();
    let block_len = block_lengths(&code, states);

    let (h0, h1): (Vec<f64>, Vec<f64>) = match method {
        IrMethod::Cumulative => {
            let mut new_symbols = vec![0.0; states];
            let mut codewords = vec![0.0; states];
            let mut j = 0;
            for c in &code {
                if j >= states {
                    break;
                }
                if c.is_new_symbol() {
                    new_symbols[j] = 1.0;
                }
                codewords[j] = 1.0;
                j += c.span();
            }
            let h0 = cumulative_log2(&new_symbols);
            let h1 = cumulative_log2(&codewords)
                .into_iter()
                .zip(&block_len)
                .map(|(h, &bl)| h / bl)
                .collect();
            (h0, h1)
        }
        IrMethod::MaxLrs => {
            let roots: Vec<f64> = (1..=states)
                .map(|k| if oracle.sfx(k) == Some(0) { 1.0 } else { 0.0 })
                .collect();
            let h0 = cumulative_log2(&roots);
            let h1 = (0..states)
                .map(|t| {
                    let m = oracle.max_lrs(t + 1);
                    let base = ((t + 1) as f64).log2();
                    let h = if m == 0 { base } else { base + (m as f64).log2() };
                    h / block_len[t]
                })
                .collect();
            (h0, h1)
        }
        IrMethod::Fixed => {
            let h0 = safe_log2(oracle.num_clusters() as f64);
            let final_max = oracle.max_lrs(states);
            let mut h1 = safe_log2(states as f64);
            if final_max > 0 {
                h1 += (final_max as f64).log2();
            }
            (
                vec![h0; states],
                block_len.iter().map(|bl| h1 / bl).collect(),
            )
        }
    };

    let ir = h0
        .iter()
        .zip(&h1)
        .map(|(&h0, &h1)| (alpha * h0 - h1).max(0.0))
        .collect();

    InformationRate { ir, h0, h1 }
}

/// Length of the codeword block each real state belongs to (1 for new
/// symbols).
fn block_lengths(code: &[Codeword], states: usize) -> Vec<f64> {
    let mut block_len = vec![1.0; states];
    let mut j = 0;
    for c in code {
        let end = (j + c.span()).min(states);
        for slot in &mut block_len[j.min(states)..end] {
            *slot = c.span() as f64;
        }
        j += c.span();
    }
    block_len
}

fn cumulative_log2(flags: &[f64]) -> Vec<f64> {
    let mut running = 0.0;
    flags
        .iter()
        .map(|f| {
            running += f;
            safe_log2(running)
        })
        .collect()
}

/// `log2(x)` with `log2(0)` taken as 0.
fn safe_log2(x: f64) -> f64 {
    if x > 0.0 {
        x.log2()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_oracle;
    use crate::config::OracleParams;
    use crate::distance::DistanceKind;
    use pretty_assertions::assert_eq;

    fn oracle_for(values: &[f64]) -> Oracle {
        let features: Vec<Vec<f64>> = values.iter().map(|&v| vec![v]).collect();
        let params = OracleParams::new(1)
            .with_threshold(0.1)
            .with_distance(DistanceKind::Euclidean);
        build_oracle(&features, &params).unwrap()
    }

    #[test]
    fn test_encode_alternating() {
        let oracle = oracle_for(&[0.0, 1.0, 0.0, 1.0, 2.0]);
        let code = encode(&oracle);
        assert_eq!(
            code,
            vec![
                Codeword { len: 0, pos: 1 },
                Codeword { len: 0, pos: 2 },
                Codeword { len: 2, pos: 1 },
                Codeword { len: 0, pos: 5 },
            ]
        );
        let covered: usize = code.iter().map(Codeword::span).sum();
        assert_eq!(covered, oracle.last_state());
    }

    #[test]
    fn test_encode_all_distinct() {
        let oracle = oracle_for(&[0.0, 1.0, 2.0]);
        let code = encode(&oracle);
        assert!(code.iter().all(Codeword::is_new_symbol));
        assert_eq!(code.len(), 3);
    }

    #[test]
    fn test_segment_covers_sequence() {
        let oracle = oracle_for(&[0.0, 0.0, 0.0, 0.0, 1.0]);
        let seg = segment(&oracle);
        let covered: usize = seg.iter().map(Codeword::span).sum();
        assert_eq!(covered, oracle.last_state());
        assert!(seg[0].is_new_symbol());
    }

    #[test]
    fn test_cumulative_ir_alternating() {
        let oracle = oracle_for(&[0.0, 1.0, 0.0, 1.0, 2.0]);
        let rate = information_rate(&oracle, IrMethod::Cumulative, 1.0);

        // Codewords begin at states 1, 2, 3 and 5; new symbols at 1, 2, 5.
        let expected_h0 = vec![0.0, 1.0, 1.0, 1.0, 3f64.log2()];
        let expected_h1 = vec![0.0, 1.0, 3f64.log2() / 2.0, 3f64.log2() / 2.0, 2.0];
        for (got, want) in rate.h0.iter().zip(&expected_h0) {
            assert!((got - want).abs() < 1e-12);
        }
        for (got, want) in rate.h1.iter().zip(&expected_h1) {
            assert!((got - want).abs() < 1e-12);
        }
        let copy_gain = 1.0 - 3f64.log2() / 2.0;
        assert!((rate.ir[2] - copy_gain).abs() < 1e-12);
        assert!((rate.total() - 2.0 * copy_gain).abs() < 1e-12);
        assert!(rate.ir.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn test_no_repetition_has_zero_ir() {
        let oracle = oracle_for(&[0.0, 1.0, 2.0, 3.0]);
        for method in [IrMethod::Cumulative, IrMethod::MaxLrs, IrMethod::Fixed] {
            let rate = information_rate(&oracle, method, 1.0);
            assert_eq!(rate.ir.len(), 4);
            assert_eq!(rate.total(), 0.0, "method {}", method);
        }
    }

    #[test]
    fn test_max_lrs_method_rewards_repetition() {
        let repeated = oracle_for(&[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let rate = information_rate(&repeated, IrMethod::MaxLrs, 1.0);
        assert_eq!(rate.ir.len(), 6);
        assert!(rate.ir.iter().all(|x| x.is_finite() && *x >= 0.0));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("cum".parse::<IrMethod>().unwrap(), IrMethod::Cumulative);
        assert_eq!("max-lrs".parse::<IrMethod>().unwrap(), IrMethod::MaxLrs);
        assert_eq!("Fixed".parse::<IrMethod>().unwrap(), IrMethod::Fixed);
        assert!("cum3".parse::<IrMethod>().is_err());
    }
}
