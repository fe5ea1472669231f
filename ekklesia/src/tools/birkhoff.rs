//! Birkhoff-interpolation coefficients for hierarchical secret sharing.
//!
//! Each party holds an evaluation of the `rank`-th derivative of the shared
//! polynomial at its abscissa `x`. The solver turns a set of such
//! (x, rank) parameters plus a threshold into the weight vector of the
//! `f(0)` functional: `sum_j w_j * f^(rank_j)(x_j) = f(0)` for every
//! polynomial of degree below the threshold. With all ranks zero this
//! reduces to the Lagrange coefficients.

use alloc::vec;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::curve::Scalar;
use crate::tools::hashing::{Chain, Hashable};

/// A party's share position: the abscissa and the derivative rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BkParameter {
    x: u32,
    rank: u32,
}

#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BirkhoffError {
    /// the Bk parameter set is empty
    EmptySlice,
    /// the threshold exceeds the number of shares
    LargeThreshold,
    /// the threshold is below the minimum of two
    SmallThreshold,
    /// a rank is too large for the threshold
    LargeRank,
    /// the rank set cannot interpolate the secret
    NotEnoughRanks,
}

impl BkParameter {
    /// `x` must be non-zero: the secret lives at the origin.
    pub fn new(x: u32, rank: u32) -> Option<Self> {
        if x == 0 {
            return None;
        }
        Some(Self { x, rank })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }
}

impl Hashable for BkParameter {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.x).chain(&self.rank)
    }
}

/// The falling factorial `c * (c-1) * ... * (c-r+1)` as a scalar
/// (the coefficient produced by differentiating `x^c` `r` times).
fn falling_factorial(c: u32, r: u32) -> Scalar {
    let mut result = Scalar::ONE;
    for i in 0..r {
        result = result * Scalar::from((c - i) as u64);
    }
    result
}

/// One row of the Birkhoff matrix: the value of `d^rank/dx^rank [x^c]`
/// at the party's abscissa, for `c` in `0..threshold`.
fn birkhoff_row(bk: &BkParameter, threshold: usize) -> Vec<Scalar> {
    let x = Scalar::from(bk.x as u64);
    (0..threshold as u32)
        .map(|c| {
            if c < bk.rank {
                return Scalar::ZERO;
            }
            let mut power = Scalar::ONE;
            for _ in 0..(c - bk.rank) {
                power = power * x;
            }
            falling_factorial(c, bk.rank) * power
        })
        .collect()
}

/// Computes the `f(0)` weight vector for the given parameter set.
///
/// The returned coefficients are ordered like the input slice. Fails with
/// [`BirkhoffError::NotEnoughRanks`] when the set is degenerate for the
/// threshold (e.g. duplicated positions, or ranks that skip the constant
/// term entirely).
pub(crate) fn birkhoff_coefficients(
    threshold: usize,
    bks: &[BkParameter],
) -> Result<Vec<Scalar>, BirkhoffError> {
    if bks.is_empty() {
        return Err(BirkhoffError::EmptySlice);
    }
    if threshold < 2 {
        return Err(BirkhoffError::SmallThreshold);
    }
    if threshold > bks.len() {
        return Err(BirkhoffError::LargeThreshold);
    }
    if bks.iter().any(|bk| bk.rank as usize >= threshold) {
        return Err(BirkhoffError::LargeRank);
    }

    let n = bks.len();

    // Solve `M^T w = e_0` where `M` is the n-by-threshold Birkhoff matrix:
    // Gaussian elimination on the transposed system, free variables
    // pinned to zero.
    let rows = bks
        .iter()
        .map(|bk| birkhoff_row(bk, threshold))
        .collect::<Vec<_>>();

    // Augmented system: `threshold` equations over `n` unknowns.
    let mut system = (0..threshold)
        .map(|eq| {
            let mut row = (0..n).map(|j| rows[j][eq]).collect::<Vec<_>>();
            row.push(if eq == 0 { Scalar::ONE } else { Scalar::ZERO });
            row
        })
        .collect::<Vec<_>>();

    let mut pivot_columns = Vec::with_capacity(threshold);
    let mut pivot_row = 0;
    for column in 0..n {
        let Some(found) = (pivot_row..threshold).find(|&r| system[r][column] != Scalar::ZERO)
        else {
            continue;
        };
        system.swap(pivot_row, found);

        let inv = system[pivot_row][column]
            .invert()
            .ok_or(BirkhoffError::NotEnoughRanks)?;
        for value in system[pivot_row].iter_mut() {
            *value = *value * inv;
        }
        for r in 0..threshold {
            if r != pivot_row && system[r][column] != Scalar::ZERO {
                let factor = system[r][column];
                for c in 0..=n {
                    let delta = factor * system[pivot_row][c];
                    system[r][c] = system[r][c] - delta;
                }
            }
        }
        pivot_columns.push(column);
        pivot_row += 1;
        if pivot_row == threshold {
            break;
        }
    }

    // A rank-deficient system cannot reproduce `f(0)`.
    if pivot_row < threshold {
        return Err(BirkhoffError::NotEnoughRanks);
    }

    let mut coefficients = vec![Scalar::ZERO; n];
    for (row, column) in pivot_columns.into_iter().enumerate() {
        coefficients[column] = system[row][n];
    }
    Ok(coefficients)
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use rand_core::OsRng;

    use super::{birkhoff_coefficients, BirkhoffError, BkParameter};
    use crate::curve::Scalar;

    fn evaluate_derivative(coefficients: &[Scalar], rank: u32, x: u32) -> Scalar {
        let x = Scalar::from(x as u64);
        let mut result = Scalar::ZERO;
        for (c, coefficient) in coefficients.iter().enumerate() {
            let c = c as u32;
            if c < rank {
                continue;
            }
            let mut term = *coefficient * super::falling_factorial(c, rank);
            for _ in 0..(c - rank) {
                term = term * x;
            }
            result = result + term;
        }
        result
    }

    #[test]
    fn lagrange_case() {
        // Ranks all zero: plain Lagrange interpolation at 0.
        let bks = [
            BkParameter::new(1, 0).unwrap(),
            BkParameter::new(2, 0).unwrap(),
        ];
        let coefficients = birkhoff_coefficients(2, &bks).unwrap();
        assert_eq!(coefficients[0], Scalar::from(2u64));
        assert_eq!(coefficients[1], -Scalar::ONE);

        // shares (2, 3) of the polynomial f(x) = 1 + x reconstruct f(0) = 1
        let recovered =
            coefficients[0] * Scalar::from(2u64) + coefficients[1] * Scalar::from(3u64);
        assert_eq!(recovered, Scalar::ONE);
    }

    #[test]
    fn hierarchical_case() {
        // A rank-1 party holds a derivative share; check against a random
        // degree-2 polynomial.
        let bks = [
            BkParameter::new(1, 0).unwrap(),
            BkParameter::new(2, 0).unwrap(),
            BkParameter::new(3, 1).unwrap(),
        ];
        let threshold = 3;
        let coefficients = birkhoff_coefficients(threshold, &bks).unwrap();

        let polynomial = (0..threshold)
            .map(|_| Scalar::random(&mut OsRng))
            .collect::<Vec<_>>();

        let shares = bks
            .iter()
            .map(|bk| evaluate_derivative(&polynomial, bk.rank(), bk.x()))
            .collect::<Vec<_>>();
        let recovered: Scalar = coefficients
            .iter()
            .zip(shares.iter())
            .map(|(c, s)| c * s)
            .sum();
        assert_eq!(recovered, polynomial[0]);
    }

    #[test]
    fn degenerate_sets_are_rejected() {
        let bks = [
            BkParameter::new(1, 1).unwrap(),
            BkParameter::new(2, 1).unwrap(),
        ];
        // Both parties hold derivative shares only: f(0) is unreachable.
        assert_eq!(
            birkhoff_coefficients(2, &bks),
            Err(BirkhoffError::NotEnoughRanks)
        );

        let bks = [
            BkParameter::new(1, 0).unwrap(),
            BkParameter::new(2, 0).unwrap(),
        ];
        assert_eq!(
            birkhoff_coefficients(3, &bks),
            Err(BirkhoffError::LargeThreshold)
        );
        assert_eq!(
            birkhoff_coefficients(1, &bks),
            Err(BirkhoffError::SmallThreshold)
        );
        assert_eq!(birkhoff_coefficients(2, &[]), Err(BirkhoffError::EmptySlice));

        let bks = [
            BkParameter::new(1, 0).unwrap(),
            BkParameter::new(2, 5).unwrap(),
        ];
        assert_eq!(
            birkhoff_coefficients(2, &bks),
            Err(BirkhoffError::LargeRank)
        );
    }
}
