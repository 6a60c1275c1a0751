// src/engine/optimizer.rs
// ============================================================================
// Integer expand-then-refine maximizer for round-trip arbitrage profit.
//
// The objective is a black box (two chained pool quotes), assumed strictly
// concave in the input amount. The search:
//   1. walks a guess sequence (1, unit, 2*unit, 4*unit, ...) while f improves,
//      keeping the last three points as the bracket;
//   2. on the first non-improvement, takes mid = (left + right) / 2 and stops if
//      the bracket is tight enough (xatol / xrtol) or f barely moved (fatol);
//   3. otherwise restarts from the 5-point seed
//      [left, (left+mid)/2, mid, (mid+right)/2, right].
//
// Each f(x) is a full pool simulation, so callers wrap it in `Memoized`.
// ============================================================================

use std::collections::HashMap;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};

/// Search tolerances.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchParams {
    /// Absolute tolerance on x, raw units.
    pub xatol: BigInt,
    /// Relative tolerance on x.
    pub xrtol: f64,
    /// Absolute tolerance on f(x), raw units.
    pub fatol: BigInt,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            xatol: BigInt::from(1),
            xrtol: 1e-5,
            fatol: BigInt::from(1),
        }
    }
}

/// `x0`, then `x1`, `2*x1`, `4*x1`, ... without end.
pub fn gen_guess(x0: BigInt, x1: BigInt) -> impl Iterator<Item = BigInt> {
    let doubling = std::iter::successors(Some(x1), |x| Some(x * 2));
    std::iter::once(x0).chain(doubling)
}

/// Returns an `x` maximizing `f`, assuming `f` strictly concave.
///
/// Errors from `f` abort the search. If the guess sequence runs dry while f
/// is still improving, the best point seen is returned.
pub fn maximize<F, E>(
    mut f: F,
    guesses: impl Iterator<Item = BigInt> + 'static,
    params: &SearchParams,
) -> Result<BigInt, E>
where
    F: FnMut(&BigInt) -> Result<BigInt, E>,
{
    let mut seq: Box<dyn Iterator<Item = BigInt>> = Box::new(guesses);
    let mut bounds = match (seq.next(), seq.next()) {
        (Some(a), Some(b)) => vec![a, b],
        (Some(a), None) => return Ok(a),
        _ => return Ok(BigInt::zero()),
    };
    let mut y_prev = BigInt::zero();
    let mut evaluations = 0usize;

    loop {
        let last = bounds[bounds.len() - 1].clone();
        let y = f(&last)?;
        evaluations += 1;

        if y > y_prev {
            let Some(next) = seq.next() else {
                log::debug!("guesses exhausted after {} evaluations", evaluations);
                return Ok(last);
            };
            let before_last = bounds[bounds.len() - 2].clone();
            bounds = vec![before_last, last, next];
            y_prev = y;
            continue;
        }

        let left = bounds[0].clone();
        let mid = Integer::div_floor(&(&left + &last), &BigInt::from(2));
        let width = &mid - &left;
        let relative = match (width.to_f64(), mid.to_f64()) {
            (Some(w), Some(m)) if m != 0.0 => w / m,
            _ => f64::INFINITY,
        };

        if width <= params.xatol || relative <= params.xrtol || &y_prev - &y <= params.fatol {
            log::debug!("maximize converged at {} after {} evaluations", mid, evaluations);
            return Ok(mid);
        }

        let seed = vec![
            left.clone(),
            Integer::div_floor(&(&left + &mid), &BigInt::from(2)),
            mid.clone(),
            Integer::div_floor(&(&mid + &last), &BigInt::from(2)),
            last,
        ];
        seq = Box::new(seed.into_iter());
        bounds = match (seq.next(), seq.next()) {
            (Some(a), Some(b)) => vec![a, b],
            _ => return Ok(mid),
        };
        y_prev = BigInt::zero();
    }
}

/// Unbounded cache in front of a fallible function of an integer amount.
pub struct Memoized<F, V> {
    f: F,
    cache: HashMap<BigInt, V>,
}

impl<F, V, E> Memoized<F, V>
where
    F: FnMut(&BigInt) -> Result<V, E>,
    V: Clone,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, x: &BigInt) -> Result<V, E> {
        if let Some(v) = self.cache.get(x) {
            return Ok(v.clone());
        }
        let v = (self.f)(x)?;
        self.cache.insert(x.clone(), v.clone());
        Ok(v)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
