//! Combine functions for resolving writes to the same key.
//!
//! A reducer is any `Fn(V, V) -> V` taking the value already stored and the
//! incoming one, in that order. The functions here are plain generics, so they
//! can be passed by path: `map.async_set_with(k, v, reducer::sum)`.
//!
//! Associativity and commutativity are the caller's responsibility. Writes to
//! one key may be pre-combined on the sending side before reaching their
//! owner, so a reducer that is not associative gives order-dependent results.

use std::ops::{Add, Mul};

/// Add the incoming value to the stored one.
#[inline]
pub fn sum<V: Add<Output = V>>(old: V, new: V) -> V {
    old + new
}

/// Keep the value that was stored first.
#[inline]
pub fn keep<V>(old: V, _new: V) -> V {
    old
}

/// Replace the stored value with the incoming one.
#[inline]
pub fn overwrite<V>(_old: V, new: V) -> V {
    new
}

/// Keep the larger of the two values.
#[inline]
pub fn max<V: PartialOrd>(old: V, new: V) -> V {
    if new > old {
        new
    } else {
        old
    }
}

/// Keep the smaller of the two values.
#[inline]
pub fn min<V: PartialOrd>(old: V, new: V) -> V {
    if new < old {
        new
    } else {
        old
    }
}

/// Multiply the stored value by the incoming one.
#[inline]
pub fn product<V: Mul<Output = V>>(old: V, new: V) -> V {
    old * new
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reducers() {
        assert_eq!(sum(2, 3), 5);
        assert_eq!(keep(2, 3), 2);
        assert_eq!(overwrite(2, 3), 3);
        assert_eq!(max(2, 3), 3);
        assert_eq!(min(2, 3), 2);
        assert_eq!(product(2, 3), 6);
        assert_eq!(max(1.5, -1.0), 1.5);
    }

    #[test]
    fn test_reducers_as_closure_values() {
        let reducers: [fn(i64, i64) -> i64; 3] = [sum, keep, overwrite];
        let folded: Vec<i64> = reducers.iter().map(|r| [1, 2, 3].into_iter().reduce(r).unwrap()).collect();
        assert_eq!(folded, vec![6, 1, 3]);
    }
}
