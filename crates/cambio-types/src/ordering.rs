//! Natural ordering over row values with nulls sorted first.
//!
//! This is the default comparator of every post-aggregator: the engine uses it
//! to sort and merge result rows on a computed column, so it must be a total
//! order even across mismatched variants.

use std::cmp::Ordering;

use crate::value::TypedValue;

/// Compare two values: `Null` before everything, then booleans, numbers,
/// strings, lists and structs. Numbers compare exactly by value across
/// variants, so `Int64(2^53 + 1)` sorts above `Double(2^53)`.
pub fn natural_nulls_first(left: &TypedValue, right: &TypedValue) -> Ordering {
    let by_rank = rank(left).cmp(&rank(right));
    if by_rank != Ordering::Equal {
        return by_rank;
    }

    match (left, right) {
        (TypedValue::Null, TypedValue::Null) => Ordering::Equal,
        (TypedValue::Bool(a), TypedValue::Bool(b)) => a.cmp(b),
        (TypedValue::String(a), TypedValue::String(b)) => a.cmp(b),
        (TypedValue::List(a), TypedValue::List(b)) => compare_lists(a, b),
        (TypedValue::Struct(a), TypedValue::Struct(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let ord = ka.cmp(kb).then_with(|| natural_nulls_first(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => compare_numbers(left, right),
    }
}

fn rank(value: &TypedValue) -> u8 {
    match value {
        TypedValue::Null => 0,
        TypedValue::Bool(_) => 1,
        TypedValue::String(_) => 3,
        TypedValue::List(_) => 4,
        TypedValue::Struct(_) => 5,
        _ => 2,
    }
}

// 2^64, above every integer variant.
const INT_BOUND: f64 = 18_446_744_073_709_551_616.0;

// Exact comparison by value. NaNs sit beyond the infinities on the side of
// their sign bit, and the two zeros are the same number.
fn compare_numbers(left: &TypedValue, right: &TypedValue) -> Ordering {
    match (left.as_i128(), right.as_i128()) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(a), None) => right
            .as_f64()
            .map_or(Ordering::Equal, |x| compare_int_float(a, x)),
        (None, Some(b)) => left
            .as_f64()
            .map_or(Ordering::Equal, |x| compare_int_float(b, x).reverse()),
        (None, None) => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => unsigned_zero(a).total_cmp(&unsigned_zero(b)),
            // Only numeric variants share rank 2.
            _ => Ordering::Equal,
        },
    }
}

fn unsigned_zero(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x
    }
}

fn compare_int_float(int: i128, x: f64) -> Ordering {
    if x.is_nan() {
        return if x.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if x >= INT_BOUND {
        return Ordering::Less;
    }
    if x <= -INT_BOUND {
        return Ordering::Greater;
    }
    let whole = x.trunc();
    let frac = x - whole;
    let by_fraction = if frac > 0.0 {
        Ordering::Less
    } else if frac < 0.0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    };
    int.cmp(&(whole as i128)).then(by_fraction)
}

fn compare_lists(a: &[TypedValue], b: &[TypedValue]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = natural_nulls_first(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
