//! Numeric-aware string ordering.
//!
//! Kstat names such as `sd10` and `sd9` should sort as a human expects
//! (`sd9` before `sd10`), so runs of digits compare by magnitude.

use std::cmp::Ordering;

/// Compares two strings, treating runs of ASCII digits as numbers.
///
/// A longer digit run is larger; equal-length runs compare digit by digit.
/// Where one side has a digit and the other does not, the digit sorts
/// first. Only identical strings compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let x = a.as_bytes();
    let y = b.as_bytes();
    let limit = x.len().min(y.len());
    let mut i = 0;

    while i < limit {
        let (c1, c2) = (x[i], y[i]);
        match (c1.is_ascii_digit(), c2.is_ascii_digit()) {
            (true, true) => {
                let end1 = digit_run_end(x, i);
                let end2 = digit_run_end(y, i);
                if end1 != end2 {
                    return end1.cmp(&end2);
                }
                match x[i..end1].cmp(&y[i..end2]) {
                    Ordering::Equal => {
                        i = end1;
                        continue;
                    }
                    other => return other,
                }
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {
                if c1 != c2 {
                    return c1.cmp(&c2);
                }
                i += 1;
            }
        }
    }

    x.len().cmp(&y.len())
}

fn digit_run_end(s: &[u8], start: usize) -> usize {
    let mut end = start + 1;
    while end < s.len() && s[end].is_ascii_digit() {
        end += 1;
    }
    end
}
