//! Helper utilities.

mod natural;

pub use natural::natural_cmp;
