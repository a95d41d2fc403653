// A set of helper structs for common operations
pub mod pixmap;
pub mod region;

extern crate anyhow;
pub use anyhow::{anyhow, Context, Error, Result};

/// Integer division rounding towards positive infinity
pub fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}
