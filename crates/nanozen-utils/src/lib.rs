mod arrayvec;
mod assert;
pub mod bitset;

pub use arrayvec::{ArrayStr, ArrayVec};
pub use bitset::BitSet;
