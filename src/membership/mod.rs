//! Integer membership sets, used to track which rows of a partition belong
//! to a `DataSet`.
//!
//! A partition is usually described by the ids of its rows, and operations
//! like sampling produce a subset of those ids. [`IntSet`] is a compact hash
//! set tuned for that use: it stores bare `i32`s, never allocates per
//! element, and can draw a uniform, reproducible sample of itself.
//!
//! [`IntSet`]: struct.IntSet.html
mod int_set;
pub use int_set::IntSet;
