//! Derived views over a loaded record collection.

pub mod filter;
