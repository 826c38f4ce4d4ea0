//! Layers applied before a request reaches the executor.

pub mod apq;
