//! Optimisation and checking passes over the signal graph
pub mod propagate;
pub mod prune;
pub mod sanity;
