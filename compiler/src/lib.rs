#[macro_use]
extern crate log;

pub mod ast;
pub mod dump;
pub mod lower;
pub mod module;
pub mod opt;
pub mod partition;
pub mod signal;
