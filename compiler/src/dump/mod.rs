//! Side exits: SystemVerilog pretty-printing and statistics
pub mod partitions_sv;
pub mod stats;
pub mod sv;
