pub mod graph;
pub mod interp;
