//! Property-based tests for the fusion passes.
//!
//! Every fusion must preserve the values of the graph results and must be a
//! no-op when run a second time.

mod fusion_props;
