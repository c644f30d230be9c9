use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A validated rewrite was rejected by the graph.
    #[snafu(display("{pass} failed to rewrite the graph: {source}"))]
    Rewrite { pass: &'static str, source: loom_ir::Error },
}
