//! Element types of loom graph values.
//!
//! Every node in a graph produces a tensor of a single [`DType`]. The set is
//! deliberately closed: the CPU back end only lowers these scalar kinds.

use std::fmt;

/// Scalar element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::IntoStaticStr)]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    /// Size of one element in bytes.
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int32 => 4,
            Self::Int64 => 8,
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    /// Short lowercase name, as used in graph dumps.
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "i32",
            Self::Int64 => "i64",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
