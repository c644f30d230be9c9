pub mod context;
pub mod reference;
pub mod tensor;
