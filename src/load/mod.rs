pub mod json;
pub mod xlsx;
