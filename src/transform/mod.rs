pub mod text;
pub mod names;
pub mod columns;
pub mod validate;
