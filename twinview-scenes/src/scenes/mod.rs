pub mod idle;
pub mod plasma;
