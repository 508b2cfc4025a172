pub mod context;
pub mod monitor;
