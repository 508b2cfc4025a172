pub mod case;
pub mod registry;
pub mod suite;
