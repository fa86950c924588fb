// redline-common: shared types for the Redline workspace

pub mod range;
pub mod types;
