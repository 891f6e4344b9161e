pub mod defs;
pub mod noop;
