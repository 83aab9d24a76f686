pub mod core;
pub mod edits;
pub mod roster;
pub mod schedule;
