// Compiled-in reference tables, read-only at runtime
pub mod keywords;
pub mod naics;
pub mod set_asides;

pub use naics::{NaicsEntry, NaicsGroup, NAICS_HIERARCHY};
pub use set_asides::{identify_program, SetAsideProgram, SetAsideRule};
