pub mod history;
pub mod replacements;
pub mod runs;
