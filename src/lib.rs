#[macro_use]
extern crate log;

pub mod formula;
pub mod grade;
pub mod harness;
pub mod parser;
pub mod prelude;
pub mod report;
pub mod submit;
pub mod validate;

#[cfg(test)]
mod tests;
