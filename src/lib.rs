pub mod cli;
pub mod config;
pub mod git;
pub mod install;
pub mod model;
pub mod resolver;
pub mod scratch;

mod api;

#[cfg(test)]
mod test_support;

pub use api::{Cookfetch, CookfetchBuilder};
