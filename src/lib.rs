pub mod accumulator;
pub mod config;
pub mod content;
pub mod error;
pub mod interpret;
pub mod models;
pub mod observability;
pub mod protocol;
pub mod repair;
pub mod sanitize;
pub mod stream;
pub mod translator;

pub(crate) mod json_scan;
mod util;
