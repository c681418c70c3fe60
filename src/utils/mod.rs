//! Small shared helpers.

pub mod text;
pub mod validation;

pub use text::{first_line, truncate_string};
