//! Utility functions

mod sanitize;
mod template;

pub use sanitize::{is_reserved, sanitize_filename};
pub use template::{render_filename, TemplateValues, DEFAULT_TEMPLATE};
