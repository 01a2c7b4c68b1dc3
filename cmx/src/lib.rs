//! cmx preprocessing.
//!
//! Templates (`.cmx`) under a project's `custom` tree carry markers such as
//! `$dynamicPackageName`. [`CmxCompiler`] rewrites them into the `.cm` files
//! the cm compiler consumes, deriving every replacement from the template's
//! directory relative to the project root ([`PackageName`]).

mod compiler;
mod package;
pub mod rules;

pub use compiler::{CUSTOM_DIR, CmxCompiler, CmxError, has_template};
pub use package::PackageName;
pub use rules::SubstitutionRule;
