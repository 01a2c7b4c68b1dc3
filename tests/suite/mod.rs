//! Integration test modules

#[cfg(unix)]
mod diagnostics;
#[cfg(unix)]
mod lifecycle;
#[cfg(unix)]
mod statements;
