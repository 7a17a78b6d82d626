//! Library wrapper around the `dljc` binary.
//!
//! `cargo test -p dljc-cli --lib` typechecks the CLI without building the
//! integration tests, so the binary crate root is compiled here as a module.

#[allow(dead_code)]
#[path = "main.rs"]
mod main_bin;
