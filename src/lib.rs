//! chatlink Library
//!
//! Headless client for the chat backend, built on the session crates.

pub mod headless;

pub use headless::runner::{run_headless, HeadlessOptions};
