//! Refrain CLI library.
//!
//! This crate provides the core functionality for the Refrain CLI,
//! including corpus loading and the build, threshold and generation commands.

pub mod commands;
pub mod input;
