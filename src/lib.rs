//! rebind: self-healing ReScript bindings.
//!
//! Watches a ReScript project, classifies compiler failures into a closed
//! taxonomy, and drives a convergence loop that repairs missing bindings
//! through pluggable strategies. Only files rebind itself created are ever
//! overwritten or deleted, enforced by a first-line ownership cookie.

pub mod classifier;
pub mod config;
pub mod convergence;
pub mod detector;
pub mod dump;
pub mod error;
pub mod guard;
pub mod strategy;
pub mod toolchain;
