//! tessio: an interactive assessment-module session player.
//!
//! A module definition (JSON) is flattened into a linear step space and run
//! as an interactive session: navigation with completeness gating, per
//! question countdowns with an irreversible expiry-warning flow, normalized
//! response storage, and multi-phase speaking sequences that record, upload
//! and only then advance.

pub mod app;
pub mod commands;
pub mod config;
pub mod logging;
pub mod module;
pub mod player;
pub mod speaking;
