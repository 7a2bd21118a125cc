//! Command handlers

pub mod autosave;
pub mod bundle;
pub mod catalog;
pub mod config;
pub mod item;
pub mod shell;
pub mod stats;
pub mod template;
pub mod validate;
