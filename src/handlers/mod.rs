// src/handlers/mod.rs

pub mod attempts;
pub mod grading;
pub mod progress;
