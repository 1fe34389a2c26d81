// src/services/mod.rs
pub mod pokemon;
pub mod token_sweeper;
