// src/handlers/mod.rs
pub mod csrf;
pub mod docs;
pub mod health;
pub mod pokemon;
pub mod tasks;
