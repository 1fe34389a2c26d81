// src/middleware/mod.rs
pub mod cache;
pub mod csrf;
pub mod logging;
pub mod rate_limit;
pub mod security;
