pub mod client;
pub mod hash;
pub mod validation;
