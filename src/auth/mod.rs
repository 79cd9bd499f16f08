// src/auth/mod.rs

pub mod jwt;

pub use jwt::{Claims, create_token, verify_token};
