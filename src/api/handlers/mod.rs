//! HTTP request handlers

pub mod assets;
pub mod blobs;
pub mod health;
