//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod dynamic;
pub mod endpoints;
pub mod health;
pub mod vocabulary;
