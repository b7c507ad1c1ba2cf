//! Core domain types and logic.

pub mod basket;
pub mod config_validation;
pub mod ema;
pub mod error;
pub mod key;
pub mod pipeline;
pub mod price;
pub mod smoothing;
