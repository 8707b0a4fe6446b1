//! Application layer: remote gateway contract, view models, errors.

pub mod admin;
pub mod error;
pub mod gateway;
