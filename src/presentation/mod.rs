//! Presentation layer: view structs, askama templates and routes.

pub mod admin;
