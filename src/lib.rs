//! Postdesk: admin client for a blog posts API.
//!
//! The [`cache::QueryCache`] holds every server response the client has seen
//! and keeps views consistent across optimistic edits, rollbacks and
//! invalidation. View models in [`application::admin`] read through it and
//! talk to the server via [`application::gateway::PostsGateway`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
