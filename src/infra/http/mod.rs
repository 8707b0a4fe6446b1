//! HTTP adapters for the remote posts API.

mod gateway;

pub use gateway::HttpPostsGateway;
