pub mod routes;
pub mod views;

pub use routes::Route;
