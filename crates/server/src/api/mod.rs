pub mod cache;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod search;
pub mod session;

pub use routes::create_router;
