pub mod handlers;
pub mod middleware;
pub mod problems;
pub mod routes;

pub use routes::create_router;
