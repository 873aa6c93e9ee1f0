//! The function gateway and middleware chain: the HTTP surface plugins extend instead of
//! competing for routes directly.

pub mod gateway;
pub mod middleware;
pub mod rest;

pub use gateway::{FunctionGateway, GatewayCallback};
pub use middleware::{register_hook_middleware, MiddlewareChain, MiddlewareEntry};
pub use rest::build_router;
