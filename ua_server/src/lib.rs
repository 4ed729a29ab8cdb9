pub mod address_space;
pub mod api;
pub mod config;
pub mod demo_space;
pub mod error;
pub mod events;
pub mod logging;
pub mod methods;
pub mod server;
pub mod subscriptions;
pub mod types;

pub use error::{ServiceError, ServiceResult};
pub use server::ServerContext;
