//! Starts a server that will handle http graphql requests, resolving
//! automatic persisted queries before they reach the upstream server.

#![warn(unreachable_pub)]

mod axum_factory;
pub mod cache;
pub mod configuration;
pub mod error;
mod executable;
pub mod graphql;
mod request;
mod router;
mod router_factory;
pub mod services;

pub use cache::CacheBackend;
pub use cache::CacheStorage;
pub use configuration::Configuration;
pub use executable::main;
pub use executable::Executable;
pub use router::ApqRouter;
pub use router::ApqRouterError;
pub use router::RouterHandle;
pub use router::ShutdownKind;
pub use router_factory::create_router_service;
pub use services::layers::apq::ApqResolver;
pub use services::layers::apq::PersistedQueryRegistry;
pub use services::HttpQueryExecutor;
pub use services::QueryExecutor;
pub use services::RouterService;
