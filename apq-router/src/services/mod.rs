//! Implementation of the various steps in the router's processing pipeline.

pub mod executor;
pub mod layers;
pub mod router;

pub use self::executor::HttpQueryExecutor;
pub use self::executor::QueryExecutor;
pub use self::router::RouterService;
