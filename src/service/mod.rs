//! Request handling behind the authorization gate

pub mod consistency;
pub mod dispatch;
pub mod proxy;

pub use consistency::ConsistencyWaiter;
pub use dispatch::JobDispatcher;
pub use proxy::{ProxyResponse, SynchronousProxy};
