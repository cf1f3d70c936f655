//! # tebo-middleware
//!
//! Stock route middleware ([`LoggingMiddleware`], [`AllowList`]) and update interceptors
//! ([`UpdateLogger`], [`BlockList`]) for tebo bots.

mod interceptors;
mod middleware;

pub use interceptors::{BlockList, UpdateLogger};
pub use middleware::{AllowList, LoggingMiddleware};

#[cfg(test)]
mod test;
