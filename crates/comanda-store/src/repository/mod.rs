//! # Storage Surfaces
//!
//! The two durable surfaces the engine builds on:
//!
//! - [`cache`] - the durable cache store (TTL + version-monotonic envelopes)
//! - [`outbox`] - the mutation outbox queue (durable FIFO with retry state)
//!
//! Both are plain objects over injectable handles; construct as many
//! isolated instances as tests need.

pub mod cache;
pub mod outbox;

pub use cache::CacheStore;
pub use outbox::OutboxQueue;
