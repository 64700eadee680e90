//! Client side data synchronization for chirp.
//!
//! [`client::RemoteProcedureClient`] calls server procedures and keeps their results
//! in a [`cache::QueryCache`]. Pages arrive with a prefetched cache that
//! [`hydration`] restores, [`feed::FeedController`] renders post collections from
//! the cache and [`mutation::MutationController`] writes posts and invalidates
//! whatever they made stale.

pub mod cache;
pub mod client;
pub mod feed;
pub mod hydration;
pub mod mutation;
pub mod pages;
pub mod transport;
pub mod view;

#[cfg(test)]
mod testing;
