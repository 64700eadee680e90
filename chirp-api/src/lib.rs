//! The chirp HTTP server: procedures under `/rpc`, prefetched page props under `/pages`.

pub mod server;
