pub mod client;
pub mod memory;
pub mod postgres;
mod record;
