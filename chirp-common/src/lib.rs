pub mod error;
pub mod model;
pub mod procedure;
pub mod snowflake;
