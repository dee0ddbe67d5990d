//! Configuration types for the SQL adapters.
//!
//! # Security
//! These settings never hold passwords. Credentials live only inside the
//! connection string handed to the driver and are masked before logging.

mod connection;

pub use connection::ConnectionConfig;
