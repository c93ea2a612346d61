pub mod client;
pub mod error;
pub mod executor;
pub mod judge;
pub mod simulator;
pub mod types;

pub use client::*;
pub use error::*;
pub use executor::*;
pub use judge::*;
pub use simulator::*;
pub use types::*;
