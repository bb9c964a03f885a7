pub mod config;
pub mod engines;
pub mod entities;
pub mod error;
pub mod id;
pub mod logging;
pub mod network;
pub mod travel_time;
