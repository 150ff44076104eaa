pub mod config;
pub mod controller;
pub mod encoder;
pub mod identity;
pub mod location;
pub mod model;
pub mod permissions;
pub mod session;
pub mod sms;
pub mod state;
