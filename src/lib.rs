pub mod codec;
pub mod error;
pub mod event;
pub mod game;
pub mod logger;
pub mod message;
pub mod server;
pub mod session;
pub mod worker;
