pub mod channels;
pub mod connection;
pub mod dispatcher;
pub mod handshake;
pub mod server;
