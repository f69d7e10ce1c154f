pub mod events;
pub mod fanout;
pub mod handler;
pub mod queue;
pub mod registry;
pub mod server;
pub mod session;
pub mod supervisor;
