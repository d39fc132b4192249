//! Message handling - Line handlers, typed event dispatch and outbound text

pub mod dispatcher;
pub mod handlers;
pub mod outbound;
pub mod parser;

pub use dispatcher::EventRegistry;
pub use handlers::HandlerRegistry;
pub use outbound::Connection;
pub use parser::{Classified, MessageParser};
