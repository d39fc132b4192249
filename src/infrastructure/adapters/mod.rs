//! Platform adapters - IRC connection and operator console

pub mod console;
pub mod irc;

pub use self::console::{ConsoleAdapter, ConsoleCommand};
pub use self::irc::{Interrupt, IrcAdapter, IrcSession, SessionEnd};
