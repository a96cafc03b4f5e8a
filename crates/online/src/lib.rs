//! Online sessions with a typesetting engine.
//!
//! The crate is layered leaves first:
//! - [`process`]: owns the engine process and its standard streams
//! - [`parser`]: turns raw engine chatter into [`LogEvent`]s
//! - [`session`]: the synchronous measure-one-box-at-a-time protocol
//!
//! [`testing::ScriptedChannel`] stands in for a real engine in tests.

pub mod error;
pub mod parser;
pub mod process;
pub mod protocol;
pub mod session;
pub mod testing;

pub use error::OnlineError;
pub use parser::{LogEvent, LogParser};
pub use process::ProcessChannel;
pub use session::{Session, SessionConfig, SessionState};
pub use testing::{ScriptLog, ScriptedChannel};
