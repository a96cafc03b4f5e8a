pub mod channel;

pub use channel::{ChannelError, ChannelExit, TexChannel};
