mod background;
mod command;
mod command_log;
mod cursor_index;
mod message;
mod server_leader_document;
mod types;

pub use background::*;
pub use command::*;
pub use command_log::*;
pub use cursor_index::*;
pub use message::*;
pub use server_leader_document::*;
pub use types::*;

pub extern crate bincode;
pub extern crate serde;
pub extern crate serde_json;
