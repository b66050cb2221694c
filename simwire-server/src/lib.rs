//! Engine-side dispatch for the simwire protocol.
//!
//! A simulator joins the protocol by implementing [`Engine`]; [`serve`]
//! then accepts client connections and drives one engine instance per
//! connection through the conversation rules: handshake first, uploads
//! replace the working set, one run at a time, chunks pulled until the
//! engine reports completion.

mod dispatch;
mod engine;
mod server;

pub use dispatch::{Conversation, handle};
pub use engine::{Engine, check_analysis, check_files};
pub use server::{bind, serve};
