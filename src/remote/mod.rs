//! Remote scan delegation.
//!
//! A coordinator asks an agent to scan a folder on the agent's machine, pages
//! through the result, then releases the agent's state:
//!
//! ```text
//! POST /scan      -> { file_count, session }
//! POST /get       -> { files }   (repeat until empty)
//! POST /teardown  -> { released }
//! ```

mod client;
pub mod protocol;
mod server;

pub use client::RemoteClient;
pub use server::{router, serve, AgentState};
