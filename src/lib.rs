//! Chat core for a locally running Ollama server.
//!
//! ```rust,no_run
//! use kestrel::{ChatSession, KestrelConfig};
//!
//! # async fn example() -> kestrel::ai::ChatResult<()> {
//! let config = KestrelConfig::from_env();
//! let mut session = ChatSession::connect(&config);
//! let reply = session
//!     .send("Hello!", |snapshot| println!("{}", snapshot.text))
//!     .await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```
pub mod ai;
pub mod config;
pub mod context;
pub mod logging;
pub mod session;
pub mod types;

pub use config::KestrelConfig;
pub use session::{ChatSession, TurnStream};
