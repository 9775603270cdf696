//! Conversation state.
//!
//! A [`Session`] holds the turn history for one interactive run. It lives in
//! memory only and is discarded on exit.
//!
//! # Example
//!
//! ```rust
//! use paper_relay::session::Session;
//!
//! let session = Session::new();
//! session.add_user_message("Hello!");
//!
//! assert_eq!(session.turn_count(), 1);
//! ```

mod thread;

pub use thread::Session;
