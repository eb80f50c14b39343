//! Model of the phone client's state store.
//!
//! The browser client keeps a small amount of state between frames: the merged
//! window catalog, dictated text waiting to be sent to each window or terminal, and
//! one view per open terminal. [`ClientState`] reproduces that bookkeeping so it can
//! be driven by any front end (and by tests) without a browser.

mod state;


pub use state::{AssistantView, ClientState, ScreenshotView, TerminalKind, TerminalView};
