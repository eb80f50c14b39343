//! Session-multiplexing protocol spoken over one client connection.
//!
//! One connection carries the window catalog, any number of terminal sessions and
//! dictated audio. Text frames are JSON objects tagged by `type`; binary frames are
//! raw audio, paired with the preceding `audioStart` by [`AudioCorrelator`].
//!
//! Architecture:
//! - Transport (see `server`): decodes frames into [`InboundFrame`]s and writes
//!   [`ServerMessage`]s back as text frames
//! - Connection loop: owns the per-connection state and handles frames in order
//! - Workers: window actions, screenshots, transcription, assistant and context
//!   scans run on their own threads and reply through the outbound queue

mod audio;
mod protocol;
mod router;
mod session;


pub use audio::{
    route_transcription, AudioCorrelator, AudioTarget, ASSISTANT_QUERY_TARGET,
    TERMINAL_VOICE_TARGET,
};
pub use protocol::{ClientMessage, InboundFrame, ServerMessage};
pub use session::{run_connection, Services};
