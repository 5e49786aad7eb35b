//! Polling chat client.
//!
//! Simulates real-time chat over plain HTTP: load the history once, then poll
//! messages and session status on a fixed interval until stopped.

mod api;
mod http;
mod images;
mod polling;

pub use api::{ChatApi, ChatScope, InstructionRoute};
pub use http::HttpChatApi;
pub use images::{decode_data_uri, encode_data_uri, prepare_images, DecodedImage};
pub use polling::{ChatState, InstructionOptions, PollingClient, POLL_INTERVAL};
