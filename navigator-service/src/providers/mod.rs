//! Adapters from the stage-flow service seams to concrete HTTP APIs.

pub mod chat;
pub mod research;
pub mod speech;
pub mod web_search;

pub use chat::ChatCompletions;
pub use research::ResearchChat;
pub use speech::TextToSpeech;
pub use web_search::WebSearch;
