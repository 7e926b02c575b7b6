//! Context/response protocol with the reasoning backend.
//!
//! Two halves of one versioned contract: the sliding-window context renderer
//! that turns chat history into a bounded prompt, and the strict two-line
//! reply grammar the backend is instructed to answer in. Prompt and parser
//! live together so they can only evolve in lockstep.

pub mod context;
pub mod reply;

pub use {
    context::{ContextBuilder, RenderedContext},
    reply::{DEFAULT_REACTION, ParsedReply, ReplyAction, ReplyContract, reaction_glyph},
};
