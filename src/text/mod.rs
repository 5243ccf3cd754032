//! Script text preparation
//!
//! Pronunciation rewriting, chunking and container re-wrapping run in that
//! order before any chunk reaches a provider.

mod chunker;
mod markup;
mod pronunciation;

pub use chunker::{DEFAULT_MAX_CHARS, chunk};
pub use markup::Wrapper;
pub use pronunciation::{PronunciationRule, RewriteMode, rewrite};
