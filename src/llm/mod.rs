// LLM abstraction layer

pub mod google;
pub mod openai;
pub mod provider;
pub mod sse;

pub use provider::*;
