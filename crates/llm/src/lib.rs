//! LLM and retrieval capabilities consumed by the orchestration core.
//!
//! The core treats model output as untrusted structured proposals: chat
//! responses carry optional function calls that the tool registry
//! validates, and `structured` responses are checked against their
//! declared shape by the caller.

pub mod openai_compat;
pub mod scripted;
pub mod traits;
pub mod vector;

pub use openai_compat::OpenAiCompatProvider;
pub use scripted::ScriptedProvider;
pub use traits::{ChatOutcome, ChatRequest, LlmProvider};
pub use vector::{InMemoryVectorStore, KnowledgeRef, VectorStore};
