//! Question answering over stored collections: retrieval, prompting,
//! answer generation, and question suggestions.

pub mod answer;
pub mod prompt;
pub mod retriever;
pub mod suggest;

pub use answer::{AnswerGenerator, APOLOGY};
pub use retriever::{RetrievedContext, Retriever, EMPTY_CONTEXT};
pub use suggest::{QuestionSuggester, SuggestedQuestion};
