//! Question answering core
//!
//! - Query understanding (keywords, question type, language)
//! - Evidence sentence extraction
//! - Answer synthesis

mod evidence;
mod query_parser;
mod synthesizer;

pub use evidence::{EvidenceExtractor, ExtractorMode};
pub use query_parser::{extract_keywords, Language, QueryAnalysis, QuestionType};
pub use synthesizer::{
    create_generator, AnswerComposer, AnswerPath, ChatCompletionGenerator, ComposedAnswer, DisabledGenerator,
    GenerationError, Generator, LLMConfig,
};
