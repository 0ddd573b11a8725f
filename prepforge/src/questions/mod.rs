//! Question generation, storage and answer checking

pub mod fallback;
pub mod generator;
pub mod service;
pub mod store;
pub mod types;
pub mod xai;

pub use fallback::FallbackGenerator;
pub use generator::QuestionGenerator;
pub use service::{AnswerOutcome, AnswerSubmission, QuestionService};
pub use store::{PerformanceStore, ProgressStore, QuestionStore};
pub use types::{
    parse_topic, AnswerRecord, Difficulty, GenerationRequest, Question, TopicPerformance,
};
pub use xai::XaiGenerator;
