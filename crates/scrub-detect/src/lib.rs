pub mod merge;
pub mod nlp;
pub mod patterns;
pub mod rules;

pub use merge::merge_detections;
pub use nlp::{EntityRecognizer, HttpRecognizer, NlpEngine, NlpWarning, NlpWarningKind};
pub use patterns::{PatternRule, PatternStore, PatternWarning};
pub use rules::detect_with_rules;
