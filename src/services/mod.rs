pub mod answer;
pub mod ingest;

pub use answer::AnswerService;
pub use ingest::{IngestReport, IngestService};
