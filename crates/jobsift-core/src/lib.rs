pub mod blocked;
pub mod config;
pub mod error;
pub mod escalation;
pub mod identity;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod throttle;
pub mod traits;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::PipelineConfig;
pub use error::{AppError, ErrorKind};
pub use escalation::{EscalationController, EscalationMode, EscalationState, Strategy};
pub use models::{
    CanonicalJobRecord, DateConfidence, EmploymentType, PipelineOutput, RawRecord, RunMetadata,
    SalaryPeriod, SalaryRange, SourceError, compute_hash,
};
pub use normalize::{Normalizer, RecencyFilter};
pub use pipeline::{Pipeline, PipelineReporter, RunRequest, TracingPipelineReporter};
pub use registry::{SearchQuery, SourceDefinition, SourceRegistry};
pub use store::{JsonFileStore, MemoryStore, MergeSummary};
pub use traits::{Extractor, FetchResponse, Fetcher, HttpSender, IdentityProfile, JobStore};
pub use transport::{BackoffPolicy, FetchOptions, ResilientFetcher};
