pub mod contributor;
pub mod entropy;
pub mod error;
pub mod hash;
pub mod pipeline;

pub use contributor::{ContributeError, FakeZkeyContributor, ZkeyContributor};
pub use entropy::generate_entropy;
pub use error::PipelineError;
pub use hash::format_hash;
pub use pipeline::ContributionPipeline;
