//! Runtime for interview sessions: HTTP backends for the model service and
//! the similarity index, environment configuration and interview plans.

pub mod config;
pub mod index_client;
pub mod llm;
pub mod plan;

pub use config::{check_endpoint, AgentConfig, ModelEndpoint};
pub use index_client::HttpSimilarityIndex;
pub use llm::OpenAiCompatModel;
pub use plan::{InterviewPlan, PlanError};
