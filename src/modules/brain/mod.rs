pub mod agent;
pub mod assessment;
pub mod decision;
pub mod grounding;
pub mod llm;
pub mod prompt;

pub use agent::{AssessmentAgent, AssessmentRecord};
pub use assessment::{RecommendedAction, RiskAssessment, RiskLevel};
pub use decision::DecisionRules;
pub use llm::{ChatModel, OpenAiChatModel};
pub use prompt::{CompletionRequest, PromptAssembler};
