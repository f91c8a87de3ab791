pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod optimizer;
pub mod tools;
pub mod validator;

pub mod test_support;

pub use dispatcher::{CallStatus, ToolDispatcher, ToolResponse};
pub use error::ToolError;
pub use matcher::{ClosestMatch, MatchResult, SimilarityMatcher};
pub use optimizer::{RouteOptimizer, RoutePlan, RouteRequest, RouteSummary};
pub use tools::{ParameterSpec, ToolKind, ToolOutput};
pub use validator::{ValidationFailure, Validator, ValidatorKind, Validators};
