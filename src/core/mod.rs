pub mod engine;
pub mod graph;
pub mod program;
pub mod rules;

pub use crate::domain::model::{PortRuleSpec, Properties, PropertyValue, ResourceKind, SecurityRule};
pub use crate::domain::ports::{ConfigProvider, Deployment, PlanStorage};
pub use crate::utils::error::Result;
