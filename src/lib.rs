pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::DeploymentConfig, StackSettings};

pub use app::deployments::game_server::GameServerDeployment;
pub use core::{engine::ProvisionEngine, graph::ResourceGraph};
pub use utils::error::{InfraError, Result};
