pub mod cli;
pub mod toml_config;

use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OUTPUT_PATH: &str = "./infra";

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "gameserver-infra")]
#[command(about = "Declare a game-server VM and its network as a Pulumi YAML program")]
pub struct CliConfig {
    /// Path to TOML deployment file
    #[arg(short, long, default_value = "deployment.toml")]
    pub config: String,

    /// Stack (environment) name used to derive resource names
    #[arg(short, long, env = "INFRA_STACK", default_value = "dev")]
    pub stack: String,

    /// Directory the program is written to (overrides the config file)
    #[arg(long)]
    pub output_path: Option<String>,

    /// Override features.load_balancer
    #[arg(long)]
    pub load_balancer: Option<bool>,

    /// Override features.function_app
    #[arg(long)]
    pub function_app: Option<bool>,

    /// Print a summary of the resource graph without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Log as JSON lines (for CI)
    #[arg(long)]
    pub json_logs: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

/// 執行期的 stack 設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSettings {
    pub stack: String,
    pub output_path: String,
}

impl StackSettings {
    pub fn new(stack: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            output_path: output_path.into(),
        }
    }
}

impl ConfigProvider for StackSettings {
    fn stack(&self) -> &str {
        &self.stack
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }
}
