use clap::Parser;
use gameserver_infra::config::DEFAULT_OUTPUT_PATH;
use gameserver_infra::core::engine::PlanSummary;
use gameserver_infra::utils::error::{ErrorSeverity, InfraError};
use gameserver_infra::utils::logger;
use gameserver_infra::{
    CliConfig, DeploymentConfig, GameServerDeployment, LocalStorage, ProvisionEngine,
    StackSettings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    if args.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting gameserver-infra");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match DeploymentConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 套用命令列覆蓋設定
    if let Some(enabled) = args.load_balancer {
        config.features.load_balancer = enabled;
        tracing::info!("🔧 Load balancer overridden to: {}", enabled);
    }
    if let Some(enabled) = args.function_app {
        config.features.function_app = enabled;
        tracing::info!("🔧 Function app overridden to: {}", enabled);
    }

    let output_path = args
        .output_path
        .clone()
        .or_else(|| config.deployment.output_path.clone())
        .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string());
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    display_config_summary(&config, &args, &output_path);

    let settings = StackSettings::new(args.stack.clone(), output_path.clone());
    let storage = LocalStorage::new(output_path);
    let deployment = GameServerDeployment::new(storage, settings, config);
    let engine = ProvisionEngine::new(deployment);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        match engine.plan().await {
            Ok(summary) => display_plan(&summary),
            Err(e) => fail(e),
        }
        return Ok(());
    }

    match engine.run().await {
        Ok(path) => {
            tracing::info!("✅ Program declared successfully!");
            println!("✅ Program written to: {}", path);
            println!("💡 Apply it with: pulumi up --stack {} --cwd <dir>", args.stack);
        }
        Err(e) => fail(e),
    }

    Ok(())
}

fn fail(e: InfraError) -> ! {
    tracing::error!(
        "❌ Declaration failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low | ErrorSeverity::Medium | ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

fn display_config_summary(config: &DeploymentConfig, args: &CliConfig, output_path: &str) {
    println!("📋 Configuration Summary:");
    println!("  Project: {}", config.project_name());
    println!("  Stack: {}", args.stack);
    println!("  Region: {}", config.deployment.region);
    println!("  VM: {} ({})", config.vm.name, config.vm.size);
    println!(
        "  Network: {} / {}",
        config.network.address_space, config.network.subnet_prefix
    );
    println!("  Rule policy: {:?}", config.network.rule_policy);
    println!("  Load balancer: {}", config.features.load_balancer);
    println!("  Function app: {}", config.features.function_app);
    println!("  Output: {}", output_path);

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn display_plan(summary: &PlanSummary) {
    println!("🔍 Resource graph ({} resources):", summary.total_resources);
    for (index, name) in summary.declaration_order.iter().enumerate() {
        println!("  {:>2}. {}", index + 1, name);
    }

    println!();
    println!("📦 By type:");
    for (token, count) in &summary.by_type {
        println!("  {:<60} {}", token, count);
    }

    println!();
    println!("📤 Outputs: {}", summary.outputs.join(", "));
}
