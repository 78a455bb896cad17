use anyhow::Result;
use gameserver_infra::{
    DeploymentConfig, GameServerDeployment, LocalStorage, ProvisionEngine, StackSettings,
};
use tempfile::TempDir;

const CONFIG: &str = r#"
[deployment]
name = "valheim"
description = "Valheim dedicated server"

[network]
ports = ["Tcp:3389", "Udp:3389", "Tcp:2456", "Udp:2456", "Tcp:2457", "Udp:2457", "Tcp:2458", "Udp:2458"]
base_priority = 101

[vm]
name = "vm-valheim"
admin_username = "gameadmin"
admin_password = { source = "stack_config", key = "vmAdminPassword" }

[features]
function_app = true

[outputs]
storage_connection_string = true
"#;

fn engine(
    config: DeploymentConfig,
    output_path: &str,
) -> ProvisionEngine<GameServerDeployment<LocalStorage, StackSettings>> {
    let storage = LocalStorage::new(output_path.to_string());
    let settings = StackSettings::new("staging", output_path);
    ProvisionEngine::new(GameServerDeployment::new(storage, settings, config))
}

fn read_program(output_path: &str) -> Result<serde_json::Value> {
    let bytes = std::fs::read(std::path::Path::new(output_path).join("Pulumi.yaml"))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn test_end_to_end_program_is_written() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let config = DeploymentConfig::from_toml_str(CONFIG)?;
    let path = engine(config, &output_path).run().await?;
    assert!(path.ends_with("Pulumi.yaml"));

    let program = read_program(&output_path)?;
    let resources = program["resources"].as_object().unwrap();

    assert_eq!(program["runtime"], "yaml");
    assert_eq!(program["description"], "Valheim dedicated server (stack staging)");

    // 每個 port 一條規則，優先順序連續
    for (i, name) in [
        "3389-Tcp-rule",
        "3389-Udp-rule",
        "2456-Tcp-rule",
        "2456-Udp-rule",
        "2457-Tcp-rule",
        "2457-Udp-rule",
        "2458-Tcp-rule",
        "2458-Udp-rule",
    ]
    .iter()
    .enumerate()
    {
        let rule = &resources[*name];
        assert_eq!(rule["type"], "azure:network:NetworkSecurityRule");
        assert_eq!(rule["properties"]["priority"], 101 + i as i64);
        assert_eq!(rule["properties"]["networkSecurityGroupName"], "${nsg-valheim.name}");
    }

    let vm = &resources["vm-valheim"];
    assert_eq!(vm["properties"]["networkInterfaceIds"][0], "${nic-vm-valheim.id}");
    assert_eq!(vm["properties"]["storageOsDisk"]["createOption"], "FromImage");
    assert_eq!(vm["properties"]["tags"]["environment"], "staging");

    let assignment = &resources["vmContributor"];
    assert_eq!(assignment["properties"]["scope"], "${vm-valheim.id}");
    assert_eq!(
        assignment["properties"]["principalId"],
        "${fnpulumistaging.identity.principalId}"
    );

    let outputs = program["outputs"].as_object().unwrap();
    assert_eq!(outputs["VirtualNetworkName"], "${vnet-valheim.name}");
    assert_eq!(outputs["SubnetName"], "${snet-valheim-10-0-2-0_24.name}");
    assert_eq!(outputs["PublicIp"], "${pip-valheim.ipAddress}");
    assert!(outputs["StorageConnectionString"].get("fn::secret").is_some());

    Ok(())
}

#[tokio::test]
async fn test_password_never_rendered_as_literal() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let config = DeploymentConfig::from_toml_str(CONFIG)?;
    engine(config, &output_path).run().await?;

    let program = read_program(&output_path)?;
    assert_eq!(
        program["resources"]["vm-valheim"]["properties"]["osProfile"]["adminPassword"],
        "${vmAdminPassword}"
    );
    assert_eq!(program["config"]["vmAdminPassword"]["type"], "string");
    assert_eq!(program["config"]["vmAdminPassword"]["secret"], true);

    let raw = std::fs::read_to_string(temp_dir.path().join("Pulumi.yaml"))?;
    assert!(!raw.contains("Password1234"));

    Ok(())
}

#[tokio::test]
async fn test_dry_run_plan_writes_nothing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().join("out").to_str().unwrap().to_string();

    let mut config = DeploymentConfig::from_toml_str(CONFIG)?;
    config.features.load_balancer = true;

    let summary = engine(config, &output_path).plan().await?;

    assert!(summary.outputs.contains(&"LoadBalancerPublicIp".to_string()));
    assert_eq!(summary.declaration_order[0], "rg-valheim");
    assert_eq!(
        summary.count(gameserver_infra::core::ResourceKind::LbRule),
        8
    );
    assert_eq!(
        summary.count(gameserver_infra::core::ResourceKind::LbProbe),
        4
    );
    assert!(!std::path::Path::new(&output_path).exists());

    Ok(())
}

#[tokio::test]
async fn test_rerun_leaves_program_unchanged() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let program_path = temp_dir.path().join("Pulumi.yaml");

    engine(DeploymentConfig::from_toml_str(CONFIG)?, &output_path)
        .run()
        .await?;
    let first = std::fs::read(&program_path)?;

    engine(DeploymentConfig::from_toml_str(CONFIG)?, &output_path)
        .run()
        .await?;
    let second = std::fs::read(&program_path)?;

    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_dotted_vm_name_aborts_the_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let mut config = DeploymentConfig::from_toml_str(CONFIG)?;
    config.vm.name = "vm.valheim".to_string();

    let err = engine(config, &output_path).run().await.unwrap_err();
    assert!(matches!(
        err,
        gameserver_infra::InfraError::InvalidConfigValueError { .. }
    ));
    assert!(!temp_dir.path().join("Pulumi.yaml").exists());

    Ok(())
}

#[tokio::test]
async fn test_malformed_port_list_aborts_the_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let mut config = DeploymentConfig::from_toml_str(CONFIG)?;
    config.network.ports = vec!["Tcp:2456".to_string(), "Sctp:2457".to_string()];

    let err = engine(config, &output_path).run().await.unwrap_err();
    assert!(matches!(
        err,
        gameserver_infra::InfraError::PortSpecError { index: 1, .. }
    ));
    assert!(!temp_dir.path().join("Pulumi.yaml").exists());

    Ok(())
}
