use crate::config::toml_config::DeploymentConfig;
use crate::core::graph::{ResourceGraph, ResourceHandle};
use crate::core::program::{ProgramMeta, PulumiProgram, PROGRAM_FILENAME};
use crate::core::rules;
use crate::core::{ConfigProvider, Deployment, PlanStorage, Properties, PropertyValue, ResourceKind};
use crate::domain::model::PortRuleSpec;
use crate::utils::error::{InfraError, Result};
use crate::utils::validation::Validate;
use std::path::Path;

/// NIC 上唯一的 IP 設定名稱，負載平衡器關聯時也會用到
pub const NIC_IP_CONFIG: &str = "ipconfig1";

pub const OUTPUT_VNET_NAME: &str = "VirtualNetworkName";
pub const OUTPUT_SUBNET_NAME: &str = "SubnetName";
pub const OUTPUT_NIC: &str = "NicName";
pub const OUTPUT_PUBLIC_IP: &str = "PublicIp";
pub const OUTPUT_STORAGE_CONNECTION: &str = "StorageConnectionString";
pub const OUTPUT_LB_PUBLIC_IP: &str = "LoadBalancerPublicIp";

/// 遊戲伺服器 VM 與其網路、儲存的完整宣告
pub struct GameServerDeployment<S: PlanStorage, C: ConfigProvider> {
    pub(crate) storage: S,
    pub(crate) settings: C,
    pub(crate) config: DeploymentConfig,
}

/// 宣告過程中共用的資源把手
struct Shared {
    rg: ResourceHandle,
    tags: PropertyValue,
}

impl Shared {
    /// 幾乎每個資源都需要的 location 與 resourceGroupName
    fn placed(&self) -> Properties {
        Properties::new()
            .with("location", self.rg.attr("location"))
            .with("resourceGroupName", self.rg.name_ref())
    }
}

impl<S: PlanStorage, C: ConfigProvider> GameServerDeployment<S, C> {
    pub fn new(storage: S, settings: C, config: DeploymentConfig) -> Self {
        Self {
            storage,
            settings,
            config,
        }
    }

    /// 依宣告順序建立整張資源圖
    pub fn build_graph(&self) -> Result<ResourceGraph> {
        let stack = self.settings.stack();
        self.config.validate()?;
        self.config.validate_for_stack(stack)?;

        let name = &self.config.deployment.name;
        let mut graph = ResourceGraph::new();

        let rg = graph.declare(
            &format!("rg-{}", name),
            ResourceKind::ResourceGroup,
            Properties::new().with("location", &self.config.deployment.region),
        )?;
        let shared = Shared {
            rg,
            tags: Properties::new().with("environment", stack).into(),
        };

        let storage_account = self.declare_storage(&mut graph, &shared, stack)?;
        let function_app = if self.config.features.function_app {
            Some(self.declare_function_app(&mut graph, &shared, &storage_account, stack)?)
        } else {
            None
        };

        let (vnet, subnet) = self.declare_network(&mut graph, &shared)?;
        self.declare_security(&mut graph, &shared, &subnet)?;

        let public_ip = graph.declare(
            &format!("pip-{}", name),
            ResourceKind::PublicIp,
            shared
                .placed()
                .with("allocationMethod", "Static")
                .with("sku", "Standard"),
        )?;

        let nic = graph.declare(
            &format!("nic-{}", self.config.vm.name),
            ResourceKind::NetworkInterface,
            shared.placed().with(
                "ipConfigurations",
                vec![Properties::new()
                    .with("name", NIC_IP_CONFIG)
                    .with("subnetId", subnet.id())
                    .with("privateIpAddressAllocation", "Dynamic")
                    .with("publicIpAddressId", public_ip.id())],
            ),
        )?;

        let vm = self.declare_vm(&mut graph, &shared, &nic)?;

        if let Some(function_app) = &function_app {
            graph.declare(
                "vmContributor",
                ResourceKind::RoleAssignment,
                Properties::new()
                    .with("scope", vm.id())
                    .with("roleDefinitionName", &self.config.function_app.role)
                    .with("principalId", function_app.attr("identity.principalId")),
            )?;
        }

        if self.config.features.load_balancer {
            self.declare_load_balancer(&mut graph, &shared, &nic)?;
        }

        graph.export(OUTPUT_VNET_NAME, vnet.name_ref())?;
        graph.export(OUTPUT_SUBNET_NAME, subnet.name_ref())?;
        graph.export(OUTPUT_NIC, nic.id())?;
        graph.export(OUTPUT_PUBLIC_IP, public_ip.attr("ipAddress"))?;
        if self.config.outputs.storage_connection_string {
            graph.export_secret(
                OUTPUT_STORAGE_CONNECTION,
                storage_account.attr("primaryConnectionString"),
            )?;
        }

        Ok(graph)
    }

    fn declare_storage(
        &self,
        graph: &mut ResourceGraph,
        shared: &Shared,
        stack: &str,
    ) -> Result<ResourceHandle> {
        graph.declare(
            &self.config.storage_account_name(stack),
            ResourceKind::StorageAccount,
            shared
                .placed()
                .with("accountTier", &self.config.storage.tier)
                .with("accountReplicationType", &self.config.storage.replication)
                .with("tags", shared.tags.clone()),
        )
    }

    fn declare_function_app(
        &self,
        graph: &mut ResourceGraph,
        shared: &Shared,
        storage_account: &ResourceHandle,
        stack: &str,
    ) -> Result<ResourceHandle> {
        let fn_config = &self.config.function_app;

        let plan = graph.declare(
            &self.config.app_service_plan_name(stack),
            ResourceKind::AppServicePlan,
            shared
                .placed()
                .with(
                    "sku",
                    Properties::new()
                        .with("tier", &fn_config.plan_tier)
                        .with("size", &fn_config.plan_size),
                )
                .with("tags", shared.tags.clone()),
        )?;

        graph.declare(
            &self.config.function_app_name(stack),
            ResourceKind::FunctionApp,
            shared
                .placed()
                .with("appServicePlanId", plan.id())
                .with("storageAccountName", storage_account.name_ref())
                .with(
                    "storageAccountAccessKey",
                    storage_account.attr("primaryAccessKey"),
                )
                .with("version", &fn_config.runtime_version)
                .with("identity", Properties::new().with("type", "SystemAssigned"))
                .with("tags", shared.tags.clone()),
        )
    }

    fn declare_network(
        &self,
        graph: &mut ResourceGraph,
        shared: &Shared,
    ) -> Result<(ResourceHandle, ResourceHandle)> {
        let name = &self.config.deployment.name;
        let network = &self.config.network;

        let vnet = graph.declare(
            &format!("vnet-{}", name),
            ResourceKind::VirtualNetwork,
            shared
                .placed()
                .with("addressSpaces", vec![network.address_space.as_str()]),
        )?;

        let subnet_suffix = network.subnet_prefix.replace('.', "-").replace('/', "_");
        let subnet = graph.declare(
            &format!("snet-{}-{}", name, subnet_suffix),
            ResourceKind::Subnet,
            Properties::new()
                .with("resourceGroupName", shared.rg.name_ref())
                .with("virtualNetworkName", vnet.name_ref())
                .with("addressPrefixes", vec![network.subnet_prefix.as_str()]),
        )?;

        Ok((vnet, subnet))
    }

    fn declare_security(
        &self,
        graph: &mut ResourceGraph,
        shared: &Shared,
        subnet: &ResourceHandle,
    ) -> Result<()> {
        let name = &self.config.deployment.name;

        let nsg = graph.declare(
            &format!("nsg-{}", name),
            ResourceKind::NetworkSecurityGroup,
            shared.placed().with("tags", shared.tags.clone()),
        )?;

        let policy = self.config.rule_policy()?;
        let security_rules = policy.rules()?;
        tracing::debug!("🛡️ {} inbound rules from {:?}", security_rules.len(), policy);

        for rule in &security_rules {
            graph.declare(
                &rule.name,
                ResourceKind::NetworkSecurityRule,
                Properties::new()
                    .with("priority", rule.priority)
                    .with("direction", &rule.direction)
                    .with("access", &rule.access)
                    .with("protocol", rule.protocol.as_str())
                    .with("sourcePortRange", &rule.source_port_range)
                    .with("destinationPortRange", &rule.destination_port_range)
                    .with("sourceAddressPrefix", &rule.source_address_prefix)
                    .with("destinationAddressPrefix", &rule.destination_address_prefix)
                    .with("resourceGroupName", shared.rg.name_ref())
                    .with("networkSecurityGroupName", nsg.name_ref()),
            )?;
        }

        graph.declare(
            &format!("{}SubnetNetworkSecurityGroupAssociation", name),
            ResourceKind::SubnetNsgAssociation,
            Properties::new()
                .with("subnetId", subnet.id())
                .with("networkSecurityGroupId", nsg.id()),
        )?;

        Ok(())
    }

    fn declare_vm(
        &self,
        graph: &mut ResourceGraph,
        shared: &Shared,
        nic: &ResourceHandle,
    ) -> Result<ResourceHandle> {
        let vm = &self.config.vm;

        graph.declare(
            &vm.name,
            ResourceKind::VirtualMachine,
            shared
                .placed()
                .with("networkInterfaceIds", vec![nic.id()])
                .with("vmSize", &vm.size)
                .with(
                    "storageImageReference",
                    Properties::new()
                        .with("publisher", &vm.image.publisher)
                        .with("offer", &vm.image.offer)
                        .with("sku", &vm.image.sku)
                        .with("version", &vm.image.version),
                )
                .with(
                    "storageOsDisk",
                    Properties::new()
                        .with("name", &vm.os_disk_name)
                        .with("caching", "ReadWrite")
                        .with("createOption", "FromImage")
                        .with("managedDiskType", "Standard_LRS"),
                )
                .with(
                    "osProfile",
                    Properties::new()
                        .with("computerName", &vm.name)
                        .with("adminUsername", &vm.admin_username)
                        .with("adminPassword", vm.admin_password.clone()),
                )
                .with(
                    "osProfileWindowsConfig",
                    Properties::new()
                        .with("timezone", &vm.timezone)
                        .with("enableAutomaticUpgrades", vm.enable_automatic_upgrades),
                )
                .with("tags", shared.tags.clone()),
        )
    }

    fn declare_load_balancer(
        &self,
        graph: &mut ResourceGraph,
        shared: &Shared,
        nic: &ResourceHandle,
    ) -> Result<()> {
        let name = &self.config.deployment.name;
        let frontend = format!("frontend-{}", name);
        let ports = rules::parse_port_list(&self.config.network.ports)?;

        let lb_ip = graph.declare(
            &format!("pip-lb-{}", name),
            ResourceKind::PublicIp,
            shared
                .placed()
                .with("allocationMethod", "Static")
                .with("sku", "Standard"),
        )?;

        let lb = graph.declare(
            &format!("lb-{}", name),
            ResourceKind::LoadBalancer,
            shared.placed().with("sku", "Standard").with(
                "frontendIpConfigurations",
                vec![Properties::new()
                    .with("name", frontend.as_str())
                    .with("publicIpAddressId", lb_ip.id())],
            ),
        )?;

        let pool = graph.declare(
            &format!("bepool-{}", name),
            ResourceKind::LbBackendAddressPool,
            Properties::new().with("loadbalancerId", lb.id()),
        )?;

        graph.declare(
            &format!("{}-bepool", nic.name()),
            ResourceKind::NicBackendPoolAssociation,
            Properties::new()
                .with("networkInterfaceId", nic.id())
                .with("ipConfigurationName", NIC_IP_CONFIG)
                .with("backendAddressPoolId", pool.id()),
        )?;

        // UDP 無法探測，每個 port 一律用 TCP probe
        let mut probes: Vec<(u16, ResourceHandle)> = Vec::new();
        for spec in &ports {
            if probes.iter().any(|(port, _)| *port == spec.port) {
                continue;
            }
            let probe = graph.declare(
                &format!("probe-{}", spec.port),
                ResourceKind::LbProbe,
                Properties::new()
                    .with("loadbalancerId", lb.id())
                    .with("protocol", "Tcp")
                    .with("port", spec.port),
            )?;
            probes.push((spec.port, probe));
        }

        for spec in &ports {
            let probe = probes
                .iter()
                .find(|(port, _)| *port == spec.port)
                .map(|(_, handle)| handle)
                .ok_or_else(|| InfraError::UndeclaredReference {
                    resource: lb_rule_name(spec),
                    reference: format!("probe-{}", spec.port),
                })?;

            graph.declare(
                &lb_rule_name(spec),
                ResourceKind::LbRule,
                Properties::new()
                    .with("loadbalancerId", lb.id())
                    .with("protocol", spec.protocol.as_str())
                    .with("frontendPort", spec.port)
                    .with("backendPort", spec.port)
                    .with("frontendIpConfigurationName", frontend.as_str())
                    .with("backendAddressPoolIds", vec![pool.id()])
                    .with("probeId", probe.id()),
            )?;
        }

        graph.export(OUTPUT_LB_PUBLIC_IP, lb_ip.attr("ipAddress"))?;
        Ok(())
    }

    fn program_meta(&self) -> ProgramMeta {
        let description = self
            .config
            .deployment
            .description
            .clone()
            .unwrap_or_else(|| format!("Game server {}", self.config.deployment.name));

        // 不放產生時間，同樣的設定要得到同樣的檔案
        ProgramMeta {
            project: self.config.project_name(),
            description: format!("{} (stack {})", description, self.settings.stack()),
        }
    }
}

fn lb_rule_name(spec: &PortRuleSpec) -> String {
    format!("lbrule-{}-{}", spec.port, spec.protocol)
}

#[async_trait::async_trait]
impl<S: PlanStorage, C: ConfigProvider> Deployment for GameServerDeployment<S, C> {
    async fn declare(&self) -> Result<ResourceGraph> {
        tracing::debug!(
            "Declaring '{}' for stack '{}'",
            self.config.deployment.name,
            self.settings.stack()
        );
        self.build_graph()
    }

    async fn validate(&self, graph: &ResourceGraph) -> Result<()> {
        graph.validate()?;

        for key in [OUTPUT_VNET_NAME, OUTPUT_SUBNET_NAME, OUTPUT_NIC, OUTPUT_PUBLIC_IP] {
            if graph.output(key).is_none() {
                return Err(InfraError::MissingConfigError {
                    field: format!("outputs.{}", key),
                });
            }
        }

        Ok(())
    }

    async fn publish(&self, graph: ResourceGraph) -> Result<String> {
        let program = PulumiProgram::render(&graph, &self.program_meta());
        let bytes = PulumiProgram::to_bytes(&program)?;

        self.storage.write_file(PROGRAM_FILENAME, &bytes).await?;

        let path = Path::new(self.settings.output_path()).join(PROGRAM_FILENAME);
        tracing::info!(
            "🕒 Program for stack {} generated at {}",
            self.settings.stack(),
            chrono::Utc::now().to_rfc3339()
        );
        Ok(path.display().to_string())
    }
}
