use crate::core::rules::{self, RulePolicy, DEFAULT_BASE_PRIORITY, MAX_PRIORITY, MIN_PRIORITY};
use crate::domain::model::SecretRef;
use crate::utils::error::{InfraError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub deployment: DeploymentInfo,
    #[serde(default)]
    pub network: NetworkConfig,
    pub vm: VmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub function_app: FunctionAppConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfo {
    /// 資源名稱的共同後綴，例如 `valheim` -> `rg-valheim`
    pub name: String,
    pub project: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// 全域唯一名稱 (storage、function app) 的前綴，後面接 stack 名稱
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePolicyKind {
    PerPort,
    AllowAll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_address_space")]
    pub address_space: String,
    #[serde(default = "default_subnet_prefix")]
    pub subnet_prefix: String,
    #[serde(default = "default_rule_policy")]
    pub rule_policy: RulePolicyKind,
    #[serde(default = "default_ports")]
    pub ports: Vec<String>,
    #[serde(default = "default_base_priority")]
    pub base_priority: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmConfig {
    pub name: String,
    #[serde(default = "default_vm_size")]
    pub size: String,
    pub admin_username: String,
    pub admin_password: SecretRef,
    #[serde(default)]
    pub image: ImageReference,
    #[serde(default = "default_os_disk_name")]
    pub os_disk_name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub enable_automatic_upgrades: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_tier")]
    pub tier: String,
    #[serde(default = "default_replication")]
    pub replication: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub load_balancer: bool,
    #[serde(default = "default_true")]
    pub function_app: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            load_balancer: false,
            function_app: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionAppConfig {
    #[serde(default = "default_plan_tier")]
    pub plan_tier: String,
    #[serde(default = "default_plan_size")]
    pub plan_size: String,
    #[serde(default = "default_runtime_version")]
    pub runtime_version: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputsConfig {
    #[serde(default)]
    pub storage_connection_string: bool,
}

fn default_region() -> String {
    "WestEurope".to_string()
}

fn default_name_prefix() -> String {
    "pulumi".to_string()
}

fn default_address_space() -> String {
    "10.0.0.0/16".to_string()
}

fn default_subnet_prefix() -> String {
    "10.0.2.0/24".to_string()
}

fn default_rule_policy() -> RulePolicyKind {
    RulePolicyKind::PerPort
}

fn default_ports() -> Vec<String> {
    ["Tcp:3389", "Udp:3389", "Tcp:2456", "Udp:2456", "Tcp:2457", "Udp:2457", "Tcp:2458", "Udp:2458"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_base_priority() -> u16 {
    DEFAULT_BASE_PRIORITY
}

fn default_vm_size() -> String {
    "Standard_DS4_v2".to_string()
}

fn default_os_disk_name() -> String {
    "myosdisk1".to_string()
}

fn default_timezone() -> String {
    "W. Europe Standard Time".to_string()
}

fn default_true() -> bool {
    true
}

fn default_storage_tier() -> String {
    "Standard".to_string()
}

fn default_replication() -> String {
    "LRS".to_string()
}

fn default_plan_tier() -> String {
    "Standard".to_string()
}

fn default_plan_size() -> String {
    "S1".to_string()
}

fn default_runtime_version() -> String {
    "~3".to_string()
}

fn default_role() -> String {
    "Virtual Machine Contributor".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address_space: default_address_space(),
            subnet_prefix: default_subnet_prefix(),
            rule_policy: default_rule_policy(),
            ports: default_ports(),
            base_priority: default_base_priority(),
        }
    }
}

impl Default for ImageReference {
    fn default() -> Self {
        Self {
            publisher: "MicrosoftWindowsServer".to_string(),
            offer: "WindowsServer".to_string(),
            sku: "2019-Datacenter".to_string(),
            version: "latest".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tier: default_storage_tier(),
            replication: default_replication(),
        }
    }
}

impl Default for FunctionAppConfig {
    fn default() -> Self {
        Self {
            plan_tier: default_plan_tier(),
            plan_size: default_plan_size(),
            runtime_version: default_runtime_version(),
            role: default_role(),
        }
    }
}

impl DeploymentConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(InfraError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| InfraError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${VM_ADMIN_USER})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| InfraError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_resource_name("deployment.name", &self.deployment.name)?;
        validation::validate_non_empty_string("deployment.region", &self.deployment.region)?;
        if let Some(path) = &self.deployment.output_path {
            validation::validate_path("deployment.output_path", path)?;
        }

        // 位址空間與子網路
        let space = validation::parse_cidr("network.address_space", &self.network.address_space)?;
        let subnet = validation::parse_cidr("network.subnet_prefix", &self.network.subnet_prefix)?;
        if !space.contains(&subnet) {
            return Err(InfraError::InvalidConfigValueError {
                field: "network.subnet_prefix".to_string(),
                value: self.network.subnet_prefix.clone(),
                reason: format!("Subnet must lie inside {}", self.network.address_space),
            });
        }

        // 規則產生時會檢查重複與優先順序上限
        if self.network.rule_policy == RulePolicyKind::PerPort {
            validation::validate_range(
                "network.base_priority",
                self.network.base_priority,
                MIN_PRIORITY,
                MAX_PRIORITY,
            )?;
            if self.network.ports.is_empty() {
                return Err(InfraError::MissingConfigError {
                    field: "network.ports".to_string(),
                });
            }
            self.rule_policy()?.rules()?;
        }
        if self.features.load_balancer {
            // 負載平衡器規則沿用 port 清單，allow_all 時也不能重複
            let specs = rules::parse_port_list(&self.network.ports)?;
            rules::ensure_unique_ports(&specs)?;
        }

        validation::validate_resource_name("vm.name", &self.vm.name)?;
        validation::validate_non_empty_string("vm.size", &self.vm.size)?;
        validation::validate_non_empty_string("vm.admin_username", &self.vm.admin_username)?;
        match &self.vm.admin_password {
            SecretRef::StackConfig { key } => {
                validation::validate_resource_name("vm.admin_password.key", key)?
            }
            SecretRef::KeyVault { key_vault_id, name } => {
                validation::validate_non_empty_string("vm.admin_password.key_vault_id", key_vault_id)?;
                validation::validate_resource_name("vm.admin_password.name", name)?;
            }
        }

        Ok(())
    }

    /// 依 stack 名稱檢查衍生出的全域唯一名稱
    pub fn validate_for_stack(&self, stack: &str) -> Result<()> {
        validation::validate_resource_name("stack", stack)?;
        validation::validate_storage_account_name("storage.name", &self.storage_account_name(stack))
    }

    pub fn rule_policy(&self) -> Result<RulePolicy> {
        match self.network.rule_policy {
            RulePolicyKind::PerPort => Ok(RulePolicy::PerPort {
                ports: rules::parse_port_list(&self.network.ports)?,
                base_priority: self.network.base_priority,
            }),
            RulePolicyKind::AllowAll => Ok(RulePolicy::AllowAll),
        }
    }

    pub fn project_name(&self) -> String {
        self.deployment
            .project
            .clone()
            .unwrap_or_else(|| format!("{}-infra", self.deployment.name))
    }

    pub fn storage_account_name(&self, stack: &str) -> String {
        format!("sa{}{}", self.deployment.name_prefix, stack)
    }

    pub fn app_service_plan_name(&self, stack: &str) -> String {
        format!("asp{}{}", self.deployment.name_prefix, stack)
    }

    pub fn function_app_name(&self, stack: &str) -> String {
        format!("fn{}{}", self.deployment.name_prefix, stack)
    }
}

impl Validate for DeploymentConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorCategory;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[deployment]
name = "valheim"

[vm]
name = "vm-valheim"
admin_username = "gameadmin"
admin_password = { source = "stack_config", key = "vmAdminPassword" }
"#;

    #[test]
    fn test_parse_minimal_config_with_defaults() {
        let config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.deployment.region, "WestEurope");
        assert_eq!(config.network.address_space, "10.0.0.0/16");
        assert_eq!(config.network.subnet_prefix, "10.0.2.0/24");
        assert_eq!(config.network.ports.len(), 8);
        assert_eq!(config.network.base_priority, 101);
        assert_eq!(config.vm.size, "Standard_DS4_v2");
        assert_eq!(config.vm.image.sku, "2019-Datacenter");
        assert!(!config.features.load_balancer);
        assert!(config.features.function_app);
        assert_eq!(config.project_name(), "valheim-infra");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_vault_secret() {
        let toml_content = r#"
[deployment]
name = "valheim"

[vm]
name = "vm-valheim"
admin_username = "gameadmin"

[vm.admin_password]
source = "key_vault"
key_vault_id = "/subscriptions/0000/resourceGroups/rg-secrets/providers/Microsoft.KeyVault/vaults/kv"
name = "vm-admin-password"
"#;
        let config = DeploymentConfig::from_toml_str(toml_content).unwrap();
        assert!(matches!(config.vm.admin_password, SecretRef::KeyVault { .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_literal_password_is_rejected() {
        let toml_content = r#"
[deployment]
name = "valheim"

[vm]
name = "vm-valheim"
admin_username = "testadmin"
admin_password = "Password1234!"
"#;
        assert!(DeploymentConfig::from_toml_str(toml_content).is_err());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TEST_INFRA_ADMIN_USER", "envadmin");

        let toml_content = r#"
[deployment]
name = "valheim"

[vm]
name = "vm-valheim"
admin_username = "${TEST_INFRA_ADMIN_USER}"
admin_password = { source = "stack_config", key = "vmAdminPassword" }
"#;
        let config = DeploymentConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.vm.admin_username, "envadmin");

        std::env::remove_var("TEST_INFRA_ADMIN_USER");
    }

    #[test]
    fn test_validation_rejects_bad_network() {
        let mut config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        config.network.subnet_prefix = "10.1.0.0/24".to_string();
        assert!(config.validate().is_err());

        let mut config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        config.network.ports = vec!["Tcp:3389".to_string(), "Tcp3390".to_string()];
        assert!(matches!(
            config.validate(),
            Err(InfraError::PortSpecError { index: 1, .. })
        ));

        let mut config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        config.network.base_priority = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allow_all_policy_ignores_port_priorities() {
        let mut config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        config.network.rule_policy = RulePolicyKind::AllowAll;
        config.network.base_priority = 50;
        assert!(config.validate().is_ok());
        assert_eq!(config.rule_policy().unwrap(), RulePolicy::AllowAll);
    }

    #[test]
    fn test_function_app_defaults_on_and_can_be_disabled() {
        let toml_content = format!("{}\n[features]\nload_balancer = true\n", MINIMAL);
        let config = DeploymentConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.features.load_balancer);
        assert!(config.features.function_app);

        let toml_content = format!("{}\n[features]\nfunction_app = false\n", MINIMAL);
        let config = DeploymentConfig::from_toml_str(&toml_content).unwrap();
        assert!(!config.features.function_app);
    }

    #[test]
    fn test_dotted_names_are_rejected() {
        let mut config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        config.vm.name = "vm.valheim".to_string();
        assert!(matches!(
            config.validate(),
            Err(InfraError::InvalidConfigValueError { ref field, .. }) if field == "vm.name"
        ));

        let mut config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        config.vm.admin_password = SecretRef::StackConfig {
            key: "vm.adminPassword".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_balancer_rejects_duplicate_ports_under_allow_all() {
        let mut config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        config.network.rule_policy = RulePolicyKind::AllowAll;
        config.network.ports = vec!["Tcp:2456".to_string(), "tcp:2456".to_string()];
        assert!(config.validate().is_ok());

        config.features.load_balancer = true;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            InfraError::DuplicatePortRule { port: 2456, .. }
        ));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_validate_for_stack() {
        let config = DeploymentConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.storage_account_name("dev"), "sapulumidev");
        assert!(config.validate_for_stack("dev").is_ok());
        assert!(config.validate_for_stack("Prod").is_err());
        assert!(config.validate_for_stack("averyveryverylongstackname").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = DeploymentConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.deployment.name, "valheim");
    }
}
