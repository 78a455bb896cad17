use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 防火牆規則可用的傳輸協定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "Tcp",
            Protocol::Udp => "Udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Protocol:Port" 解析後的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRuleSpec {
    pub protocol: Protocol,
    pub port: u16,
}

impl fmt::Display for PortRuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)
    }
}

/// NSG 規則的協定欄位，`Any` 對應 `*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleProtocol {
    Tcp,
    Udp,
    Any,
}

impl RuleProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleProtocol::Tcp => "Tcp",
            RuleProtocol::Udp => "Udp",
            RuleProtocol::Any => "*",
        }
    }
}

impl From<Protocol> for RuleProtocol {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => RuleProtocol::Tcp,
            Protocol::Udp => RuleProtocol::Udp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub name: String,
    pub priority: u16,
    pub direction: String,
    pub access: String,
    pub protocol: RuleProtocol,
    pub source_port_range: String,
    pub destination_port_range: String,
    pub source_address_prefix: String,
    pub destination_address_prefix: String,
}

impl SecurityRule {
    /// 允許任意來源的入站規則
    pub fn allow_inbound(
        name: impl Into<String>,
        priority: u16,
        protocol: RuleProtocol,
        destination_port_range: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            direction: "Inbound".to_string(),
            access: "Allow".to_string(),
            protocol,
            source_port_range: "*".to_string(),
            destination_port_range: destination_port_range.into(),
            source_address_prefix: "*".to_string(),
            destination_address_prefix: "*".to_string(),
        }
    }
}

/// 機密值的來源；渲染後只會出現參照，不會出現明文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SecretRef {
    /// stack 設定中的 secret 值 (`pulumi config set --secret <key>`)
    StackConfig { key: String },
    /// 套用時從 Key Vault 讀取
    KeyVault { key_vault_id: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    ResourceGroup,
    StorageAccount,
    AppServicePlan,
    FunctionApp,
    VirtualNetwork,
    Subnet,
    NetworkSecurityGroup,
    NetworkSecurityRule,
    SubnetNsgAssociation,
    PublicIp,
    NetworkInterface,
    VirtualMachine,
    RoleAssignment,
    LoadBalancer,
    LbBackendAddressPool,
    LbProbe,
    LbRule,
    NicBackendPoolAssociation,
}

impl ResourceKind {
    /// Azure classic provider 的型別 token
    pub fn type_token(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "azure:core:ResourceGroup",
            ResourceKind::StorageAccount => "azure:storage:Account",
            ResourceKind::AppServicePlan => "azure:appservice:Plan",
            ResourceKind::FunctionApp => "azure:appservice:FunctionApp",
            ResourceKind::VirtualNetwork => "azure:network:VirtualNetwork",
            ResourceKind::Subnet => "azure:network:Subnet",
            ResourceKind::NetworkSecurityGroup => "azure:network:NetworkSecurityGroup",
            ResourceKind::NetworkSecurityRule => "azure:network:NetworkSecurityRule",
            ResourceKind::SubnetNsgAssociation => {
                "azure:network:SubnetNetworkSecurityGroupAssociation"
            }
            ResourceKind::PublicIp => "azure:network:PublicIp",
            ResourceKind::NetworkInterface => "azure:network:NetworkInterface",
            ResourceKind::VirtualMachine => "azure:compute:VirtualMachine",
            ResourceKind::RoleAssignment => "azure:authorization:Assignment",
            ResourceKind::LoadBalancer => "azure:lb:LoadBalancer",
            ResourceKind::LbBackendAddressPool => "azure:lb:BackendAddressPool",
            ResourceKind::LbProbe => "azure:lb:Probe",
            ResourceKind::LbRule => "azure:lb:Rule",
            ResourceKind::NicBackendPoolAssociation => {
                "azure:network:NetworkInterfaceBackendAddressPoolAssociation"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
    /// 另一個資源的輸出屬性
    Ref { resource: String, attribute: String },
    Secret(SecretRef),
}

impl PropertyValue {
    /// 收集此值 (含巢狀) 參照到的資源名稱
    pub fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            PropertyValue::Ref { resource, .. } => out.push(resource),
            PropertyValue::List(items) => items.iter().for_each(|item| item.collect_refs(out)),
            PropertyValue::Map(map) => map.values().for_each(|value| value.collect_refs(out)),
            _ => {}
        }
    }

    pub fn is_secret(&self) -> bool {
        match self {
            PropertyValue::Secret(_) => true,
            PropertyValue::List(items) => items.iter().any(PropertyValue::is_secret),
            PropertyValue::Map(map) => map.values().any(PropertyValue::is_secret),
            _ => false,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<&String> for PropertyValue {
    fn from(value: &String) -> Self {
        PropertyValue::String(value.clone())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<u16> for PropertyValue {
    fn from(value: u16) -> Self {
        PropertyValue::Int(i64::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<SecretRef> for PropertyValue {
    fn from(value: SecretRef) -> Self {
        PropertyValue::Secret(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Properties> for PropertyValue {
    fn from(value: Properties) -> Self {
        PropertyValue::Map(value.0)
    }
}

/// 資源輸入屬性，以 builder 方式組成
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(pub BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    pub fn referenced_resources(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        for value in self.0.values() {
            value.collect_refs(&mut refs);
        }
        refs.sort_unstable();
        refs.dedup();
        refs
    }
}

/// 已宣告的資源節點
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub name: String,
    pub kind: ResourceKind,
    pub properties: Properties,
    pub depends_on: Vec<String>,
}

/// 對外輸出的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackOutput {
    pub key: String,
    pub value: PropertyValue,
    pub secret: bool,
}
