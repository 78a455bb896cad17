use crate::domain::model::{PortRuleSpec, Protocol, RuleProtocol, SecurityRule};
use crate::utils::error::{InfraError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Azure NSG 允許的優先順序範圍
pub const MIN_PRIORITY: u16 = 100;
pub const MAX_PRIORITY: u16 = 4096;

pub const DEFAULT_BASE_PRIORITY: u16 = 101;

/// 解析單一 "Protocol:Port" 項目，`index` 只用於錯誤訊息
pub fn parse_port_token(index: usize, token: &str) -> Result<PortRuleSpec> {
    let error = |reason: String| InfraError::PortSpecError {
        index,
        token: token.to_string(),
        reason,
    };

    let mut parts = token.trim().split(':');
    let protocol_str = parts.next().unwrap_or_default().trim();
    let port_str = parts
        .next()
        .ok_or_else(|| error("expected '<Protocol>:<Port>'".to_string()))?
        .trim();
    if parts.next().is_some() {
        return Err(error("too many ':' separators".to_string()));
    }

    let protocol = match protocol_str.to_ascii_lowercase().as_str() {
        "tcp" => Protocol::Tcp,
        "udp" => Protocol::Udp,
        other => return Err(error(format!("unknown protocol '{}', expected Tcp or Udp", other))),
    };

    let port: u16 = port_str
        .parse()
        .map_err(|_| error(format!("port '{}' is not a number in 1-65535", port_str)))?;
    if port == 0 {
        return Err(error("port must be positive".to_string()));
    }

    Ok(PortRuleSpec { protocol, port })
}

pub fn parse_port_list(tokens: &[String]) -> Result<Vec<PortRuleSpec>> {
    tokens
        .iter()
        .enumerate()
        .map(|(index, token)| parse_port_token(index, token))
        .collect()
}

pub fn rule_name(spec: &PortRuleSpec) -> String {
    format!("{}-{}-rule", spec.port, spec.protocol)
}

/// 同一組 protocol/port 只能出現一次，否則規則名稱會重複
pub fn ensure_unique_ports(specs: &[PortRuleSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(*spec) {
            return Err(InfraError::DuplicatePortRule {
                protocol: spec.protocol.to_string(),
                port: spec.port,
            });
        }
    }
    Ok(())
}

/// 每個 port 一條規則，優先順序從 `base_priority` 開始逐一遞增
pub fn per_port_rules(specs: &[PortRuleSpec], base_priority: u16) -> Result<Vec<SecurityRule>> {
    ensure_unique_ports(specs)?;
    let mut rules = Vec::with_capacity(specs.len());

    for (offset, spec) in specs.iter().enumerate() {
        let priority = u32::from(base_priority) + offset as u32;
        if priority < u32::from(MIN_PRIORITY) || priority > u32::from(MAX_PRIORITY) {
            return Err(InfraError::PriorityOverflow {
                priority,
                min: MIN_PRIORITY,
                max: MAX_PRIORITY,
            });
        }

        rules.push(SecurityRule::allow_inbound(
            rule_name(spec),
            priority as u16,
            RuleProtocol::from(spec.protocol),
            spec.port.to_string(),
        ));
    }

    Ok(rules)
}

pub fn allow_all_rules() -> Vec<SecurityRule> {
    vec![
        SecurityRule::allow_inbound("allow-all-udp-inbound", 100, RuleProtocol::Udp, "*"),
        SecurityRule::allow_inbound("allow-all-tcp-inbound", 110, RuleProtocol::Tcp, "*"),
    ]
}

/// 入站規則的產生方式，同一個部署只會用其中一種
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RulePolicy {
    PerPort {
        ports: Vec<PortRuleSpec>,
        base_priority: u16,
    },
    AllowAll,
}

impl RulePolicy {
    pub fn rules(&self) -> Result<Vec<SecurityRule>> {
        match self {
            RulePolicy::PerPort {
                ports,
                base_priority,
            } => per_port_rules(ports, *base_priority),
            RulePolicy::AllowAll => Ok(allow_all_rules()),
        }
    }
}
