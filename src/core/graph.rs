//! 資源宣告圖
//!
//! 資源依宣告順序排列；每個參照都必須指向更早宣告的資源，
//! 因此宣告順序本身就是合法的拓撲排序，也不可能出現循環。

use crate::domain::model::{
    Properties, PropertyValue, ResourceDecl, ResourceKind, StackOutput,
};
use crate::utils::error::{InfraError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `declare` 回傳的資源把手，只能透過它取得資源屬性的參照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    name: String,
}

impl ResourceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, attribute: &str) -> PropertyValue {
        PropertyValue::Ref {
            resource: self.name.clone(),
            attribute: attribute.to_string(),
        }
    }

    pub fn id(&self) -> PropertyValue {
        self.attr("id")
    }

    pub fn name_ref(&self) -> PropertyValue {
        self.attr("name")
    }
}

/// `${name.attr}` 以 `.` 分隔屬性，名稱本身不能含 `.` 或其他符號
pub fn is_interpolation_safe(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceGraph {
    resources: Vec<ResourceDecl>,
    outputs: Vec<StackOutput>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 宣告一個資源；名稱重複或參照未宣告的資源時失敗
    pub fn declare(
        &mut self,
        name: &str,
        kind: ResourceKind,
        properties: Properties,
    ) -> Result<ResourceHandle> {
        if name.trim().is_empty() {
            return Err(InfraError::ConfigValidationError {
                field: "resource.name".to_string(),
                message: "Resource name cannot be empty".to_string(),
            });
        }
        if !is_interpolation_safe(name) {
            return Err(InfraError::InvalidConfigValueError {
                field: "resource.name".to_string(),
                value: name.to_string(),
                reason: "Resource names may only contain letters, digits, '-' and '_'".to_string(),
            });
        }
        if self.index.contains_key(name) {
            return Err(InfraError::DuplicateResource {
                name: name.to_string(),
            });
        }

        let depends_on: Vec<String> = properties
            .referenced_resources()
            .into_iter()
            .map(str::to_string)
            .collect();
        for dep in &depends_on {
            if !self.index.contains_key(dep) {
                return Err(InfraError::UndeclaredReference {
                    resource: name.to_string(),
                    reference: dep.clone(),
                });
            }
        }

        tracing::debug!(
            "🧱 Declared {} ({}) depending on {:?}",
            name,
            kind.type_token(),
            depends_on
        );

        self.index.insert(name.to_string(), self.resources.len());
        self.resources.push(ResourceDecl {
            name: name.to_string(),
            kind,
            properties,
            depends_on,
        });

        Ok(ResourceHandle {
            name: name.to_string(),
        })
    }

    pub fn export(&mut self, key: &str, value: PropertyValue) -> Result<()> {
        self.push_output(key, value, false)
    }

    /// 以 secret 方式輸出 (例如連線字串)
    pub fn export_secret(&mut self, key: &str, value: PropertyValue) -> Result<()> {
        self.push_output(key, value, true)
    }

    fn push_output(&mut self, key: &str, value: PropertyValue, secret: bool) -> Result<()> {
        if self.outputs.iter().any(|o| o.key == key) {
            return Err(InfraError::DuplicateOutput {
                key: key.to_string(),
            });
        }

        let mut refs = Vec::new();
        value.collect_refs(&mut refs);
        if let Some(missing) = refs.into_iter().find(|r| !self.index.contains_key(*r)) {
            return Err(InfraError::UndeclaredReference {
                resource: format!("output:{}", key),
                reference: missing.to_string(),
            });
        }

        let secret = secret || value.is_secret();
        self.outputs.push(StackOutput {
            key: key.to_string(),
            value,
            secret,
        });
        Ok(())
    }

    /// 重新檢查整張圖；手動組出或反序列化而來的圖也會被檢查
    pub fn validate(&self) -> Result<()> {
        let mut position: HashMap<&str, usize> = HashMap::new();

        for (i, resource) in self.resources.iter().enumerate() {
            if !is_interpolation_safe(&resource.name) {
                return Err(InfraError::InvalidConfigValueError {
                    field: "resource.name".to_string(),
                    value: resource.name.clone(),
                    reason: "Resource names may only contain letters, digits, '-' and '_'"
                        .to_string(),
                });
            }
            if position.insert(resource.name.as_str(), i).is_some() {
                return Err(InfraError::DuplicateResource {
                    name: resource.name.clone(),
                });
            }

            for dep in resource.properties.referenced_resources() {
                // 只允許參照更早宣告的資源；自我參照同樣不合法
                if !position.contains_key(dep) || dep == resource.name {
                    return Err(InfraError::UndeclaredReference {
                        resource: resource.name.clone(),
                        reference: dep.to_string(),
                    });
                }
            }
        }

        let mut keys = std::collections::HashSet::new();
        for output in &self.outputs {
            if !keys.insert(output.key.as_str()) {
                return Err(InfraError::DuplicateOutput {
                    key: output.key.clone(),
                });
            }
            let mut refs = Vec::new();
            output.value.collect_refs(&mut refs);
            if let Some(missing) = refs.into_iter().find(|r| !position.contains_key(*r)) {
                return Err(InfraError::UndeclaredReference {
                    resource: format!("output:{}", output.key),
                    reference: missing.to_string(),
                });
            }
        }

        Ok(())
    }

    /// 反序列化後重建名稱索引
    pub fn reindex(&mut self) {
        self.index = self
            .resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
    }

    pub fn resources(&self) -> &[ResourceDecl] {
        &self.resources
    }

    pub fn outputs(&self) -> &[StackOutput] {
        &self.outputs
    }

    pub fn get(&self, name: &str) -> Option<&ResourceDecl> {
        self.index.get(name).map(|&i| &self.resources[i])
    }

    pub fn output(&self, key: &str) -> Option<&StackOutput> {
        self.outputs.iter().find(|o| o.key == key)
    }

    pub fn of_kind(&self, kind: ResourceKind) -> Vec<&ResourceDecl> {
        self.resources.iter().filter(|r| r.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rg(graph: &mut ResourceGraph) -> ResourceHandle {
        graph
            .declare(
                "rg-test",
                ResourceKind::ResourceGroup,
                Properties::new().with("location", "WestEurope"),
            )
            .unwrap()
    }

    #[test]
    fn test_declare_records_dependencies() {
        let mut graph = ResourceGraph::new();
        let group = rg(&mut graph);
        let vnet = graph
            .declare(
                "vnet-test",
                ResourceKind::VirtualNetwork,
                Properties::new()
                    .with("location", group.attr("location"))
                    .with("resourceGroupName", group.name_ref()),
            )
            .unwrap();

        assert_eq!(vnet.name(), "vnet-test");
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("vnet-test").unwrap().depends_on, vec!["rg-test"]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_duplicate_resource_is_rejected() {
        let mut graph = ResourceGraph::new();
        rg(&mut graph);
        let err = graph
            .declare("rg-test", ResourceKind::ResourceGroup, Properties::new())
            .unwrap_err();
        assert!(matches!(err, InfraError::DuplicateResource { .. }));
    }

    #[test]
    fn test_reference_to_undeclared_resource_fails() {
        let mut graph = ResourceGraph::new();
        let err = graph
            .declare(
                "subnet",
                ResourceKind::Subnet,
                Properties::new().with(
                    "virtualNetworkName",
                    PropertyValue::Ref {
                        resource: "vnet".to_string(),
                        attribute: "name".to_string(),
                    },
                ),
            )
            .unwrap_err();

        match err {
            InfraError::UndeclaredReference {
                resource,
                reference,
            } => {
                assert_eq!(resource, "subnet");
                assert_eq!(reference, "vnet");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(graph.is_empty());
    }

    #[test]
    fn test_handle_from_another_graph_is_rejected() {
        let mut other = ResourceGraph::new();
        let foreign = rg(&mut other);

        let mut graph = ResourceGraph::new();
        let err = graph
            .declare(
                "pip",
                ResourceKind::PublicIp,
                Properties::new().with("resourceGroupName", foreign.name_ref()),
            )
            .unwrap_err();
        assert!(matches!(err, InfraError::UndeclaredReference { .. }));
    }

    #[test]
    fn test_dotted_name_is_rejected() {
        let mut graph = ResourceGraph::new();
        let err = graph
            .declare("nic-vm.valheim", ResourceKind::NetworkInterface, Properties::new())
            .unwrap_err();
        assert!(matches!(err, InfraError::InvalidConfigValueError { .. }));
        assert!(graph.is_empty());

        assert!(is_interpolation_safe("2456-Tcp-rule"));
        assert!(is_interpolation_safe("valheimSubnetNetworkSecurityGroupAssociation"));
        assert!(!is_interpolation_safe("vm valheim"));
        assert!(!is_interpolation_safe(""));
    }

    #[test]
    fn test_exports() {
        let mut graph = ResourceGraph::new();
        let group = rg(&mut graph);

        graph.export("ResourceGroupName", group.name_ref()).unwrap();
        assert!(matches!(
            graph.export("ResourceGroupName", group.name_ref()),
            Err(InfraError::DuplicateOutput { .. })
        ));
        assert!(matches!(
            graph.export(
                "Missing",
                PropertyValue::Ref {
                    resource: "nope".to_string(),
                    attribute: "id".to_string(),
                }
            ),
            Err(InfraError::UndeclaredReference { .. })
        ));
        assert_eq!(graph.outputs().len(), 1);
        assert!(!graph.output("ResourceGroupName").unwrap().secret);
    }

    #[test]
    fn test_validate_catches_out_of_order_graph() {
        let json = serde_json::json!({
            "resources": [
                {
                    "name": "nic",
                    "kind": "NetworkInterface",
                    "properties": {
                        "subnetId": { "ref": { "resource": "snet", "attribute": "id" } }
                    },
                    "depends_on": ["snet"]
                },
                {
                    "name": "snet",
                    "kind": "Subnet",
                    "properties": {},
                    "depends_on": []
                }
            ],
            "outputs": []
        });

        let mut graph: ResourceGraph = serde_json::from_value(json).unwrap();
        graph.reindex();
        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            InfraError::UndeclaredReference { ref resource, .. } if resource == "nic"
        ));
    }
}
