//! 將資源圖渲染成 Pulumi YAML 程式
//!
//! JSON 是 YAML 的子集，所以輸出直接以 JSON 寫入 `Pulumi.yaml`，
//! 交由 `pulumi up` 套用。

use crate::core::graph::ResourceGraph;
use crate::domain::model::{PropertyValue, SecretRef};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

pub const PROGRAM_FILENAME: &str = "Pulumi.yaml";

#[derive(Debug, Clone)]
pub struct ProgramMeta {
    pub project: String,
    pub description: String,
}

pub struct PulumiProgram;

impl PulumiProgram {
    pub fn render(graph: &ResourceGraph, meta: &ProgramMeta) -> Value {
        let mut secrets = SecretTable::default();

        let mut resources = Map::new();
        for resource in graph.resources() {
            let mut properties = Map::new();
            for (key, value) in resource.properties.iter() {
                properties.insert(key.clone(), render_value(value, &mut secrets));
            }

            let mut entry = Map::new();
            entry.insert("type".to_string(), json!(resource.kind.type_token()));
            entry.insert("properties".to_string(), Value::Object(properties));
            // 參照已隱含依賴，這裡再明確列出，方便閱讀輸出
            if !resource.depends_on.is_empty() {
                let deps: Vec<Value> = resource
                    .depends_on
                    .iter()
                    .map(|d| json!(format!("${{{}}}", d)))
                    .collect();
                entry.insert("options".to_string(), json!({ "dependsOn": deps }));
            }
            resources.insert(resource.name.clone(), Value::Object(entry));
        }

        let mut outputs = Map::new();
        for output in graph.outputs() {
            let rendered = render_value(&output.value, &mut secrets);
            let rendered = if output.secret {
                json!({ "fn::secret": rendered })
            } else {
                rendered
            };
            outputs.insert(output.key.clone(), rendered);
        }

        let mut program = Map::new();
        program.insert("name".to_string(), json!(meta.project));
        program.insert("runtime".to_string(), json!("yaml"));
        program.insert("description".to_string(), json!(meta.description));
        if !secrets.config.is_empty() {
            program.insert("config".to_string(), secrets.config_section());
        }
        if !secrets.variables.is_empty() {
            program.insert("variables".to_string(), secrets.variables_section());
        }
        program.insert("resources".to_string(), Value::Object(resources));
        program.insert("outputs".to_string(), Value::Object(outputs));

        Value::Object(program)
    }

    pub fn to_bytes(program: &Value) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(program)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// 渲染過程中收集到的 secret 宣告
#[derive(Default)]
struct SecretTable {
    config: BTreeSet<String>,
    variables: BTreeMap<String, (String, String)>,
    // (key_vault_id, name) -> 變數名稱
    vault_vars: BTreeMap<(String, String), String>,
}

impl SecretTable {
    fn reference(&mut self, secret: &SecretRef) -> String {
        match secret {
            SecretRef::StackConfig { key } => {
                self.config.insert(key.clone());
                format!("${{{}}}", key)
            }
            SecretRef::KeyVault { key_vault_id, name } => {
                let pair = (key_vault_id.clone(), name.clone());
                let var = match self.vault_vars.get(&pair) {
                    Some(var) => var.clone(),
                    None => {
                        let var = self.unique_variable(key_vault_id, name);
                        self.variables.insert(var.clone(), pair.clone());
                        self.vault_vars.insert(pair, var.clone());
                        var
                    }
                };
                format!("${{{}}}", var)
            }
        }
    }

    /// `kv-<vault>-<name>`，vault 取 id 的最後一段；仍撞名時加上序號
    fn unique_variable(&self, key_vault_id: &str, name: &str) -> String {
        let vault: String = key_vault_id
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
            .collect();
        let base = if vault.is_empty() {
            format!("kv-{}", name)
        } else {
            format!("kv-{}-{}", vault, name)
        };

        let mut var = base.clone();
        let mut n = 2;
        while self.variables.contains_key(&var) {
            var = format!("{}-{}", base, n);
            n += 1;
        }
        var
    }

    fn config_section(&self) -> Value {
        let mut section = Map::new();
        for key in &self.config {
            section.insert(key.clone(), json!({ "type": "string", "secret": true }));
        }
        Value::Object(section)
    }

    fn variables_section(&self) -> Value {
        let mut section = Map::new();
        for (var, (key_vault_id, name)) in &self.variables {
            section.insert(
                var.clone(),
                json!({
                    "fn::invoke": {
                        "function": "azure:keyvault:getSecret",
                        "arguments": { "name": name, "keyVaultId": key_vault_id },
                        "return": "value"
                    }
                }),
            );
        }
        Value::Object(section)
    }
}

fn render_value(value: &PropertyValue, secrets: &mut SecretTable) -> Value {
    match value {
        PropertyValue::String(s) => json!(s),
        PropertyValue::Int(i) => json!(i),
        PropertyValue::Bool(b) => json!(b),
        PropertyValue::List(items) => {
            Value::Array(items.iter().map(|v| render_value(v, secrets)).collect())
        }
        PropertyValue::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, secrets)))
                .collect(),
        ),
        PropertyValue::Ref {
            resource,
            attribute,
        } => json!(format!("${{{}.{}}}", resource, attribute)),
        PropertyValue::Secret(secret) => json!(secrets.reference(secret)),
    }
}
