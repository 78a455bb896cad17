use crate::core::graph::ResourceGraph;
use crate::core::Deployment;
use crate::domain::model::ResourceKind;
use crate::utils::error::Result;
use std::collections::BTreeMap;
use std::time::Instant;

/// 資源圖摘要，供 `--dry-run` 顯示
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub total_resources: usize,
    pub by_type: BTreeMap<&'static str, usize>,
    pub declaration_order: Vec<String>,
    pub outputs: Vec<String>,
}

impl PlanSummary {
    pub fn from_graph(graph: &ResourceGraph) -> Self {
        let mut by_type = BTreeMap::new();
        for resource in graph.resources() {
            *by_type.entry(resource.kind.type_token()).or_insert(0) += 1;
        }

        Self {
            total_resources: graph.len(),
            by_type,
            declaration_order: graph.resources().iter().map(|r| r.name.clone()).collect(),
            outputs: graph.outputs().iter().map(|o| o.key.clone()).collect(),
        }
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.by_type.get(kind.type_token()).copied().unwrap_or(0)
    }
}

pub struct ProvisionEngine<D: Deployment> {
    deployment: D,
}

impl<D: Deployment> ProvisionEngine<D> {
    pub fn new(deployment: D) -> Self {
        Self { deployment }
    }

    /// 宣告並驗證，但不寫出任何檔案
    pub async fn plan(&self) -> Result<PlanSummary> {
        let graph = self.declare_and_validate().await?;
        Ok(PlanSummary::from_graph(&graph))
    }

    pub async fn run(&self) -> Result<String> {
        let start = Instant::now();
        tracing::info!("🚀 Starting declaration pass");

        let graph = self.declare_and_validate().await?;

        tracing::info!("📝 Publishing program...");
        let output_path = self.deployment.publish(graph).await?;
        tracing::info!(
            "💾 Program written to: {} ({:?})",
            output_path,
            start.elapsed()
        );

        Ok(output_path)
    }

    async fn declare_and_validate(&self) -> Result<ResourceGraph> {
        tracing::info!("🧱 Declaring resources...");
        let graph = self.deployment.declare().await?;
        tracing::info!(
            "🧱 Declared {} resources, {} outputs",
            graph.len(),
            graph.outputs().len()
        );

        tracing::info!("🔍 Validating resource graph...");
        self.deployment.validate(&graph).await?;
        tracing::debug!("✅ Resource graph is valid");

        Ok(graph)
    }
}
