use crate::core::graph::ResourceGraph;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait PlanStorage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn stack(&self) -> &str;
    fn output_path(&self) -> &str;
}

#[async_trait]
pub trait Deployment: Send + Sync {
    async fn declare(&self) -> Result<ResourceGraph>;
    async fn validate(&self, graph: &ResourceGraph) -> Result<()>;
    async fn publish(&self, graph: ResourceGraph) -> Result<String>;
}
