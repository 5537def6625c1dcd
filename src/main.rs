use lambda_http::{service_fn, Error, Request};
use std::sync::Arc;
use tracing::info;

use sparse_task_api::config::StoreConfig;
use sparse_task_api::handler::function_handler;
use sparse_task_api::service::TaskService;
use sparse_task_api::store::DynamoStore;
use sparse_task_api::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = StoreConfig::from_env();
    info!(
        table_name = %config.table_name,
        index_name = %config.index_name,
        "Initializing task service"
    );

    // One store client per execution environment, shared across invocations
    let store = DynamoStore::from_env(config).await;
    let service = Arc::new(TaskService::new(Arc::new(store)));

    info!("Service initialized, starting Lambda runtime");

    lambda_http::run(service_fn(move |event: Request| {
        let service = service.clone();
        async move { function_handler(&service, event).await }
    }))
    .await
}
