use std::sync::Arc;

use anyhow::Context;
use csv_ingest_lambda::config::Config;
use csv_ingest_lambda::ingestion::{
    IngestionReport, MySqlDatabase, Pipeline, PipelineOptions, S3ObjectStore, TracingObserver,
};
use csv_ingest_lambda::logging;
use lambda_runtime::{Error, LambdaEvent, run, service_fn};

async fn handler(
    pipeline: &Pipeline<S3ObjectStore, MySqlDatabase>,
    event: LambdaEvent<serde_json::Value>,
) -> Result<IngestionReport, Error> {
    tracing::debug!(request_id = %event.context.request_id, "received event");
    Ok(pipeline.handle(&event.payload).await?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env().context("all necessary env vars should be available")?;
    logging::init(config.log_level);

    tracing::trace!("initiating lambda");

    let s3 = aws_sdk_s3::Client::new(
        &aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await,
    );

    let pipeline = Pipeline::new(
        S3ObjectStore::new(s3),
        MySqlDatabase::new(config.database.clone()),
        PipelineOptions::from(&config),
    )
    .with_observer(Arc::new(TracingObserver));

    let shared_pipeline = Arc::new(pipeline);

    let func = service_fn(move |event: LambdaEvent<serde_json::Value>| {
        let pipeline = shared_pipeline.clone();

        async move { handler(&pipeline, event).await }
    });

    run(func).await
}
