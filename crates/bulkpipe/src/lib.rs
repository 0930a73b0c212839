//! 🚚 bulkpipe — batch writes for Elasticsearch's `_bulk` API, fan them out to every
//! endpoint you name, and sign them for the managed ones.
//!
//! ```text
//! Pipeline::send(op) ──▶ batcher ──▶ fan-out ──▶ delivery × N ──▶ POST /_bulk
//! ```
//!
//! Start with [`Pipeline`]. Everything else is either a knob for it or a piece of it.

use std::path::Path;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub mod app_config;
pub mod backends;
pub mod common;
pub mod error;
pub mod pipeline;
pub mod serializer;
pub mod signing;
mod supervisors;
mod workers;

pub use common::{Batch, BulkOperation, DocumentTarget, DocumentUpdate, DocumentWrite};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineOptions};

use crate::app_config::AppConfig;

/// 🚀 Read tagged-JSON operations from `input` (stdin when `None`), push them through a
/// pipeline built from `app_config`, and shut it down.
///
/// If the pipeline faults mid-stream, the fault is what gets reported, not the
/// "stopped accepting operations" symptom it caused in the pump.
pub async fn run(app_config: AppConfig, input: Option<&Path>) -> anyhow::Result<()> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.with_context(|| {
                format!("💀 Could not open the operations file '{}'", path.display())
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let options = app_config.pipeline.to_options(&app_config.http);
    let mut pipeline = Pipeline::new(app_config.target_urls.as_slice(), options)
        .context("💀 Could not build the bulk pipeline from the configuration")?;

    let pumped = pump_operations(reader, &mut pipeline).await;
    let finished = pipeline.shutdown().await;

    match (pumped, finished) {
        (Ok(count), Ok(())) => {
            info!("🏁 Delivered {count} operations to every endpoint");
            Ok(())
        }
        (Err(pump_error), Err(fault)) => {
            warn!("⚠️ The pump also stopped: {pump_error:#}");
            Err(fault)
        }
        (Ok(_), Err(fault)) => Err(fault),
        (Err(pump_error), Ok(())) => Err(pump_error),
    }
}

/// 📥 Feed one `BulkOperation` per line into `pipeline`. Blank lines are skipped.
/// Returns how many operations were sent.
pub async fn pump_operations<R: AsyncBufRead + Unpin>(
    reader: R,
    pipeline: &mut Pipeline,
) -> anyhow::Result<u64> {
    let mut lines = reader.lines();
    let mut line_number = 0u64;
    let mut sent = 0u64;

    while let Some(line) = lines
        .next_line()
        .await
        .context("💀 Could not read the operations stream")?
    {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let op: BulkOperation = serde_json::from_str(&line)
            .map_err(PipelineError::from)
            .with_context(|| format!("💀 Line {line_number} is not a bulk operation"))?;
        pipeline.send(op).await?;
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemorySink;

    #[tokio::test]
    async fn the_one_where_ndjson_goes_in_and_bulk_comes_out() -> anyhow::Result<()> {
        let the_sink = InMemorySink::new();
        let mut the_pipeline =
            Pipeline::with_sinks(vec![the_sink.clone().into()], PipelineOptions::default())?;

        let the_input = concat!(
            r#"{"op":"index","index":"logs","id":"1","document":{"msg":"hello"}}"#,
            "\n\n",
            r#"{"op":"delete","index":"logs","id":"2"}"#,
            "\n",
        );
        let the_count = pump_operations(the_input.as_bytes(), &mut the_pipeline).await?;
        the_pipeline.shutdown().await?;

        assert_eq!(the_count, 2);
        let the_body = String::from_utf8(the_sink.batches().await[0].as_bytes().to_vec())?;
        assert_eq!(
            the_body,
            "{\"index\":{\"_index\":\"logs\",\"_id\":\"1\"}}\n{\"msg\":\"hello\"}\n{\"delete\":{\"_index\":\"logs\",\"_id\":\"2\"}}\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_line_three_is_not_an_operation() -> anyhow::Result<()> {
        let mut the_pipeline =
            Pipeline::with_sinks(vec![InMemorySink::new().into()], PipelineOptions::default())?;

        let the_input = "{\"op\":\"delete\",\"index\":\"a\"}\n\n{\"op\":\"explode\"}\n";
        let the_error = pump_operations(the_input.as_bytes(), &mut the_pipeline)
            .await
            .expect_err("💀 an unknown op must not parse");
        the_pipeline.shutdown().await?;

        assert!(format!("{the_error:#}").contains("Line 3"));
        assert!(matches!(
            the_error.downcast_ref::<PipelineError>(),
            Some(PipelineError::Serialization(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_run_reads_from_a_file() -> anyhow::Result<()> {
        use std::io::Write;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&the_server)
            .await;

        let mut the_file = tempfile::NamedTempFile::new()?;
        writeln!(the_file, r#"{{"op":"create","index":"logs","document":{{"n":1}}}}"#)?;

        let the_config = AppConfig {
            target_urls: vec![the_server.uri()],
            pipeline: Default::default(),
            http: Default::default(),
        };
        run(the_config, Some(the_file.path())).await
    }
}
