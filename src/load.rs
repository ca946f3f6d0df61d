//! Chunked batch loading into the destination table.

use crate::error::{Error, Result};
use crate::seatable::SeaTableClient;
use crate::transform::Record;
use tracing::{debug, info};

/// Append `records` to the table in contiguous chunks of at most
/// `chunk_size`, in original order.
///
/// Issues exactly `ceil(N / chunk_size)` append calls. Unlike table
/// clearing, a failed chunk aborts immediately: there is no verification
/// step that could tell a partially loaded table apart from a complete one,
/// so continuing past a failure would only hide it.
pub async fn load_rows(
    store: &SeaTableClient,
    table: &str,
    records: &[Record],
    chunk_size: usize,
) -> Result<usize> {
    if records.is_empty() {
        info!("No records to load into '{}'", table);
        return Ok(0);
    }

    let chunk_count = records.len().div_ceil(chunk_size);
    debug!(
        "Loading {} records into '{}' in {} chunks of up to {}",
        records.len(),
        table,
        chunk_count,
        chunk_size
    );

    for (index, chunk) in records.chunks(chunk_size).enumerate() {
        store
            .batch_append_rows(table, chunk)
            .await
            .map_err(|e| Error::insert(table, index, e))?;
        debug!("Appended chunk {}/{} ({} rows)", index + 1, chunk_count, chunk.len());
    }

    info!("Loaded {} records into '{}'", records.len(), table);
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, SeaTableConfig};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const APPEND_PATH: &str = "/dtable-server/api/v1/dtables/uuid-123/batch-append-rows/";

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| match json!({ "ID": i }) {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            })
            .collect()
    }

    async fn connected_client(server: &MockServer) -> SeaTableClient {
        Mock::given(method("GET"))
            .and(path("/api/v2.1/dtable/app-access-token/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-xyz",
                "dtable_uuid": "uuid-123",
                "dtable_server": format!("{}/dtable-server/", server.uri()),
            })))
            .mount(server)
            .await;

        let config = SeaTableConfig {
            server_url: server.uri(),
            ..Default::default()
        };
        SeaTableClient::connect(&config, "api-token", RetryConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_chunk_count_and_order() {
        let server = MockServer::start().await;
        let client = connected_client(&server).await;

        // 5 records, chunk size 2 -> chunks [0,1], [2,3], [4]
        for first_id in [0, 2, 4] {
            Mock::given(method("POST"))
                .and(path(APPEND_PATH))
                .and(body_partial_json(json!({
                    "table_name": "Contracts",
                    "rows": [{ "ID": first_id }]
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let loaded = load_rows(&client, "Contracts", &records(5), 2).await.unwrap();
        assert_eq!(loaded, 5);
    }

    #[tokio::test]
    async fn test_failed_chunk_halts_remaining() {
        let server = MockServer::start().await;
        let client = connected_client(&server).await;

        Mock::given(method("POST"))
            .and(path(APPEND_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        // Second chunk fails; the third must never be attempted
        Mock::given(method("POST"))
            .and(path(APPEND_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .with_priority(2)
            .mount(&server)
            .await;

        let err = load_rows(&client, "Contracts", &records(5), 2)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INSERT_ERROR");
        assert!(err.to_string().contains("chunk 1"));
    }

    #[tokio::test]
    async fn test_empty_records_issue_no_calls() {
        let server = MockServer::start().await;
        let client = connected_client(&server).await;

        Mock::given(method("POST"))
            .and(path(APPEND_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let loaded = load_rows(&client, "Contracts", &[], 2).await.unwrap();
        assert_eq!(loaded, 0);
    }
}
