//! Tests for the warehouse tools against a mock SQL API

use carescope_agent::tools::{
    CovidCasesTool, HealthcareAccessTool, SqlApiClient, ToolError, ToolTrait, VaccineProvidersTool,
};
use carescope_config::WarehouseConfig;
use mockito::Matcher;
use serde_json::{json, Value};
use std::time::Duration;

fn config_for(server: &mockito::Server) -> WarehouseConfig {
    WarehouseConfig {
        user: "analyst".to_string(),
        token: "pat-secret".to_string(),
        api_base: Some(server.url()),
        database: "COVID19_GLOBAL_DATA_ATLAS".to_string(),
        warehouse: "COMPUTE_WH".to_string(),
        ..Default::default()
    }
}

fn result_set(columns: &[(&str, &str)], rows: Value) -> String {
    let row_type: Vec<Value> = columns
        .iter()
        .map(|(name, kind)| json!({"name": name, "type": kind}))
        .collect();
    json!({
        "statementHandle": "01b2-handle",
        "resultSetMetaData": {"rowType": row_type},
        "data": rows
    })
    .to_string()
}

#[tokio::test]
async fn test_covid_cases_binds_state() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Regex("requestId=".to_string()))
        .match_header("authorization", "Bearer pat-secret")
        .match_header("x-snowflake-authorization-token-type", "PROGRAMMATIC_ACCESS_TOKEN")
        .match_body(Matcher::PartialJson(json!({
            "bindings": {"1": {"type": "TEXT", "value": "Ohio"}},
            "warehouse": "COMPUTE_WH"
        })))
        .with_status(200)
        .with_body(result_set(
            &[("YEAR", "fixed"), ("STATE", "text"), ("CASES", "fixed"), ("DEATHS", "fixed")],
            json!([["2020", "Ohio", "690000", "11000"], ["2021", "Ohio", "1000000", "17000"]]),
        ))
        .create_async()
        .await;

    let tool = CovidCasesTool::new(config_for(&server));
    let result = tool.execute(json!({"state": "Ohio"})).await.unwrap();

    mock.assert_async().await;
    let records: Value = serde_json::from_str(&result).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 2);
    assert_eq!(records[0]["YEAR"], 2020);
    assert_eq!(records[1]["STATE"], "Ohio");
    assert_eq!(records[1]["CASES"], 1000000);
}

#[tokio::test]
async fn test_covid_cases_without_state() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({"timeout": 60})))
        .with_status(200)
        .with_body(result_set(&[("YEAR", "fixed")], json!([])))
        .create_async()
        .await;

    let tool = CovidCasesTool::new(config_for(&server));
    let result = tool.execute(json!({})).await.unwrap();
    mock.assert_async().await;
    assert_eq!(result, "[]");
}

#[tokio::test]
async fn test_vaccine_providers_maps_postal_code() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({
            "bindings": {"1": {"type": "TEXT", "value": "OH"}}
        })))
        .with_status(200)
        .with_body(result_set(
            &[("LOC_ADMIN_STATE", "text"), ("PROVIDER_COUNT", "fixed")],
            json!([["OH", "4210"]]),
        ))
        .create_async()
        .await;

    let tool = VaccineProvidersTool::new(config_for(&server));
    let result = tool.execute(json!({"state": "Ohio"})).await.unwrap();

    mock.assert_async().await;
    assert_eq!(
        serde_json::from_str::<Value>(&result).unwrap(),
        json!([{"LOC_ADMIN_STATE": "OH", "PROVIDER_COUNT": 4210}])
    );
}

#[tokio::test]
async fn test_healthcare_access_combines_three_queries() {
    let mut server = mockito::Server::new_async().await;
    let visits = result_set(
        &[("PANEL", "text"), ("UNIT", "text"), ("YEAR", "text"), ("ESTIMATE", "real")],
        json!([["Hospital emergency departments", "Number of visits in thousands", "2019", "151000.5"]]),
    );
    let mock = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(visits)
        .expect(3)
        .create_async()
        .await;

    let tool = HealthcareAccessTool::new(config_for(&server));
    let result = tool.execute(json!({"state": "Ohio"})).await.unwrap();

    mock.assert_async().await;
    let payload: Value = serde_json::from_str(&result).unwrap();
    assert_eq!(payload["emergency_dept_visits"][0]["ESTIMATE"], 151000.5);
    assert!(payload["physician_visits"].is_array());
    assert!(payload["delayed_healthcare_by_year"].is_array());
}

#[tokio::test]
async fn test_async_statement_is_polled() {
    let mut server = mockito::Server::new_async().await;
    let _submit = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Any)
        .with_status(202)
        .with_body(json!({"statementHandle": "h-42", "message": "Asynchronous execution in progress."}).to_string())
        .create_async()
        .await;
    let poll = server
        .mock("GET", "/api/v2/statements/h-42")
        .with_status(200)
        .with_body(result_set(&[("COUNT", "fixed")], json!([["7"]])))
        .create_async()
        .await;

    let client = SqlApiClient::new(config_for(&server)).with_polling(Duration::from_millis(5), 3);
    let records = client.query("SELECT 1", &[]).await.unwrap();

    poll.assert_async().await;
    assert_eq!(records[0]["COUNT"], 7);
}

#[tokio::test]
async fn test_polling_is_bounded() {
    let mut server = mockito::Server::new_async().await;
    let _submit = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Any)
        .with_status(202)
        .with_body(json!({"statementHandle": "slow"}).to_string())
        .create_async()
        .await;
    let poll = server
        .mock("GET", "/api/v2/statements/slow")
        .with_status(202)
        .with_body(json!({"statementHandle": "slow"}).to_string())
        .expect(2)
        .create_async()
        .await;

    let client = SqlApiClient::new(config_for(&server)).with_polling(Duration::from_millis(1), 2);
    let err = client.query("SELECT 1", &[]).await.unwrap_err();

    poll.assert_async().await;
    assert!(matches!(err, ToolError::Upstream(_)));
}

#[tokio::test]
async fn test_sql_error_is_upstream() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Any)
        .with_status(422)
        .with_body(json!({"code": "002003", "message": "Object does not exist"}).to_string())
        .create_async()
        .await;

    let tool = VaccineProvidersTool::new(config_for(&server));
    let err = tool.execute(json!({})).await.unwrap_err();
    assert_eq!(
        err,
        ToolError::Upstream("warehouse returned 422: Object does not exist".to_string())
    );
    assert_eq!(
        tool.render_failure(&err),
        "Error: upstream request failed: warehouse returned 422: Object does not exist"
    );
}

#[tokio::test]
async fn test_partitioned_results_are_fetched() {
    let mut server = mockito::Server::new_async().await;
    let _submit = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "statementHandle": "big",
                "resultSetMetaData": {
                    "rowType": [{"name": "YEAR", "type": "fixed"}],
                    "partitionInfo": [{"rowCount": 2}, {"rowCount": 1}, {"rowCount": 1}]
                },
                "data": [["2019"], ["2020"]]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let first = server
        .mock("GET", "/api/v2/statements/big")
        .match_query(Matcher::UrlEncoded("partition".to_string(), "1".to_string()))
        .with_status(200)
        .with_body(json!({"data": [["2021"]]}).to_string())
        .create_async()
        .await;
    let second = server
        .mock("GET", "/api/v2/statements/big")
        .match_query(Matcher::UrlEncoded("partition".to_string(), "2".to_string()))
        .with_status(200)
        .with_body(json!({"data": [["2022"]]}).to_string())
        .create_async()
        .await;

    let client = SqlApiClient::new(config_for(&server));
    let records = client.query("SELECT YEAR", &[]).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    let years: Vec<_> = records.iter().map(|r| r["YEAR"].clone()).collect();
    assert_eq!(years, vec![json!(2019), json!(2020), json!(2021), json!(2022)]);
}

#[tokio::test]
async fn test_failed_partition_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _submit = server
        .mock("POST", "/api/v2/statements")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "statementHandle": "big",
                "resultSetMetaData": {
                    "rowType": [{"name": "YEAR", "type": "fixed"}],
                    "partitionInfo": [{"rowCount": 1}, {"rowCount": 1}]
                },
                "data": [["2019"]]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _page = server
        .mock("GET", "/api/v2/statements/big")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body(json!({"message": "Internal error"}).to_string())
        .create_async()
        .await;

    let client = SqlApiClient::new(config_for(&server));
    let err = client.query("SELECT YEAR", &[]).await.unwrap_err();

    assert_eq!(
        err,
        ToolError::Upstream("warehouse returned 500 for partition 1: Internal error".to_string())
    );
}
