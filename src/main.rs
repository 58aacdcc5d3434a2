//! db-doctor - Main entry point.
//!
//! Thin CLI wrapper over the toolkit library: builds a `ConnectionConfig`
//! from the command line, drives one diagnostic or repair operation, and
//! maps the outcome to an exit code. 0 = success, 1 = unrecovered failure,
//! 2 = the run succeeded and reported findings.

use clap::Parser;
use db_doctor::config::{Command, Config};
use db_doctor::db::SchemaIntrospector;
use db_doctor::error::ToolkitResult;
use db_doctor::models::{
    ConnectionConfig, QueryParam, QueryRequest, RepairScript, ScanRequest, SchemaSnapshot,
};
use db_doctor::report::{ConsoleSink, JsonLinesSink, ReportSink};
use db_doctor::tools::EncodingScanner;
use db_doctor::{DiagnosticPool, QueryExecutor, RepairRunner};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Infer a typed parameter from CLI text: int, float, bool, then string.
fn parse_cli_param(raw: &str) -> QueryParam {
    if let Ok(i) = raw.parse::<i64>() {
        return QueryParam::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return QueryParam::Float(f);
    }
    match raw {
        "true" => QueryParam::Bool(true),
        "false" => QueryParam::Bool(false),
        "NULL" => QueryParam::Null,
        _ => QueryParam::String(raw.to_string()),
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = Config::parse();
    init_tracing(&config);

    match run(&config).await {
        Ok(code) => std::process::ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "Operation failed");
            eprintln!("Error: {}", e);
            std::process::ExitCode::from(1)
        }
    }
}

async fn run(config: &Config) -> ToolkitResult<u8> {
    let db_config = config
        .parse_database()
        .map_err(db_doctor::ToolkitError::config)?;

    let mut conn_config = ConnectionConfig::new(
        &db_config.id,
        &db_config.connection_string,
        db_config.pool.clone(),
    )
    .map_err(|e| db_doctor::ToolkitError::config(e.to_string()))?
    .with_writable(db_config.writable)
    .with_multi_statement(db_config.multi_statement);
    if let Some(database) = &db_config.database {
        conn_config = conn_config.with_database(database);
    }

    let pool = DiagnosticPool::connect(&conn_config).await?;
    let _reaper = pool.start_lease_reaper();

    let mut sink: Box<dyn ReportSink> = match &config.output {
        Some(path) => Box::new(JsonLinesSink::new(std::fs::File::create(path)?)),
        None => Box::new(ConsoleSink::stdout(config.format)),
    };

    let code = dispatch(config, &pool, sink.as_mut()).await?;
    pool.shutdown().await;
    Ok(code)
}

async fn dispatch(
    config: &Config,
    pool: &DiagnosticPool,
    sink: &mut dyn ReportSink,
) -> ToolkitResult<u8> {
    match &config.command {
        Command::Ping => {
            let version = pool.server_version().await;
            info!(
                connection_id = %pool.connection_id(),
                db_type = %pool.db_type(),
                version = ?version,
                "Connection healthy"
            );
            println!(
                "{} {}",
                pool.db_type(),
                version.unwrap_or_else(|| "(version unavailable)".to_string())
            );
            Ok(0)
        }

        Command::Query { sql, params, limit } => {
            let executor = QueryExecutor::new();
            let mut request = QueryRequest::new(sql);
            for raw in params {
                request = request.with_param(parse_cli_param(raw));
            }
            if let Some(limit) = limit {
                request = request.with_limit(*limit);
            }
            let result = executor.execute_on_pool(pool, &request).await?;
            sink.emit_query(&result)?;
            Ok(0)
        }

        Command::Schema { table, schema } => {
            let mut conn = pool.acquire().await?;
            let snapshot =
                SchemaIntrospector::snapshot(&mut conn, table, schema.as_deref()).await?;
            conn.release();
            println!(
                "{}",
                serde_json::to_string_pretty(&snapshot)
                    .map_err(|e| db_doctor::ToolkitError::internal(e.to_string()))?
            );
            Ok(0)
        }

        Command::Diff {
            table,
            expected,
            schema,
        } => {
            let raw = std::fs::read_to_string(expected)?;
            let expected_snapshot: SchemaSnapshot = serde_json::from_str(&raw).map_err(|e| {
                db_doctor::ToolkitError::invalid_input(format!(
                    "Cannot parse expected snapshot {}: {}",
                    expected.display(),
                    e
                ))
            })?;

            let mut conn = pool.acquire().await?;
            let actual =
                SchemaIntrospector::snapshot(&mut conn, table, schema.as_deref()).await?;
            conn.release();

            let deltas = SchemaIntrospector::diff(&expected_snapshot, &actual);
            let found = !deltas.is_empty();
            sink.emit_schema_deltas(table, &deltas)?;
            Ok(if found { 2 } else { 0 })
        }

        Command::Scan {
            table,
            column,
            expected,
            batch_size,
            schema,
        } => {
            let mut request = ScanRequest::new(table, column);
            if let Some(expected) = expected {
                request = request.with_expected(*expected);
            }
            if let Some(batch_size) = batch_size {
                request = request.with_batch_size(*batch_size);
            }
            request.schema = schema.clone();

            let scanner = EncodingScanner::new();
            let issues = scanner.scan(pool, &request).await?;
            let found = !issues.is_empty();
            sink.emit_encoding_issues(&issues)?;
            Ok(if found { 2 } else { 0 })
        }

        Command::Repair { script } => {
            let raw = std::fs::read_to_string(script)?;
            let script: RepairScript = serde_json::from_str(&raw).map_err(|e| {
                db_doctor::ToolkitError::invalid_input(format!(
                    "Cannot parse repair script: {}",
                    e
                ))
            })?;

            let runner = RepairRunner::new();
            let result = runner.apply(pool, &script).await?;
            let failed = !result.succeeded();
            sink.emit_repair(&result)?;
            Ok(if failed { 1 } else { 0 })
        }
    }
}
