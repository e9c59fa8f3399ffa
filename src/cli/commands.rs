//! CLI command implementations
//!
//! Neither command contacts a shard: `validate` checks a configuration and
//! `explain` plans statements against its VSchema.

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde_json::{json, Value};

use crate::config::RouterConfig;
use crate::planner::{build_plan, ExplainPlan};
use crate::router::RouterError;
use crate::sql;
use crate::vschema::VSchema;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_requests, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Validate { config } => validate(&config),
        Command::Explain { config } => explain(&config),
    }
}

/// Load and validate a configuration, reporting a summary on stdout
pub fn validate(config_path: &Path) -> CliResult<()> {
    let config = RouterConfig::load(config_path)?;
    write_response(&mut io::stdout(), summarize(&config))
}

/// Plan each `{"sql": ...}` line from stdin
pub fn explain(config_path: &Path) -> CliResult<()> {
    let config = RouterConfig::load(config_path)?;
    let vschema = config.build_vschema()?;
    let stdin = io::stdin();
    explain_lines(&vschema, stdin.lock(), &mut io::stdout())
}

/// Plans every request read from `input`. A request that fails to plan
/// produces an error line; only I/O failures stop the loop.
pub fn explain_lines<R: BufRead, W: Write>(
    vschema: &VSchema,
    input: R,
    out: &mut W,
) -> CliResult<()> {
    for request in read_requests(input) {
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                write_error(out, e.code_str(), &e.message())?;
                continue;
            }
        };
        let Some(text) = request.get("sql").and_then(Value::as_str) else {
            let e = CliError::bad_request("request must carry a string \"sql\" field");
            write_error(out, e.code_str(), &e.message())?;
            continue;
        };

        let stmt = match sql::parse(text) {
            Ok(stmt) => stmt,
            Err(e) => {
                let message = e.to_string();
                write_error(out, RouterError::from(e).code(), &message)?;
                continue;
            }
        };
        match build_plan(vschema, text, &stmt) {
            Ok(plan) => write_response(out, serde_json::to_value(ExplainPlan::from_plan(&plan))?)?,
            Err(e) => write_error(out, e.code().code(), e.message())?,
        }
    }
    Ok(())
}

fn summarize(config: &RouterConfig) -> Value {
    let keyspaces: Vec<Value> = config
        .vschema
        .keyspaces
        .iter()
        .map(|(name, ks)| {
            let shards = config
                .topology
                .keyspaces
                .get(name)
                .map(|t| t.shards.clone())
                .unwrap_or_default();
            json!({
                "name": name,
                "sharded": ks.sharded,
                "tables": ks.tables.keys().collect::<Vec<_>>(),
                "vindexes": ks.vindexes.keys().collect::<Vec<_>>(),
                "shards": shards,
            })
        })
        .collect();
    json!({"valid": true, "keyspaces": keyspaces})
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use crate::planner::tests::test_vschema;

    const CONFIG: &str = r#"{
        "vschema": {"keyspaces": {"main": {"tables": {"t": {}}}}},
        "topology": {"keyspaces": {"main": {"shards": ["0"]}}}
    }"#;

    fn run_explain(input: &str) -> Vec<Value> {
        let mut out = Vec::new();
        explain_lines(&test_vschema(), input.as_bytes(), &mut out).unwrap();
        out.split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).unwrap())
            .collect()
    }

    #[test]
    fn test_validate_accepts_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        assert!(run_command(Command::Validate {
            config: file.path().to_path_buf()
        })
        .is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        let err = validate(Path::new("/nonexistent/shardgate.json")).unwrap_err();
        assert_eq!(err.code_str(), "SHARDGATE_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_summarize_lists_keyspaces() {
        let config = RouterConfig::from_json(CONFIG).unwrap();
        let summary = summarize(&config);
        assert_eq!(summary["keyspaces"][0]["name"], "main");
        assert_eq!(summary["keyspaces"][0]["shards"], json!(["0"]));
    }

    #[test]
    fn test_explain_routes_statement() {
        let lines = run_explain("{\"sql\": \"select id from user where id = 1\"}\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["status"], "ok");
        assert_eq!(lines[0]["data"]["plan"]["opcode"], "SelectEqual");
        assert_eq!(lines[0]["data"]["routes"], 1);
    }

    #[test]
    fn test_explain_reports_errors_per_line() {
        let lines = run_explain(
            "{\"sql\": \"select from\"}\n{\"query\": 1}\nnot json\n{\"sql\": \"select * from nowhere\"}\n{\"sql\": \"select id from user\"}\n",
        );
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0]["code"], "SHARDGATE_PLANNING_ERROR");
        assert_eq!(lines[1]["code"], "SHARDGATE_CLI_BAD_REQUEST");
        assert_eq!(lines[2]["code"], "SHARDGATE_CLI_BAD_REQUEST");
        assert_eq!(lines[3]["code"], "SHARDGATE_PLAN_UNKNOWN_TABLE");
        assert_eq!(lines[4]["data"]["plan"]["opcode"], "SelectScatter");
    }
}
