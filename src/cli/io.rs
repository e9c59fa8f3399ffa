//! JSON-lines I/O for the CLI
//!
//! - Input: one JSON object per line
//! - Output: one JSON object per line, `{"status":"ok","data":..}` or
//!   `{"status":"error","code":..,"message":..}`

use std::io::{BufRead, Write};

use serde_json::{json, Value};

use super::errors::{CliError, CliResult};

/// Reads JSON requests line by line. Blank lines are skipped.
pub fn read_requests<R: BufRead>(reader: R) -> impl Iterator<Item = CliResult<Value>> {
    reader.lines().filter_map(|line| {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(CliError::from(e))),
        };
        if line.trim().is_empty() {
            return None;
        }
        Some(serde_json::from_str(&line).map_err(|e| CliError::bad_request(e.to_string())))
    })
}

/// Write a success response
pub fn write_response<W: Write>(out: &mut W, data: Value) -> CliResult<()> {
    write_line(out, &json!({"status": "ok", "data": data}))
}

/// Write an error response
pub fn write_error<W: Write>(out: &mut W, code: &str, message: &str) -> CliResult<()> {
    write_line(
        out,
        &json!({"status": "error", "code": code, "message": message}),
    )
}

fn write_line<W: Write>(out: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_requests_skips_blank_lines() {
        let input = "{\"sql\":\"select 1\"}\n\n{\"sql\":\"select 2\"}\n";
        let requests: Vec<Value> = read_requests(input.as_bytes())
            .collect::<CliResult<_>>()
            .unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1]["sql"], "select 2");
    }

    #[test]
    fn test_read_requests_reports_bad_json() {
        let mut requests = read_requests("not json\n".as_bytes());
        let err = requests.next().unwrap().unwrap_err();
        assert_eq!(err.code_str(), "SHARDGATE_CLI_BAD_REQUEST");
    }

    #[test]
    fn test_write_error_shape() {
        let mut out = Vec::new();
        write_error(&mut out, "CODE", "message").unwrap();
        let line: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(line, json!({"status": "error", "code": "CODE", "message": "message"}));
    }
}
