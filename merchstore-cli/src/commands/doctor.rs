//! Doctor command - run ledger consistency checks

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::Value;

use super::Session;
use crate::output;

/// Format a detail JSON value as "key: value, key: value"
fn format_detail(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}: {}", k, s),
                _ => format!("{}: {}", k, v),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

/// Returns whether every check passed without errors
pub fn run(session: &Session, verbose: bool) -> Result<bool> {
    let result = session.ctx.doctor_service.run_checks()?;

    if session.json {
        output::print_json(&result)?;
        return Ok(result.is_healthy());
    }

    println!("{}", "Ledger Health Check".bold());
    println!();

    let mut checks: Vec<_> = result.checks.iter().collect();
    checks.sort_by(|a, b| a.0.cmp(b.0));

    let mut table = output::create_table();
    table.set_header(vec!["Check", "Status", "Message"]);

    for (check_name, check_result) in checks {
        let status_cell = match check_result.status.as_str() {
            "pass" => Cell::new("PASS").fg(Color::Green),
            "warning" => Cell::new("WARN").fg(Color::Yellow),
            "error" => Cell::new("ERROR").fg(Color::Red),
            _ => Cell::new(&check_result.status),
        };

        table.add_row(vec![
            Cell::new(check_name),
            status_cell,
            Cell::new(&check_result.message),
        ]);

        if verbose {
            for detail in check_result.details.iter().flatten() {
                table.add_row(vec![
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(format!("  - {}", format_detail(detail))),
                ]);
            }
        }
    }

    println!("{}", table);
    println!();

    println!(
        "Summary: {} passed, {} warnings, {} errors",
        result.summary.passed.to_string().green(),
        result.summary.warnings.to_string().yellow(),
        result.summary.errors.to_string().red(),
    );

    Ok(result.is_healthy())
}
