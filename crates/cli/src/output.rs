//! Report rendering
//!
//! The traditional form is line-oriented text, one value per line, stable
//! enough to be scraped by the binary-search scripts that drive RFC 2544
//! campaigns. `--json` emits the full report structure instead.

use anyhow::Result;
use xlatbench_orchestrator::{DirectionReport, RunReport};

pub fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if let Some(pre) = &report.preliminary {
        println!("Preliminary frames sent: {}", pre.frames_sent);
        println!("Preliminary frames received: {}", pre.frames_received);
        println!(
            "Preliminary valid entries: {}/{}",
            pre.valid_entries, pre.state_table_size
        );
    }
    if let Some(d) = &report.forward {
        print_direction(d);
    }
    if let Some(d) = &report.reverse {
        print_direction(d);
    }
    Ok(())
}

fn print_direction(d: &DirectionReport) {
    println!("{} sending took: {:.10}", d.direction, d.elapsed_secs);
    println!("{} frames sent: {}", d.direction, d.frames_sent);
    println!("{} frames received: {}", d.direction, d.frames_received);
    if let Some(lat) = &d.latency {
        println!("{} TL: {:.6}", d.direction, lat.typical_ms);
        println!("{} WCL: {:.6}", d.direction, lat.worst_case_ms);
    }
    if d.invalid {
        println!("{} run is INVALID", d.direction);
    }
}
