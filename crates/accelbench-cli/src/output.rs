//! Report rendering for stdout.

use std::io::Write;

use accelbench_core::engine::TensorInfo;
use accelbench_core::{BenchmarkOutcome, CapabilityReport};
use anyhow::Result;
use clap::ValueEnum;
use console::style;
use serde::Serialize;

/// Report format on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct JsonOutcome<'a> {
    adapter: &'a str,
    compute_only: bool,
    model: &'a str,
    model_load_ms: f64,
    input_count: usize,
    output_count: usize,
    input: &'a TensorInfo,
    output: &'a TensorInfo,
    iterations: u32,
    warmup_ms: f64,
    total_ms: f64,
    average_ms: f64,
}

pub fn write_outcome(
    out: &mut impl Write,
    outcome: &BenchmarkOutcome,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let report = &outcome.report;
            let json = JsonOutcome {
                adapter: &outcome.adapter,
                compute_only: outcome.compute_only,
                model: &outcome.model,
                model_load_ms: outcome.model_load_ms(),
                input_count: outcome.input_count,
                output_count: outcome.output_count,
                input: &outcome.input,
                output: &outcome.output,
                iterations: report.iterations,
                warmup_ms: report.warmup_ms(),
                total_ms: report.total_ms(),
                average_ms: report.average_ms(),
            };
            serde_json::to_writer_pretty(&mut *out, &json)?;
            writeln!(out)?;
        }
        OutputFormat::Text => write_outcome_text(out, outcome)?,
    }
    Ok(())
}

fn write_outcome_text(out: &mut impl Write, outcome: &BenchmarkOutcome) -> Result<()> {
    let report = &outcome.report;
    let class = if outcome.compute_only { "compute-only" } else { "graphics" };
    writeln!(out, "{} {} ({class})", style("Adapter:").bold(), outcome.adapter)?;
    writeln!(out, "Model load took: {:.3} ms", outcome.model_load_ms())?;
    writeln!(out, "Inputs: {}, outputs: {}", outcome.input_count, outcome.output_count)?;
    writeln!(out, "{}", tensor_line("input", &outcome.input))?;
    writeln!(out, "{}", tensor_line("output", &outcome.output))?;
    writeln!(out, "Warmup took: {:.3} ms", report.warmup_ms())?;
    writeln!(
        out,
        "{} {:.3} ms over {} iterations",
        style("Average inference time:").bold().cyan(),
        report.average_ms(),
        report.iterations
    )?;
    Ok(())
}

fn tensor_line(role: &str, info: &TensorInfo) -> String {
    format!(
        "{role} `{}` {} rank {} dims: {}",
        info.name,
        info.element_type,
        info.rank(),
        info.dims()
    )
}

pub fn write_capabilities(
    out: &mut impl Write,
    report: &CapabilityReport,
    format: OutputFormat,
) -> Result<()> {
    if format == OutputFormat::Json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "{}", style("Execution providers:").bold())?;
    writeln!(out, "  {}", report.providers.join(", "))?;
    let supported = if report.accelerator_supported {
        style("supported").green()
    } else {
        style("not supported").yellow()
    };
    writeln!(out, "  {} {supported}", report.accelerator_provider)?;

    writeln!(out, "{} ({})", style("Adapters:").bold(), report.backend)?;
    match (&report.adapters, &report.enumeration_error) {
        (Some(adapters), _) if adapters.is_empty() => writeln!(out, "  none")?,
        (Some(adapters), _) => {
            for a in adapters {
                let class = if a.compute_only {
                    "compute-only"
                } else if a.supports_graphics {
                    "graphics"
                } else {
                    "display"
                };
                writeln!(
                    out,
                    "  {} [{class}] core-compute={} memory={} MiB",
                    a.name,
                    a.supports_core_compute,
                    a.dedicated_memory_bytes / (1024 * 1024)
                )?;
            }
        }
        (None, Some(err)) => writeln!(out, "  {} {err}", style("unavailable:").yellow())?,
        (None, None) => writeln!(out, "  unavailable")?,
    }

    writeln!(out, "{}", style("Native runtime libraries:").bold())?;
    for lib in &report.native_libraries {
        let mark = if lib.available { style("found").green() } else { style("missing").dim() };
        writeln!(out, "  {:<20} {:<16} {mark}", lib.component, lib.library)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use accelbench_core::engine::ElementType;
    use accelbench_core::BenchmarkReport;
    use std::time::Duration;

    fn outcome() -> BenchmarkOutcome {
        BenchmarkOutcome {
            adapter: "Reference NPU".into(),
            compute_only: true,
            model: "tiny".into(),
            model_load: Duration::from_millis(12),
            input_count: 1,
            output_count: 1,
            input: TensorInfo::new("input", ElementType::F32, vec![1, 3, 224, 224]),
            output: TensorInfo::new("output", ElementType::F32, vec![1, 1000]),
            report: BenchmarkReport::from_spans(
                Duration::from_millis(40),
                Duration::from_millis(250),
                100,
            ),
        }
    }

    #[test]
    fn text_report_has_latency_lines() {
        console::set_colors_enabled(false);
        let mut buf = Vec::new();
        write_outcome(&mut buf, &outcome(), OutputFormat::Text).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.contains("Model load took: 12.000 ms"));
        assert!(s.contains("input `input` f32 rank 4 dims: 1 3 224 224"));
        assert!(s.contains("Warmup took: 40.000 ms"));
        assert!(s.contains("Average inference time: 2.500 ms over 100 iterations"));
    }

    #[test]
    fn json_report_is_one_object() {
        let mut buf = Vec::new();
        write_outcome(&mut buf, &outcome(), OutputFormat::Json).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["iterations"], 100);
        assert_eq!(v["average_ms"], 2.5);
        assert_eq!(v["input"]["shape"][3], 224);
        assert_eq!(v["compute_only"], true);
    }
}
