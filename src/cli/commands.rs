// ABOUTME: Command implementations for the taskweave CLI
// ABOUTME: Handles execution of the run, validate, and schedule commands

use anyhow::{anyhow, Context, Result};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::args::OutputFormat;
use crate::flow::RunReport;
use crate::parser::FlowLoader;
use crate::scheduler::{JobEventKind, SchedulerBinding, SchedulerConfig};
use crate::task::TaskStatus;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Run a flow once and emit its report
pub async fn run_flow(
    flow_path: PathBuf,
    roots: Vec<String>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("Starting flow execution: {}", flow_path.display());

    let flow = FlowLoader::default()
        .load(&flow_path)
        .await
        .map_err(|e| anyhow!("Failed to load flow: {}", e))?;
    info!("Loaded flow: {}", flow.name());

    let root_names: Vec<&str> = roots.iter().map(String::as_str).collect();
    let requested = (!root_names.is_empty()).then_some(root_names.as_slice());

    let report = flow
        .run(requested)
        .await
        .map_err(|e| anyhow!("Flow execution failed: {}", e))?;

    let rendered = render_report(&report, format)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
            info!("Report written to: {}", path.display());
        }
        None => print!("{}", rendered),
    }

    // Non-zero exit code when any task ended in ERROR
    if report.has_errors() {
        return Err(anyhow!(
            "Flow '{}' finished with failed tasks: {}",
            report.flow,
            report.tasks_with_status(TaskStatus::Error).join(", ")
        ));
    }

    Ok(())
}

/// Load a flow and check its trigger graph
pub async fn validate_flow(flow_path: PathBuf) -> Result<()> {
    info!("Validating flow: {}", flow_path.display());

    let flow = FlowLoader::default()
        .load(&flow_path)
        .await
        .map_err(|e| anyhow!("Flow validation failed: {}", e))?;
    flow.validate()
        .map_err(|e| anyhow!("Flow validation failed: {}", e))?;
    let scheduling = flow
        .scheduling()
        .map_err(|e| anyhow!("Flow validation failed: {}", e))?;
    if let Some(crontab) = scheduling.as_ref().and_then(|s| s.crontab.as_deref()) {
        crate::scheduler::parse_cron(crontab)
            .map_err(|e| anyhow!("Flow validation failed: {}", e))?;
    }

    println!("✓ Flow '{}' is valid", flow.name());
    println!("  Tasks: {}", flow.tasks().count());
    println!("  Triggers: {}", flow.edges().len());
    match scheduling {
        Some(s) if !s.enabled => println!("  Schedule: disabled"),
        Some(s) => println!(
            "  Schedule: {}",
            s.crontab.as_deref().unwrap_or("run once on registration")
        ),
        None => println!("  Schedule: none"),
    }

    info!("Flow validation completed successfully");
    Ok(())
}

/// Register every flow per its scheduling block and run until Ctrl-C
pub async fn schedule_flows(flow_paths: Vec<PathBuf>, config: SchedulerConfig) -> Result<()> {
    let loader = FlowLoader::default();
    let mut flows = Vec::with_capacity(flow_paths.len());
    for path in &flow_paths {
        let flow = loader
            .load(path)
            .await
            .map_err(|e| anyhow!("Failed to load flow '{}': {}", path.display(), e))?;
        flows.push(Arc::new(flow));
    }

    let binding = SchedulerBinding::new(config);
    let mut events = binding.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let label = match &event.kind {
                        JobEventKind::Submitted => "submitted".to_string(),
                        JobEventKind::Started => "started".to_string(),
                        JobEventKind::Finished => "finished".to_string(),
                        JobEventKind::Failed(message) => format!("failed: {}", message),
                        JobEventKind::Missed => "missed".to_string(),
                    };
                    println!("[{}] {} {}", event.at.to_rfc3339(), event.job_name, label);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} job events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    for flow in flows {
        let name = flow.name().to_string();
        match binding.register_flow(flow).await? {
            Some(handle) => println!(
                "Scheduled '{}' ({})",
                handle.name,
                handle.schedule.as_deref().unwrap_or("run now")
            ),
            None => println!("Skipped '{}': scheduling disabled", name),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupt received, stopping scheduler");

    let stopped = binding.shutdown(SHUTDOWN_GRACE).await;
    drop(binding);
    printer.abort();
    stopped?;

    Ok(())
}

/// Render a run report in the requested format
pub fn render_report(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)? + "\n"),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(report)?),
        OutputFormat::Text => {
            let mut out = String::new();
            writeln!(
                out,
                "Flow '{}' run {}: {}",
                report.flow,
                report.run_id,
                report.summary()
            )?;
            for (name, task) in &report.tasks {
                if task.skipped {
                    writeln!(out, "  Task '{}': skipped", name)?;
                } else {
                    writeln!(out, "  Task '{}': {}", name, task.status)?;
                }
                if let Some(ref output) = task.output {
                    writeln!(out, "    Output: {}", output)?;
                }
                if let Some(ref error) = task.error {
                    writeln!(out, "    Error: {}", error)?;
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const FLOW: &str = r#"
name: greet
tasks:
  hello:
    type: passthrough
    input: ["hi"]
    on_complete: [shout]
  shout:
    type: passthrough
"#;

    async fn sample_report() -> RunReport {
        let flow = FlowLoader::default().load_str(FLOW).unwrap();
        flow.run(None).await.unwrap()
    }

    #[tokio::test]
    async fn test_render_text_report() {
        let report = sample_report().await;
        let text = render_report(&report, OutputFormat::Text).unwrap();

        assert!(text.starts_with("Flow 'greet' run "));
        assert!(text.contains("2 tasks: 2 completed"));
        assert!(text.contains("Task 'hello': COMPLETED"));
        assert!(text.contains("Output: [[\"hi\"]]"));
    }

    #[tokio::test]
    async fn test_render_json_report() {
        let report = sample_report().await;
        let json = render_report(&report, OutputFormat::Json).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["flow"], "greet");
        assert_eq!(parsed["tasks"]["shout"]["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn test_run_flow_writes_report_file() {
        let dir = tempdir().unwrap();
        let flow_path = dir.path().join("greet.yaml");
        let report_path = dir.path().join("report.yaml");
        fs::write(&flow_path, FLOW).unwrap();

        run_flow(flow_path, vec![], OutputFormat::Yaml, Some(report_path.clone()))
            .await
            .unwrap();

        let written = fs::read_to_string(report_path).unwrap();
        assert!(written.contains("flow: greet"));
    }

    #[tokio::test]
    async fn test_run_flow_fails_on_task_error() {
        let dir = tempdir().unwrap();
        let flow_path = dir.path().join("broken.yaml");
        fs::write(
            &flow_path,
            "name: broken\ntasks:\n  bad:\n    type: command\n    config:\n      script: exit 4\n",
        )
        .unwrap();

        let err = run_flow(flow_path, vec![], OutputFormat::Text, Some(dir.path().join("out.txt")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[tokio::test]
    async fn test_validate_rejects_cycle() {
        let dir = tempdir().unwrap();
        let flow_path = dir.path().join("cycle.yaml");
        fs::write(
            &flow_path,
            "name: cycle\ntasks:\n  a:\n    on_complete: [b]\n  b:\n    on_complete: [a]\n",
        )
        .unwrap();

        let err = validate_flow(flow_path).await.unwrap_err();
        assert!(err.to_string().contains("Cyclic"));
    }
}
