// toolhub: registry validation command line
//
// Exit codes: 0 when the registry loads cleanly, 1 on validation failure
// (strict abort, or findings in warning mode), 2 when loading itself fails.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use toolhub::config::RegistryConfig;
use toolhub::validation::{Report, StageReport};
use toolhub::{LoadResult, LoaderError, RegistryLoader, ValidationMode};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_CONFIG: &str = "config/registry.yaml";

#[derive(Parser, Debug)]
#[command(name = "toolhub", version, about = "Validate the method/tool registry")]
struct Cli {
	#[command(flatten)]
	registry: RegistryArgs,

	#[command(flatten)]
	output: OutputArgs,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
	/// Load the registry and run every validation stage (default)
	Validate,
	/// Print the hierarchical path of every tool
	ListTools,
}

#[derive(Args, Debug, Default)]
struct RegistryArgs {
	/// Registry configuration file [default: config/registry.yaml when present]
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	/// Method inventory file
	#[arg(long, global = true)]
	inventory: Option<PathBuf>,

	/// Directory of tool spec files
	#[arg(long, global = true)]
	tools_dir: Option<PathBuf>,

	/// Root the service module paths resolve against
	#[arg(long, global = true)]
	source_root: Option<PathBuf>,

	/// Abort on the first stage with errors
	#[arg(long, global = true, conflicts_with = "warning")]
	strict: bool,

	/// Report every stage and never abort early
	#[arg(long, global = true)]
	warning: bool,

	/// Skip source drift detection
	#[arg(long, global = true)]
	no_drift: bool,

	/// Skip tool/method parameter comparison
	#[arg(long, global = true)]
	no_param_mapping: bool,
}

#[derive(Args, Debug, Default)]
struct OutputArgs {
	/// Print full reports and debug logs
	#[arg(short, long, global = true, conflicts_with = "quiet")]
	verbose: bool,

	/// Only print failures
	#[arg(short, long, global = true)]
	quiet: bool,

	/// Print results as JSON
	#[arg(long, global = true)]
	json: bool,

	/// Emit logs as JSON lines
	#[arg(long, global = true)]
	log_json: bool,
}

fn init_tracing(output: &OutputArgs) {
	let level = if output.verbose {
		"debug"
	} else if output.quiet {
		"error"
	} else {
		"warn"
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

	tracing_subscriber::registry()
		.with(filter)
		.with(
			output
				.log_json
				.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
		)
		.with(
			(!output.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
		)
		.init();
}

/// Defaults, then the config file, then the environment, then flags
fn resolve_config(
	args: &RegistryArgs,
	lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<RegistryConfig> {
	let config = match &args.config {
		Some(path) => RegistryConfig::from_file(path)?,
		None if Path::new(DEFAULT_CONFIG).is_file() => RegistryConfig::from_file(Path::new(DEFAULT_CONFIG))?,
		None => RegistryConfig::default(),
	};
	let mut config = config
		.with_env_overrides(lookup)
		.context("invalid environment override")?;

	if let Some(inventory) = &args.inventory {
		config.inventory = inventory.clone();
	}
	if let Some(tools_dir) = &args.tools_dir {
		config.tools_dir = tools_dir.clone();
	}
	if let Some(source_root) = &args.source_root {
		config.source_root = source_root.clone();
	}
	if args.strict {
		config.validation.mode = ValidationMode::Strict;
	}
	if args.warning {
		config.validation.mode = ValidationMode::Warning;
	}
	if args.no_drift {
		config.validation.drift_detection = false;
	}
	if args.no_param_mapping {
		config.validation.parameter_mapping = false;
	}
	Ok(config)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn print_reports(result: &LoadResult, output: &OutputArgs) -> anyhow::Result<()> {
	if output.json {
		return print_json(&serde_json::to_value(result)?);
	}
	if output.quiet && !result.has_errors() {
		return Ok(());
	}

	println!(
		"Registry validation ({}): {} method(s), {} tool(s)",
		result.mode, result.methods_loaded, result.tools_loaded
	);
	for report in result.reports() {
		let status = if report.has_errors() {
			"FAILED"
		} else if report.warning_count() > 0 {
			"WARN"
		} else {
			"ok"
		};
		println!("  {:<18} {:<6} {}", report.stage(), status, report.summary());
	}
	if result.drift.is_none() {
		println!("  {:<18} {:<6}", "Drift", "skipped");
	}
	if result.parameter_mapping.is_none() {
		println!("  {:<18} {:<6}", "Parameter mapping", "skipped");
	}
	if output.verbose {
		print_json(&serde_json::to_value(result)?)?;
	}
	println!(
		"{} error(s), {} warning(s)",
		result.error_count(),
		result.warning_count()
	);
	Ok(())
}

fn print_failure(stage: &str, summary: &str, report: &StageReport, output: &OutputArgs) -> anyhow::Result<()> {
	if output.json {
		return print_json(&json!({
			"status": "failed",
			"stage": stage,
			"summary": summary,
			"report": report,
		}));
	}
	eprintln!("{stage} validation failed: {summary}");
	if output.verbose {
		let counts = report.as_report();
		eprintln!("{} error(s), {} warning(s)", counts.error_count(), counts.warning_count());
		print_json(&serde_json::to_value(report)?)?;
	}
	Ok(())
}

fn validate(config: RegistryConfig, output: &OutputArgs) -> anyhow::Result<ExitCode> {
	match RegistryLoader::new(config).load() {
		Ok(result) => {
			print_reports(&result, output)?;
			Ok(if result.has_errors() {
				ExitCode::from(1)
			} else {
				ExitCode::SUCCESS
			})
		},
		Err(LoaderError::Validation {
			stage,
			summary,
			report,
		}) => {
			print_failure(stage, &summary, &report, output)?;
			Ok(ExitCode::from(1))
		},
		Err(e) => Err(e.into()),
	}
}

fn list_tools(mut config: RegistryConfig, output: &OutputArgs) -> anyhow::Result<ExitCode> {
	// Listing works on a registry with findings.
	config.validation.mode = ValidationMode::Warning;
	let result = RegistryLoader::new(config).load()?;
	let registry = &result.registry;

	let tools: Vec<_> = registry
		.list_tools()
		.map(|tool| {
			let path = registry.get_hierarchical_tool_path(&tool.name);
			let method = registry.method_for_tool(tool).map(|m| m.key());
			(tool.name.clone(), path, method)
		})
		.collect();

	if output.json {
		let entries: Vec<_> = tools
			.iter()
			.map(|(name, path, method)| json!({ "name": name, "path": path, "method": method }))
			.collect();
		print_json(&serde_json::Value::Array(entries))?;
	} else {
		for (name, path, method) in &tools {
			match (path, method) {
				(Some(path), Some(method)) => println!("{path}  ({method})"),
				_ => println!("unclassified/{name}"),
			}
		}
	}
	Ok(ExitCode::SUCCESS)
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
	let config = resolve_config(&cli.registry, |name| std::env::var(name).ok())?;
	debug!(target: "registry", ?config, "resolved configuration");

	match cli.command.unwrap_or(Command::Validate) {
		Command::Validate => validate(config, &cli.output),
		Command::ListTools => list_tools(config, &cli.output),
	}
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	init_tracing(&cli.output);

	match run(cli) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:#}");
			ExitCode::from(2)
		},
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_flags_override_env_and_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("registry.yaml");
		std::fs::write(
			&path,
			"inventory: from_file.yaml\nvalidation:\n  mode: strict\n  parameter_mapping: false\n",
		)
		.unwrap();

		let cli = Cli::parse_from([
			"toolhub",
			"--config",
			path.to_str().unwrap(),
			"--tools-dir",
			"flag/tools",
			"validate",
		]);
		let config = resolve_config(
			&cli.registry,
			env(&[("REGISTRY_STRICT_VALIDATION", "false"), ("SKIP_DRIFT_DETECTION", "true")]),
		)
		.unwrap();
		assert_eq!(cli.command, Some(Command::Validate));
		assert_eq!(config.inventory, PathBuf::from("from_file.yaml"));
		assert_eq!(config.tools_dir, PathBuf::from("flag/tools"));
		assert_eq!(config.validation.mode, ValidationMode::Warning);
		assert!(!config.validation.drift_detection);
		assert!(!config.validation.parameter_mapping);

		let cli = Cli::parse_from(["toolhub", "--config", path.to_str().unwrap(), "--strict"]);
		let config = resolve_config(&cli.registry, env(&[("REGISTRY_STRICT_VALIDATION", "false")])).unwrap();
		assert_eq!(config.validation.mode, ValidationMode::Strict);
		assert!(cli.command.is_none());
	}

	#[test]
	fn test_conflicting_flags_are_rejected() {
		assert!(Cli::try_parse_from(["toolhub", "--strict", "--warning"]).is_err());
		assert!(Cli::try_parse_from(["toolhub", "list-tools", "--verbose", "--quiet"]).is_err());
	}

	#[test]
	fn test_missing_config_file_is_an_error() {
		let cli = Cli::parse_from(["toolhub", "--config", "/nonexistent/registry.yaml"]);
		assert!(resolve_config(&cli.registry, env(&[])).is_err());
	}
}
