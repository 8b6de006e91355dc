use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rob_engine::{
    EngineConfig, JobMonitor, LogLedger, PoolBackend, ShellRunner, SyncBackend, WorkflowBackend, WorkflowState,
};
use rob_templates::{TemplateParameter, WorkflowTemplate};
use serde_json::{Map, Value};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "robctl")]
#[command(version, about = "Run parameterized workflow templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base directory for run directories (overrides ROB_BASE_DIR)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the parameters declared by a template
    Params {
        /// Template file (JSON or YAML)
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,
    },

    /// Run a template
    ///
    /// Examples:
    ///     robctl run template.yaml --set names=data/names.txt
    ///     robctl run template.yaml --args args.json --runtime pool
    ///     robctl run template.yaml --set sleeptime=2 --run-id hello-1
    #[command(verbatim_doc_comment)]
    Run {
        /// Template file (JSON or YAML)
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        /// File with argument values (JSON or YAML object)
        #[arg(short, long)]
        args: Option<PathBuf>,

        /// Set arguments (format: key=value), can be repeated
        #[arg(long = "set", value_name = "KEY=VALUE")]
        variables: Vec<String>,

        /// Execution backend
        #[arg(short, long, value_enum, default_value_t = Runtime::Sync)]
        runtime: Runtime,

        /// Run identifier (generated if omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Log every executed command
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the state of a finished run
    State {
        #[arg(value_name = "RUN_ID")]
        run_id: String,
    },

    /// Remove a finished run and its files
    Remove {
        #[arg(value_name = "RUN_ID")]
        run_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Runtime {
    /// Execute inline
    Sync,
    /// Execute on a worker task, tracked by the job monitor
    Pool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,rob_engine=debug".into()))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env().context("Failed to load configuration")?;
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
    }

    match cli.command {
        Commands::Params { template } => {
            let template = load_template(&template)?;
            for para in template.list_parameters() {
                print_parameter(para, 0);
            }
        }
        Commands::Run {
            template,
            args,
            variables,
            runtime,
            run_id,
            verbose,
        } => {
            config.verbose |= verbose;
            let template = load_template(&template)?;
            let mut raw = match args {
                Some(path) => read_arguments(&path)?,
                None => Map::new(),
            };
            raw.extend(parse_variables(&variables)?);
            let arguments = template
                .parse_arguments(&raw, true)
                .context("Invalid arguments")?;
            let run_id = run_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

            let state = match runtime {
                Runtime::Sync => {
                    let source_dir = template.base_dir().unwrap_or_else(|| Path::new("."));
                    sync_backend(&config)
                        .execute(&run_id, &template, source_dir, &arguments)
                        .await?
                }
                Runtime::Pool => run_pool(&config, &run_id, &template, &arguments).await?,
            };
            println!("{}", run_id);
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::State { run_id } => {
            let state = sync_backend(&config).get_state(&run_id).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Remove { run_id } => {
            sync_backend(&config).remove_run(&run_id).await?;
            println!("Removed run {}", run_id);
        }
    }

    Ok(())
}

fn sync_backend(config: &EngineConfig) -> SyncBackend {
    SyncBackend::new(&config.base_dir, Arc::new(ShellRunner::new(&config.shell))).with_verbose(config.verbose)
}

/// Execute a run on the pool backend and wait until the job monitor sees it
/// finish. Ctrl-C cancels the run. The final state is written to the run
/// result file so `state` and `remove` work for pool runs as well.
async fn run_pool(
    config: &EngineConfig,
    run_id: &str,
    template: &WorkflowTemplate,
    arguments: &rob_templates::Arguments,
) -> Result<WorkflowState> {
    let backend = Arc::new(
        PoolBackend::new(&config.base_dir, Arc::new(ShellRunner::new(&config.shell))).with_verbose(config.verbose),
    );
    let source_dir = template.base_dir().unwrap_or_else(|| Path::new("."));
    let state = backend.execute(run_id, template, source_dir, arguments).await?;

    let monitor = Arc::new(JobMonitor::new(
        backend.clone(),
        Arc::new(LogLedger),
        config.monitor_interval(),
    ));
    monitor.add(run_id, state).await?;
    let handle = monitor.clone().run()?;

    let state = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(run_id = %run_id, "Canceling run");
                backend.cancel_run(run_id).await?;
                handle.abort();
                anyhow::bail!("Run {} canceled", run_id);
            }
            _ = tokio::time::sleep(config.monitor_interval()) => {
                if monitor.tracked().await.is_empty() {
                    break backend.get_state(run_id).await?;
                }
            }
        }
    };
    handle.abort();

    let run_file = config.base_dir.join(format!("{}.json", run_id));
    tokio::fs::write(&run_file, serde_json::to_string_pretty(&state)?)
        .await
        .with_context(|| format!("Failed to write {}", run_file.display()))?;
    Ok(state)
}

fn load_template(path: &Path) -> Result<WorkflowTemplate> {
    WorkflowTemplate::load(path, true).with_context(|| format!("Failed to load template {}", path.display()))
}

fn print_parameter(para: &TemplateParameter, depth: usize) {
    let decl = &para.declaration;
    let mut line = format!("{}{} ({})", "  ".repeat(depth), decl.id, decl.datatype);
    if decl.name != decl.id {
        line.push_str(&format!(" - {}", decl.name));
    }
    if let Some(default) = para.default_value() {
        line.push_str(&format!(" [default: {}]", default));
    } else if decl.required && para.constant().is_none() {
        line.push_str(" [required]");
    }
    println!("{}", line);
    for child in para.children() {
        print_parameter(child, depth + 1);
    }
}

/// Read argument values from a JSON or YAML file.
fn read_arguments(path: &Path) -> Result<Map<String, Value>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    match value {
        Value::Object(obj) => Ok(obj),
        _ => anyhow::bail!("Arguments in {} must be an object", path.display()),
    }
}

/// Parse `key=value` pairs. Values that parse as JSON are taken as such,
/// everything else is a string.
fn parse_variables(variables: &[String]) -> Result<Map<String, Value>> {
    let mut vars = Map::new();
    for var in variables {
        let (key, value) = var
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid variable format: {}. Expected key=value", var))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_variables() {
        let vars = parse_variables(&[
            "sleeptime=3".to_string(),
            "names=data/names.txt".to_string(),
            "flag=true".to_string(),
            "expr=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(vars["sleeptime"], json!(3));
        assert_eq!(vars["names"], json!("data/names.txt"));
        assert_eq!(vars["flag"], json!(true));
        assert_eq!(vars["expr"], json!("a=b"));

        assert!(parse_variables(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_read_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("args.yaml");
        std::fs::write(&yaml, "names: data/names.txt\nsleeptime: 2\n").unwrap();
        let args = read_arguments(&yaml).unwrap();
        assert_eq!(args["sleeptime"], json!(2));

        let json_file = dir.path().join("args.json");
        std::fs::write(&json_file, "[1, 2]").unwrap();
        assert!(read_arguments(&json_file).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "robctl",
            "run",
            "template.yaml",
            "--set",
            "names=a.txt",
            "--runtime",
            "pool",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { runtime, variables, .. } => {
                assert_eq!(runtime, Runtime::Pool);
                assert_eq!(variables, vec!["names=a.txt"]);
            }
            _ => panic!("expected run command"),
        }
    }
}
