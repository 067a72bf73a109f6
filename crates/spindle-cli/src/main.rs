use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use spindle_store::ports::{Clock, SystemClock};
use spindle_store::store::STORE_PATH_ENV;
use spindle_store::{
    Filter, Keystore, NewStackRun, NewTaskRun, RunStatus, SqliteStore, StackRun, StackRunHierarchy,
    StackRunId, StackRunPatch, StoreLocation, TaskRunId, TaskRunPatch, TaskRunRegistry,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Inspect and exercise a spindle store.
#[derive(Debug, Parser)]
#[command(name = "spindle", version)]
struct Cli {
    /// Store file, or `:memory:` for a throwaway store.
    #[arg(long, global = true, env = STORE_PATH_ENV, default_value = ":memory:")]
    store: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stack runs waiting to be picked up, oldest first.
    Pending,

    /// Task runs, optionally limited to some statuses.
    TaskRuns {
        #[arg(long = "status")]
        statuses: Vec<RunStatus>,
    },

    /// A task run with its stack runs nested under their parents.
    Tree { task_run: TaskRunId },

    /// Records per status in both run tables.
    Counts,

    #[command(subcommand)]
    Keystore(KeystoreCommand),

    /// Walk a frame through suspend / child completes / resume and checkpoint.
    Demo,
}

#[derive(Debug, Subcommand)]
enum KeystoreCommand {
    Get { key: String },
    /// VALUE is parsed as JSON; anything else is stored as a string.
    Set { key: String, value: String },
    Delete { key: String },
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let location = StoreLocation::parse(&cli.store)?;
    let store = SqliteStore::at(location);
    let report = store.initialize().await?;
    for warning in &report.warnings {
        warn!(%warning, "store opened degraded");
    }

    let outcome = dispatch(&store, cli.command).await;

    let closed = store.close().await;
    for warning in &closed.warnings {
        warn!(%warning, "store closed degraded");
    }

    print_json(&outcome?)
}

async fn dispatch(store: &SqliteStore, command: Command) -> CliResult<Value> {
    let output = match command {
        Command::Pending => serde_json::to_value(store.pending_work().await?)?,
        Command::TaskRuns { statuses } => {
            let filter = if statuses.is_empty() {
                Filter::new()
            } else {
                Filter::new().status_in(statuses)
            };
            serde_json::to_value(store.query_task_runs(&filter).await?)?
        }
        Command::Tree { task_run } => tree(store, task_run).await?,
        Command::Counts => json!({
            "task_runs": store.task_run_counts().await?,
            "stack_runs": store.stack_run_counts().await?,
        }),
        Command::Keystore(command) => keystore(store, command).await?,
        Command::Demo => demo(store).await?,
    };
    Ok(output)
}

async fn keystore(store: &SqliteStore, command: KeystoreCommand) -> CliResult<Value> {
    let output = match command {
        KeystoreCommand::Get { key } => json!({
            "key": key,
            "value": store.get_keystore(&key).await?,
        }),
        KeystoreCommand::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            store.set_keystore(&key, value.clone()).await?;
            json!({ "key": key, "value": value })
        }
        KeystoreCommand::Delete { key } => {
            store.delete_keystore(&key).await?;
            json!({ "deleted": key })
        }
        KeystoreCommand::List => json!(store.keystore_keys().await?),
    };
    Ok(output)
}

async fn tree(store: &SqliteStore, id: TaskRunId) -> CliResult<Value> {
    let Some(task_run) = store.get_task_run(id).await? else {
        return Err(format!("no task run {id}").into());
    };
    let frames = store
        .query_stack_runs(&Filter::new().eq("task_run_id", id))
        .await?;

    let mut by_parent: HashMap<Option<StackRunId>, Vec<StackRun>> = HashMap::new();
    for frame in frames {
        by_parent
            .entry(frame.parent_stack_run_id)
            .or_default()
            .push(frame);
    }

    Ok(json!({
        "task_run": task_run,
        "frames": nest(&mut by_parent, None)?,
    }))
}

fn nest(
    by_parent: &mut HashMap<Option<StackRunId>, Vec<StackRun>>,
    parent: Option<StackRunId>,
) -> CliResult<Vec<Value>> {
    let mut nodes = Vec::new();
    for frame in by_parent.remove(&parent).unwrap_or_default() {
        let children = nest(by_parent, Some(frame.id))?;
        let mut node = serde_json::to_value(&frame)?;
        if let Value::Object(map) = &mut node {
            map.insert("children".to_string(), Value::Array(children));
        }
        nodes.push(node);
    }
    Ok(nodes)
}

/// The suspend-on-child round trip a scheduler performs, step by step.
async fn demo(store: &SqliteStore) -> CliResult<Value> {
    let task_run = store
        .create_task_run(NewTaskRun::new("demo-report").with_input(json!({"pages": 2})))
        .await?;
    let task_run = store
        .update_task_run(task_run.id, TaskRunPatch::new().status(RunStatus::Running))
        .await?;

    let parent = store
        .create_stack_run(
            NewStackRun::new(task_run.id, "build-report").with_status(RunStatus::Running),
        )
        .await?;
    let parent = store
        .update_stack_run(parent.id, StackRunPatch::suspend_waiting_child(SystemClock.now()))
        .await?;
    info!(frame = %parent.id, "parent waiting on child");

    let child = store
        .create_stack_run(
            NewStackRun::child_of(task_run.id, parent.id, "fetch-page")
                .with_input(json!({"page": 1})),
        )
        .await?;
    let waiting = store.pending_work().await?.len();

    let child = store
        .update_stack_run(child.id, StackRunPatch::new().status(RunStatus::Running))
        .await?;
    let child = store
        .update_stack_run(
            child.id,
            StackRunPatch::new()
                .status(RunStatus::Completed)
                .result(json!({"rows": 42})),
        )
        .await?;

    let parent = store
        .update_stack_run(
            parent.id,
            StackRunPatch::resume(child.result.clone().unwrap_or(Value::Null))
                .status(RunStatus::Completed)
                .result(json!({"report": "done"})),
        )
        .await?;
    let task_run = store
        .update_task_run(
            task_run.id,
            TaskRunPatch::new()
                .status(RunStatus::Completed)
                .result(json!({"report": "done"})),
        )
        .await?;

    store.checkpoint().await?;

    Ok(json!({
        "task_run": task_run,
        "parent": parent,
        "child": child,
        "pending_while_waiting": waiting,
        "pending_now": store.pending_work().await?.len(),
    }))
}

fn print_json(value: &Value) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
