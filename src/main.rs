use std::path::PathBuf;
use std::sync::Arc;

use gridsolve_core::default_settings_path;
use gridsolve_core::pipeline::orchestrator::SolvePipeline;
use gridsolve_core::pipeline::res::ResDiagramBuilder;
use gridsolve_core::pipeline::solver::SolverKind;
use gridsolve_core::run::{NewRun, Run, RunId, RunState};
use gridsolve_core::settings::WorkerSettings;
use gridsolve_core::storage::{FsBlobStore, SharedBlobStore};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    if matches!(cli_args.first().map(String::as_str), Some("solve")) {
        run_solve_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
        return Ok(());
    }
    if matches!(cli_args.first().map(String::as_str), Some("gen-res")) {
        run_gen_res_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
        return Ok(());
    }

    print_usage();
    Err(std::io::Error::other("Missing subcommand. Use solve or gen-res.").into())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SolveCliArgs {
    run_id: u64,
    model_key: String,
    data_key: String,
    pre_process: bool,
    post_process: bool,
    solver: SolverKind,
    settings_path: Option<String>,
    blob_root: Option<String>,
    scratch_root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GenResCliArgs {
    run_id: u64,
    data_key: String,
    settings_path: Option<String>,
    blob_root: Option<String>,
    scratch_root: Option<String>,
}

fn parse_solve_cli_args(args: &[String]) -> Result<SolveCliArgs, Box<dyn std::error::Error>> {
    let mut run_id = None::<u64>;
    let mut model_key = None::<String>;
    let mut data_key = None::<String>;
    let mut pre_process = false;
    let mut post_process = false;
    let mut solver = SolverKind::Cbc;
    let mut settings_path = None::<String>;
    let mut blob_root = None::<String>;
    let mut scratch_root = None::<String>;

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--run-id" => {
                run_id = Some(needs_value(i)?.parse::<u64>().map_err(|_| {
                    std::io::Error::other("--run-id must be a non-negative integer")
                })?);
                i += 2;
            }
            "--model-key" => {
                model_key = Some(needs_value(i)?);
                i += 2;
            }
            "--data-key" => {
                data_key = Some(needs_value(i)?);
                i += 2;
            }
            "--pre-process" => {
                pre_process = true;
                i += 1;
            }
            "--post-process" => {
                post_process = true;
                i += 1;
            }
            "--solver" => {
                let value = needs_value(i)?;
                solver = SolverKind::parse(value.as_str()).ok_or_else(|| {
                    std::io::Error::other(format!(
                        "Unknown solver '{value}'. Accepted: cbc, dry-run."
                    ))
                })?;
                i += 2;
            }
            "--settings" => {
                settings_path = Some(needs_value(i)?);
                i += 2;
            }
            "--blob-root" => {
                blob_root = Some(needs_value(i)?);
                i += 2;
            }
            "--scratch-root" => {
                scratch_root = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let run_id = run_id.ok_or_else(|| std::io::Error::other("Missing required --run-id"))?;
    let model_key = model_key
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| std::io::Error::other("Missing required --model-key"))?;
    let data_key = data_key
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| std::io::Error::other("Missing required --data-key"))?;

    Ok(SolveCliArgs {
        run_id,
        model_key,
        data_key,
        pre_process,
        post_process,
        solver,
        settings_path,
        blob_root,
        scratch_root,
    })
}

fn parse_gen_res_cli_args(args: &[String]) -> Result<GenResCliArgs, Box<dyn std::error::Error>> {
    let mut run_id = None::<u64>;
    let mut data_key = None::<String>;
    let mut settings_path = None::<String>;
    let mut blob_root = None::<String>;
    let mut scratch_root = None::<String>;

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--run-id" => {
                run_id = Some(needs_value(i)?.parse::<u64>().map_err(|_| {
                    std::io::Error::other("--run-id must be a non-negative integer")
                })?);
                i += 2;
            }
            "--data-key" => {
                data_key = Some(needs_value(i)?);
                i += 2;
            }
            "--settings" => {
                settings_path = Some(needs_value(i)?);
                i += 2;
            }
            "--blob-root" => {
                blob_root = Some(needs_value(i)?);
                i += 2;
            }
            "--scratch-root" => {
                scratch_root = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let run_id = run_id.ok_or_else(|| std::io::Error::other("Missing required --run-id"))?;
    let data_key = data_key
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| std::io::Error::other("Missing required --data-key"))?;

    Ok(GenResCliArgs {
        run_id,
        data_key,
        settings_path,
        blob_root,
        scratch_root,
    })
}

fn build_collaborators(
    settings_path: Option<&str>,
    blob_root: Option<&str>,
    scratch_root: Option<&str>,
) -> Result<
    (gridsolve_core::settings::SolveContext, SharedBlobStore),
    Box<dyn std::error::Error>,
> {
    let settings_file = settings_path
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path);
    let settings = WorkerSettings::load(Some(settings_file.as_path()))?;

    let mut ctx = settings.solve_context();
    if let Some(root) = scratch_root {
        ctx.scratch_root = PathBuf::from(root);
    }
    let blob_root = blob_root
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.blob_root());
    let store: SharedBlobStore = Arc::new(FsBlobStore::new(blob_root));
    Ok((ctx, store))
}

fn run_solve_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_solve_usage();
        return Ok(());
    }

    let parsed = parse_solve_cli_args(args.as_slice())?;
    let (ctx, store) = build_collaborators(
        parsed.settings_path.as_deref(),
        parsed.blob_root.as_deref(),
        parsed.scratch_root.as_deref(),
    )?;

    let mut run = Run::create(NewRun {
        id: RunId::new(parsed.run_id),
        model_key: parsed.model_key,
        data_key: parsed.data_key,
        pre_process: parsed.pre_process,
        post_process: parsed.post_process,
    })?;

    let pipeline = SolvePipeline::new(ctx, parsed.solver, store);
    let report = pipeline.execute(&mut run, None)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": report.final_state == RunState::Succeeded,
            "run_id": run.id(),
            "final_state": report.final_state,
            "result_key": run.result_artifact().map(|handle| handle.key.as_str()),
            "log_key": run.log_artifact().map(|handle| handle.key.as_str()),
            "csv_key": run.csv_artifact().map(|handle| handle.key.as_str()),
        }))?
    );

    if report.final_state == RunState::Failed {
        return Err(std::io::Error::other(format!("run {} failed", run.id())).into());
    }
    Ok(())
}

fn run_gen_res_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_gen_res_usage();
        return Ok(());
    }

    let parsed = parse_gen_res_cli_args(args.as_slice())?;
    let (ctx, store) = build_collaborators(
        parsed.settings_path.as_deref(),
        parsed.blob_root.as_deref(),
        parsed.scratch_root.as_deref(),
    )?;

    // The diagram only reads the data file; no model blob is involved.
    let mut run = Run::create(NewRun {
        id: RunId::new(parsed.run_id),
        model_key: String::new(),
        data_key: parsed.data_key,
        pre_process: false,
        post_process: false,
    })?;

    let handle = ResDiagramBuilder::new(ctx, store).build(&mut run)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": true,
            "run_id": run.id(),
            "res_key": handle.key,
        }))?
    );
    Ok(())
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  gridsolve-worker solve --run-id <id> --model-key <key> --data-key <key> ",
        "[--pre-process] [--post-process] [--solver cbc|dry-run] ",
        "[--settings PATH] [--blob-root PATH] [--scratch-root PATH]\n",
        "  gridsolve-worker gen-res --run-id <id> --data-key <key> ",
        "[--settings PATH] [--blob-root PATH] [--scratch-root PATH]\n"
    ));
}

fn print_solve_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  gridsolve-worker solve --run-id <id> --model-key <key> --data-key <key> ",
        "[--pre-process] [--post-process] [--solver cbc|dry-run] ",
        "[--settings PATH] [--blob-root PATH] [--scratch-root PATH]\n\n",
        "Defaults:\n",
        "  --solver defaults to cbc\n",
        "  --settings defaults to config/worker.toml next to the manifest\n",
        "  --blob-root / --scratch-root override the settings file\n",
        "  exit status is non-zero when the run finishes in the failed state\n"
    ));
}

fn print_gen_res_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  gridsolve-worker gen-res --run-id <id> --data-key <key> ",
        "[--settings PATH] [--blob-root PATH] [--scratch-root PATH]\n"
    ));
}
