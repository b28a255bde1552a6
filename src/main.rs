use std::{
    io::{BufRead, Write},
    net::SocketAddr,
    sync::Arc,
};

use clap::Parser;
use sieve::{
    DataDir,
    Engine,
    Error,
    Response,
    Result,
    Settings,
    engine::{self, SearchOutcome},
    http::{self, AppState, ReloadSource},
    mcp,
    records,
    settings::Overrides,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{BuildArgs, Cli, Command, KeysArgs, QueryArgs, ServeArgs};

const LOG_ENV: &str = "SIEVE_LOG";

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var(LOG_ENV) {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let overrides = cli.overrides();
    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Build(args) => cmd_build(&data_dir, &overrides, &args)?,
        Command::Query(args) => cmd_query(&data_dir, &overrides, &args)?,
        Command::Shell => cmd_shell(&data_dir, &overrides)?,
        Command::Keys(args) => cmd_keys(&data_dir, &args)?,
        Command::Status(args) => cmd_status(&data_dir, args.json)?,
        Command::Serve(args) => cmd_serve(data_dir, overrides, &args)?,
        Command::Mcp => {
            let snapshot = engine::load(&data_dir, &overrides)?;
            mcp::run_mcp(Arc::new(Engine::new(snapshot)))?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_build(
    data_dir: &DataDir,
    overrides: &Overrides,
    args: &BuildArgs,
) -> Result<()> {
    let records = if args.reads_stdin() {
        records::parse_lines(std::io::stdin().lock())?
    } else {
        if !args.records.is_file() {
            return Err(Error::Config(format!(
                "records file does not exist: {}",
                args.records.display()
            )));
        }
        records::load_jsonl(&args.records)?
    };

    let settings = Settings::default().with_env()?.with_overrides(overrides);
    let (generation, summary) =
        engine::build_generation(data_dir, records, &settings)?;

    eprintln!(
        "Indexed {} records: {} prefixes across {} fields",
        summary.records, summary.prefixes, summary.fields
    );
    if settings.hybrid {
        eprintln!("Embedded {} prefixes", summary.embedded);
    }
    eprintln!("Published generation {}", generation.name());
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn explain(outcome: &SearchOutcome) -> Result<()> {
    for report in &outcome.reports {
        eprintln!("{}", serde_json::to_string(report)?);
    }
    if !outcome.ignored_keys.is_empty() {
        eprintln!("ignored keys: {}", outcome.ignored_keys.join(", "));
    }
    Ok(())
}

fn cmd_query(
    data_dir: &DataDir,
    overrides: &Overrides,
    args: &QueryArgs,
) -> Result<()> {
    let snapshot = engine::load(data_dir, overrides)?;
    let outcome = snapshot.search(&args.query)?;
    if args.explain {
        explain(&outcome)?;
    }
    print_json(&Response::search(outcome))
}

fn cmd_shell(data_dir: &DataDir, overrides: &Overrides) -> Result<()> {
    let snapshot = engine::load(data_dir, overrides)?;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "q" {
            break;
        }

        let response = match snapshot.search(line) {
            Ok(outcome) => Response::search(outcome),
            Err(e) if e.is_client_error() => Response::failed(&e),
            Err(e) => return Err(e),
        };
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn cmd_keys(data_dir: &DataDir, args: &KeysArgs) -> Result<()> {
    let mut fields = engine::field_paths(data_dir)?;

    if let Some(pattern) = &args.pattern {
        let glob = globset::Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid glob pattern: {e}")))?
            .compile_matcher();
        fields.retain(|field| glob.is_match(field));
    }

    if args.json {
        print_json(&Response::keys(fields))
    } else {
        for field in &fields {
            println!("{field}");
        }
        Ok(())
    }
}

fn cmd_status(data_dir: &DataDir, json: bool) -> Result<()> {
    let (generation, stats, settings) = engine::status(data_dir)?;

    if json {
        print_json(&serde_json::json!({
            "data_dir": data_dir.root(),
            "generation": generation.name(),
            "records": stats.records,
            "prefixes": stats.prefixes,
            "fields": stats.fields,
            "settings": settings,
        }))
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Generation: {}", generation.name());
        println!("Records: {}", stats.records);
        println!("Prefixes: {}", stats.prefixes);
        println!("Fields: {}", stats.fields);
        println!("Wildcard limit: {}", settings.wel);
        println!("Negation limit: {}", settings.nel);
        println!("Hybrid: {}", settings.hybrid);
        Ok(())
    }
}

fn cmd_serve(
    data_dir: DataDir,
    overrides: Overrides,
    args: &ServeArgs,
) -> Result<()> {
    let snapshot = engine::load(&data_dir, &overrides)?;
    let state = AppState::new(
        Arc::new(Engine::new(snapshot)),
        Some(ReloadSource {
            data_dir,
            overrides,
        }),
    );
    let addr = SocketAddr::new(args.host, args.port);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("failed to start tokio runtime: {e}")))?;
    runtime.block_on(http::serve(state, addr))
}
