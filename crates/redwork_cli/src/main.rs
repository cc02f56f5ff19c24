//! `redwork` — a thin command-line front end over `redwork_core`'s public
//! API, mirroring the teacher's `casparian-sentinel` binary: parse args,
//! init logging, drive the library, report results.

use anyhow::Context;
use clap::{Parser, Subcommand};
use redwork_core::{
    register, remove_queue, set_chunk_size, set_export, set_packages, set_reduce, submit, Blob,
    InfoItem, JobSpec, OrderedAccumulator, ReduceSpec, RegisterOptions, VecArgsProducer,
};
use redwork_protocol::ErrorPolicy;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

#[derive(Parser, Debug)]
#[command(name = "redwork", about = "Elastic work-queue dispatcher over a Redis-compatible store")]
struct Cli {
    /// Queue name every subcommand operates against.
    #[arg(long, env = "REDWORK_QUEUE")]
    queue: String,

    /// Store host.
    #[arg(long, env = "REDWORK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Store port.
    #[arg(long, env = "REDWORK_PORT", default_value_t = 6379)]
    port: u16,

    /// Store password, if the deployment requires auth.
    #[arg(long, env = "REDWORK_PASSWORD")]
    password: Option<String>,

    /// Store logical database index.
    #[arg(long, env = "REDWORK_DB", default_value_t = 0)]
    db: i64,

    /// Raise the console log filter to `debug` regardless of `RUST_LOG`.
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register the queue (opens the store connection, writes `Q.live`).
    Register,
    /// Tear down the queue and every key under it.
    RemoveQueue,
    /// Submit a demo job: one task per `--arg`, chunked by `--chunk-size`.
    Submit {
        /// The job expression, taken as an opaque UTF-8 blob.
        #[arg(long)]
        expr: String,
        /// One task per occurrence; each becomes a single-argument task tuple.
        #[arg(long = "arg")]
        args: Vec<String>,
        #[arg(long, default_value_t = 1)]
        chunk_size: usize,
        /// Caller-scope bindings to auto-export, as `name=value` pairs.
        #[arg(long = "bind", value_parser = parse_binding)]
        bindings: Vec<(String, String)>,
        #[arg(long = "export")]
        export: Vec<String>,
    },
    /// Report the advisory worker count, product name, or build version.
    Info {
        #[arg(value_enum)]
        item: InfoArg,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum InfoArg {
    Workers,
    Name,
    Version,
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = redwork_logging::init_logging(redwork_logging::LogConfig {
        app_name: "redwork",
        verbose: cli.verbose,
    })
    .context("failed to initialize logging")?;

    let mut opts = RegisterOptions::new(cli.queue.clone());
    opts.host = cli.host;
    opts.port = cli.port;
    opts.password = cli.password;
    opts.db = cli.db;
    register(opts).await.context("register failed")?;

    match cli.command {
        Command::Register => {
            tracing::info!(queue = %cli.queue, "queue registered");
        }
        Command::RemoveQueue => {
            remove_queue(&cli.queue).await.context("remove_queue failed")?;
            tracing::info!(queue = %cli.queue, "queue removed");
        }
        Command::Submit { expr, args, chunk_size, bindings, export } => {
            let chunk_size = NonZeroUsize::new(chunk_size).context("--chunk-size must be nonzero")?;
            set_chunk_size(chunk_size);
            set_reduce(ReduceSpec::None);
            set_export(export.clone());
            set_packages(Vec::<String>::new());

            let caller_scope: HashMap<String, Blob> = bindings
                .into_iter()
                .map(|(name, value)| (name, Blob::new(value.into_bytes())))
                .collect();

            let producer_items: Vec<Vec<Blob>> =
                args.into_iter().map(|arg| vec![Blob::new(arg.into_bytes())]).collect();
            anyhow::ensure!(!producer_items.is_empty(), "submit requires at least one --arg");

            let job = JobSpec {
                expr: Blob::new(expr.into_bytes()),
                caller_scope,
                auto_discovered: HashSet::new(),
                noexport: HashSet::new(),
                export,
                packages: Vec::new(),
                reduce: None,
                combine: None,
                on_error: ErrorPolicy::Pass,
                chunk_size: Some(chunk_size),
                producer: Box::new(VecArgsProducer::new(producer_items)),
                stream: Box::new(redwork_core::DefaultStreamSource::new(0)),
                accumulator: Box::new(OrderedAccumulator::new()),
                cancellation: tokio_util::sync::CancellationToken::new(),
            };

            let outcome = submit(job).await.context("submit failed")?;
            println!("job {} delivered {} result(s)", outcome.job_id, outcome.delivered);
            if !outcome.errors.is_empty() {
                eprintln!("{} combine error(s): {:?}", outcome.errors.len(), outcome.errors);
            }
            println!("{}", String::from_utf8_lossy(outcome.result.as_bytes()));
        }
        Command::Info { item } => {
            let item = match item {
                InfoArg::Workers => InfoItem::Workers,
                InfoArg::Name => InfoItem::Name,
                InfoArg::Version => InfoItem::Version,
            };
            let value = redwork_core::info(item).await.context("info failed")?;
            println!("{value:?}");
        }
    }

    Ok(())
}
