// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use smtbridge::backends::{BackendKind, SmtLib2, Yices};
use smtbridge::config::DriverConfig;
use smtbridge::graph::{Graph, GraphSpec};
use smtbridge::{Capabilities, Connection, SymbolBindings, TermAlgebra};

/// Compiles expression graphs into SMT solver command streams.
#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compiles a JSON expression graph and writes the solver commands.
    Emit {
        /// The path to the graph JSON file.
        graph: PathBuf,

        /// Driver configuration (TOML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides the configured backend.
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Where to write the commands; stdout when absent.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Prints the resolved capability profile.
    Features {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        backend: Option<BackendKind>,
    },
}

fn load_config(path: Option<&Path>, backend: Option<BackendKind>) -> anyhow::Result<DriverConfig> {
    let mut config = match path {
        Some(path) => DriverConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DriverConfig::default(),
    };
    if let Some(backend) = backend {
        config.backend = backend;
    }
    Ok(config)
}

fn emit<B: TermAlgebra, W: Write>(
    sink: W,
    backend: B,
    caps: Capabilities,
    graph: &Graph,
) -> anyhow::Result<()> {
    let bindings: SymbolBindings = graph
        .vars
        .iter()
        .map(|v| (v.id, v.name.clone()))
        .collect();
    let mut conn = Connection::open(sink, backend, caps, bindings)?;
    for (i, root) in graph.assertions.iter().enumerate() {
        conn.compile_and_assert(root)
            .with_context(|| format!("compiling assertion {}", i))?;
    }
    let counts = conn.counts();
    log::info!(
        "emitted {} commands ({} declarations, {} definitions, {} assertions)",
        counts.total(),
        counts.declares,
        counts.defines,
        counts.asserts
    );
    conn.into_sink().flush()?;
    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Commands::Emit {
            graph,
            config,
            backend,
            output,
        } => {
            let config = load_config(config.as_deref(), backend)?;
            let caps = config.capabilities()?;
            let text = std::fs::read_to_string(&graph)
                .with_context(|| format!("reading {}", graph.display()))?;
            let spec = GraphSpec::from_json_str(&text)
                .with_context(|| format!("parsing {}", graph.display()))?;
            let built = spec.build()?;
            let sink: Box<dyn Write> = match &output {
                Some(path) => Box::new(std::io::BufWriter::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?,
                )),
                None => Box::new(std::io::stdout().lock()),
            };
            match config.backend {
                BackendKind::SmtLib2 => emit(sink, SmtLib2::new(), caps, &built),
                BackendKind::Yices => emit(sink, Yices::new(), caps, &built),
            }
        }
        Commands::Features { config, backend } => {
            let config = load_config(config.as_deref(), backend)?;
            println!("{}", config.capabilities()?);
            Ok(())
        }
    }
}

fn main() {
    let _ = env_logger::builder().try_init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
