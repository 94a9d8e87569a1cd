// Copyright 2025 Cornell University
// released under MIT License

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ColorChoice, Parser};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use log::{info, LevelFilter};

use interface_automata::bes::{FixpointSolver, LocalFixpointSolver};
use interface_automata::diagnostic::{DiagnosticHandler, Level};
use interface_automata::model::load;
use interface_automata::runtime::{Outcome, Runtime};
use interface_automata::serialize::{serialize, serialize_product_errors, serialize_trace};
use interface_automata::solver::{PbesSolver, ToolConfig, Z3Solver};

// $ cargo run -- systems.json -e "refine(Impl, Spec)" --trace

/// Args for the interface automata checker
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Path to a systems (.json) file
    #[arg(value_name = "SYSTEMS_FILE")]
    input: PathBuf,

    /// Statement to run after the `init` statements of the systems file.
    /// Can be used multiple times.
    #[arg(short, long = "exec", value_name = "STATEMENT")]
    exec: Vec<String>,

    /// Writes every system defined at the end of the run to this file
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    output: Option<PathBuf>,

    /// Path to the z3 binary (searched on PATH otherwise)
    #[arg(long, value_name = "Z3")]
    z3: Option<PathBuf>,

    /// Path to the mCRL2 pbes2bes binary (searched on PATH otherwise)
    #[arg(long, value_name = "PBES2BES")]
    pbes2bes: Option<PathBuf>,

    /// Path to the mCRL2 pbessolve binary (searched on PATH otherwise)
    #[arg(long, value_name = "PBESSOLVE")]
    pbessolve: Option<PathBuf>,

    /// Decides refinement with the built-in fixpoint solver instead of mCRL2
    #[arg(long)]
    local_bes: bool,

    /// Keeps the generated SMT and BES scripts in this directory
    #[arg(long, value_name = "DIR")]
    dump_dir: Option<PathBuf>,

    /// Prints a counterexample for every failed refinement and the path to
    /// every error state found while composing
    #[arg(long)]
    trace: bool,

    /// Users can specify `-v` or `--verbose` to toggle logging
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// To suppress colors in error messages, pass in `--color never`
    /// Otherwise, by default, error messages are displayed w/ ANSI colors
    #[arg(long, value_name = "COLOR_CHOICE", default_value = "auto")]
    color: ColorChoice,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // For concision, we disable timestamps in the log
    let mut logger = env_logger::Builder::new();
    logger
        .format_timestamp(None)
        .filter_level(cli.verbosity.log_level_filter());
    if cli.color == ColorChoice::Never {
        logger.write_style(env_logger::WriteStyle::Never);
    }
    logger.init();

    let mut handler = DiagnosticHandler::new(cli.color);

    let text = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read systems file {}", cli.input.display()))?;
    let file = match load(&text) {
        Ok(file) => file,
        Err(e) => {
            handler.emit_error(&e, None);
            bail!("failed to load {}", cli.input.display());
        }
    };

    let config = ToolConfig {
        z3: cli.z3.clone(),
        pbes2bes: cli.pbes2bes.clone(),
        pbessolve: cli.pbessolve.clone(),
        dump_dir: cli.dump_dir.clone(),
    }
    .resolve();
    let z3 = Z3Solver::new(&config);
    let pbes = PbesSolver::new(&config).with_verbose(cli.verbosity.log_level_filter() >= LevelFilter::Debug);
    let fixpoint: &dyn FixpointSolver = if cli.local_bes { &LocalFixpointSolver } else { &pbes };

    let mut runtime = Runtime::new(&z3, fixpoint);
    for system in file.systems {
        runtime.define(system);
    }

    let mut stdout = std::io::stdout().lock();
    let mut failed = 0;
    for (index, stmt) in file.init.iter().chain(&cli.exec).enumerate() {
        let fileid = handler.add_file(format!("statement {}", index + 1), stmt.clone());
        let outcome = match runtime.run(stmt) {
            Ok(outcome) => outcome,
            Err(e) => {
                handler.emit_error(&e, Some(fileid));
                bail!("failed to execute `{stmt}`");
            }
        };
        match outcome {
            Outcome::Defined { name, errors } => {
                let system = runtime.get(&name)?;
                writeln!(stdout, "{name}: {} automaton with {} states", system.variant(), system.num_states())?;
                if !errors.is_empty() {
                    handler.emit_general_message(
                        &format!("{} error states were pruned from '{name}'", errors.len()),
                        Level::Warning,
                    );
                    if cli.trace {
                        serialize_product_errors(&mut stdout, &errors)?;
                    }
                }
            }
            Outcome::Refinement {
                concrete,
                abstraction,
                verdict,
            } => {
                if verdict.holds {
                    writeln!(stdout, "{concrete} refines {abstraction}")?;
                    continue;
                }
                failed += 1;
                match verdict.counterexample().filter(|_| cli.trace) {
                    Some(trace) => serialize_trace(&mut stdout, &concrete, &abstraction, &trace)?,
                    None => writeln!(stdout, "{concrete} does not refine {abstraction}")?,
                }
            }
        }
    }

    if let Some(path) = &cli.output {
        let mut out = std::fs::File::create(path)
            .with_context(|| format!("failed to create output file {}", path.display()))?;
        for system in runtime.systems() {
            serialize(&mut out, system)?;
        }
        info!("wrote {} systems to {}", runtime.systems().count(), path.display());
    }

    if failed > 0 {
        bail!("{failed} refinement checks failed");
    }
    Ok(())
}
