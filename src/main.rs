//! silopt - SIL optimizer driver
//!
//! Parses a `.sil` file, optionally runs simplify-cfg over it and prints the
//! result or its symbol table.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use silc::backend::{ForDefinition, LinkEntity, LinkInfo, LinkPolicy, ObjectFormat, ObjectModule};
use silc::frontend::parse_sil_module;
use silc::middle::ir_printer::print_module;
use silc::middle::optimize::simplify_module;
use silc::middle::simplify_cfg::SimplifyCfgOptions;
use silc::SilModule;

/// SIL optimizer
#[derive(Parser, Debug)]
#[command(name = "silopt")]
#[command(version = "0.1.0")]
#[command(about = "Parse, simplify and print SIL")]
struct Cli {
    /// Input SIL file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Run simplify-cfg on every function
    #[arg(short = 'O')]
    optimize: bool,

    /// simplify-cfg options as a JSON file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write simplify-cfg statistics as JSON
    #[arg(long, value_name = "FILE")]
    emit_stats: Option<PathBuf>,

    /// Print the symbol table of the module instead of SIL
    #[arg(long)]
    emit_symbols: bool,

    /// Object format used by --emit-symbols (elf, macho, coff)
    #[arg(long, default_value = "elf")]
    object_format: ObjectFormat,

    /// Name of the module being compiled
    #[arg(long, default_value = "main")]
    module_name: String,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let mut module = match parse_sil_module(&source, &cli.module_name) {
        Ok(module) => module,
        Err(diagnostics) => {
            for diagnostic in &diagnostics {
                eprintln!("{}:{}", cli.input.display(), diagnostic);
            }
            bail!("{} error(s) while parsing {}", diagnostics.len(), cli.input.display());
        }
    };
    info!("parsed {} function(s)", module.function_count());

    if cli.optimize {
        let options = match &cli.config {
            Some(path) => load_options(path)?,
            None => SimplifyCfgOptions::default(),
        };
        let stats = simplify_module(&mut module, options);
        info!("simplify-cfg changed {} function(s)", stats.functions_changed);
        if let Some(path) = &cli.emit_stats {
            fs::write(path, serde_json::to_string_pretty(&stats)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    } else if cli.emit_stats.is_some() {
        bail!("--emit-stats requires -O");
    }

    let text = if cli.emit_symbols {
        symbol_table(&module, cli.object_format)?
    } else {
        print_module(&module)
    };
    match &cli.output {
        Some(path) => fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", text),
    }
    Ok(())
}

fn load_options(path: &Path) -> Result<SimplifyCfgOptions> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid options in {}", path.display()))
}

/// Symbols of every function and global, as JSON
fn symbol_table(module: &SilModule, format: ObjectFormat) -> Result<String> {
    let policy = LinkPolicy::new(module.module_id, format);
    let mut object = ObjectModule::new(format);
    for (id, func) in module.functions() {
        let for_definition = if func.is_definition() {
            ForDefinition::Definition
        } else {
            ForDefinition::Declaration
        };
        LinkInfo::get(&LinkEntity::for_sil_function(id), module, &policy, for_definition, &mut object);
    }
    for (id, _) in module.globals() {
        LinkInfo::get(
            &LinkEntity::for_sil_global(id),
            module,
            &policy,
            ForDefinition::Definition,
            &mut object,
        );
    }
    Ok(serde_json::to_string_pretty(&object)?)
}
