use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    Ir,
    Summary,
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "patchc",
    version,
    about = "Patch compiler: lowers dataflow audio patch documents to a scheduled low-level IR"
)]
struct Cli {
    /// Input .hv.json graph document
    source: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Abstraction search directory (repeatable)
    #[arg(short = 'I', long = "import")]
    import: Vec<PathBuf>,

    /// Override the patch name
    #[arg(long)]
    name: Option<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Ir)]
    emit: EmitStage,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.verbose {
        eprintln!("patchc: source = {}", cli.source.display());
        eprintln!("patchc: emit   = {:?}", cli.emit);
    }

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("patchc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    if let EmitStage::BuildInfo = cli.emit {
        let provenance = patchc::pipeline::compute_provenance(&source);
        write_output(cli.output.as_ref(), &provenance.to_json());
        return;
    }

    // ── Compile ──
    let options = patchc::pipeline::CompileOptions {
        name: cli.name.clone(),
        import_paths: cli.import.clone(),
        verbose: cli.verbose,
    };
    let compiled = match patchc::pipeline::compile_str(&source, Some(&cli.source), &options) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.report());
            std::process::exit(1);
        }
    };
    for warning in compiled.notices.warnings() {
        eprintln!("{}", warning);
    }

    if cli.verbose {
        eprintln!(
            "patchc: {} objects, {} signal nodes, {} float / {} int buffers",
            compiled.ir.objects.len(),
            compiled.ir.signal.process_order.len(),
            compiled.stats.schedule.float_buffers,
            compiled.stats.schedule.int_buffers,
        );
    }

    // ── Emit ──
    let rendered = match cli.emit {
        EmitStage::Summary => to_json(&compiled.summary(), cli.pretty),
        _ => to_json(&compiled.ir, cli.pretty),
    };
    match rendered {
        Ok(mut text) => {
            text.push('\n');
            write_output(cli.output.as_ref(), &text);
        }
        Err(e) => {
            eprintln!("patchc: error: {}", e);
            std::process::exit(2);
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

fn write_output(path: Option<&PathBuf>, text: &str) {
    let result = match path {
        Some(p) => std::fs::write(p, text),
        None => std::io::stdout().write_all(text.as_bytes()),
    };
    if let Err(e) = result {
        eprintln!("patchc: error: {}", e);
        std::process::exit(2);
    }
}
