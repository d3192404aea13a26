use aminoscan::{
    Annotator, AnnotatorConfig, ProteinSequence, Source, about,
    composition::CompositionReport,
    motif_library::MotifLibrary,
    position_pattern::CompiledPattern,
};
use anyhow::Context;
use serde::Serialize;
use std::{env, fs};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct CompiledSummary<'a> {
    pattern: &'a str,
    regex: &'a str,
    min_length: usize,
    n_terminal: bool,
    c_terminal: bool,
}

fn usage() {
    eprintln!(
        "Usage:\n  \
  aminoscan_cli --version\n  \
  aminoscan_cli [--config PATH] sources\n  \
  aminoscan_cli [--config PATH] motifs [ID|NAME]\n  \
  aminoscan_cli compile PATTERN\n  \
  aminoscan_cli classify SEQUENCE\n  \
  aminoscan_cli [--config PATH] annotate SEQUENCE [--sources a,b,c]\n\n  \
  Tip: pass @file.fasta instead of an inline sequence\n  \
  Logging: RUST_LOG=debug aminoscan_cli ..."
    );
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_sequence_arg(value: &str) -> Result<ProteinSequence, String> {
    if let Some(path) = value.strip_prefix('@') {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Could not read sequence file '{path}': {e}"))?;
        ProteinSequence::from_fasta_text(&text).map_err(|e| e.to_string())
    } else {
        ProteinSequence::new(value).map_err(|e| e.to_string())
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<AnnotatorConfig> {
    let config = match path {
        Some(path) => AnnotatorConfig::load_from_path(path)
            .with_context(|| format!("Could not load configuration '{path}'"))?,
        None => AnnotatorConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

fn parse_global_config_arg(args: &[String]) -> (Option<String>, usize) {
    if args.len() >= 3 && args[1] == "--config" {
        return (Some(args[2].clone()), 3);
    }
    (None, 1)
}

fn requested_sources(rest: &[String]) -> Result<Vec<String>, String> {
    match rest {
        [] => Ok(Source::ALL.iter().map(|s| s.name().to_string()).collect()),
        [flag, list] if flag == "--sources" => {
            Ok(list.split(',').map(|s| s.trim().to_string()).collect())
        }
        _ => Err(format!("Unexpected arguments: {}", rest.join(" "))),
    }
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let (config_path, cmd_idx) = parse_global_config_arg(&args);
    if args.len() <= cmd_idx {
        usage();
        return Err("Missing command".to_string());
    }
    let command = &args[cmd_idx];
    let operand = args.get(cmd_idx + 1);

    match command.as_str() {
        "sources" => {
            let names: Vec<&str> = Source::ALL.iter().map(|s| s.name()).collect();
            print_json(&names)
        }
        "motifs" => {
            let config = load_config(config_path.as_deref()).map_err(|e| format!("{e:#}"))?;
            let library = MotifLibrary::load(config.motif_library_path.as_deref())
                .map_err(|e| e.to_string())?;
            match operand {
                Some(token) => {
                    let motif = library
                        .resolve(token)
                        .ok_or_else(|| format!("Unknown motif '{token}'"))?;
                    print_json(&motif.summary())
                }
                None => print_json(&library.summaries()),
            }
        }
        "compile" => {
            let Some(pattern) = operand else {
                usage();
                return Err("Missing pattern for compile".to_string());
            };
            let compiled = CompiledPattern::compile(pattern).map_err(|e| e.to_string())?;
            print_json(&CompiledSummary {
                pattern: compiled.source(),
                regex: compiled.regex().as_str(),
                min_length: compiled.pattern().min_length(),
                n_terminal: compiled.pattern().is_n_terminal(),
                c_terminal: compiled.pattern().is_c_terminal(),
            })
        }
        "classify" => {
            let Some(value) = operand else {
                usage();
                return Err("Missing sequence for classify".to_string());
            };
            let sequence = load_sequence_arg(value)?;
            print_json(&CompositionReport::new(&sequence))
        }
        "annotate" => {
            let Some(value) = operand else {
                usage();
                return Err("Missing sequence for annotate".to_string());
            };
            let sequence = load_sequence_arg(value)?;
            let sources = requested_sources(&args[cmd_idx + 2..])?;
            let config = load_config(config_path.as_deref()).map_err(|e| format!("{e:#}"))?;
            let annotator = Annotator::from_config(&config).map_err(|e| e.to_string())?;
            tracing::debug!(motifs = annotator.library().len(), "annotator ready");
            let result = annotator
                .try_annotate(&sequence, &sources)
                .map_err(|e| e.to_string())?;
            tracing::info!(
                sources = result.len(),
                matches = result.total_matches(),
                "annotation complete"
            );
            print_json(&result)
        }
        "help" | "--help" | "-h" => {
            usage();
            Ok(())
        }
        other => {
            usage();
            Err(format!("Unknown command '{other}'"))
        }
    }
}
