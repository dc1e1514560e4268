use std::path::{Path, PathBuf};
use std::process;

use armature_core::{SynthConfig, Synthesizer, ValidatorRegistry};

use crate::{app, report_error, OutputFormat};

/// Flags of the `synth` subcommand that override the settings file.
pub(crate) struct SynthArgs<'a> {
    pub app: &'a Path,
    pub config: Option<&'a Path>,
    pub out: Option<&'a Path>,
    pub strict: bool,
    pub linked: bool,
    pub prefer_linked: bool,
    pub skip_validation: bool,
    pub compact: bool,
    pub max_template_size: Option<usize>,
}

fn load_config(path: Option<&Path>) -> Result<SynthConfig, String> {
    let Some(path) = path else {
        return Ok(SynthConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    SynthConfig::from_toml_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Settings file first, then command-line flags on top.
fn resolve_config(args: &SynthArgs<'_>) -> Result<SynthConfig, String> {
    let mut config = load_config(args.config)?;
    if let Some(out) = args.out {
        config.out_dir = PathBuf::from(out);
    }
    config.strict |= args.strict;
    config.skip_validation |= args.skip_validation;
    config.enable_linked_templates |= args.linked || args.prefer_linked;
    config.prefer_linked_templates |= args.prefer_linked;
    if args.compact {
        config.pretty_print = false;
    }
    if let Some(size) = args.max_template_size {
        if size == 0 {
            return Err("--max-template-size must be greater than zero".to_string());
        }
        config.max_template_size = size;
    }
    Ok(config)
}

pub(crate) fn cmd_synth(args: &SynthArgs<'_>, output: OutputFormat, quiet: bool) {
    let config = match resolve_config(args) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let tree = match app::load(args.app) {
        Ok(t) => t,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    let synthesizer = Synthesizer::new(config, ValidatorRegistry::with_defaults());
    let assembly = match synthesizer.synthesize(&tree) {
        Ok(a) => a,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let result = serde_json::json!({
                "directory": assembly.directory.display().to_string(),
                "manifest": assembly.manifest,
                "warnings": assembly.warnings,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&result)
                    .unwrap_or_else(|e| format!("serialization error: {}", e))
            );
        }
        OutputFormat::Text => {
            if quiet {
                return;
            }
            for warning in &assembly.warnings {
                eprintln!("{}", warning);
            }
            println!(
                "Synthesized {} unit(s) into {}",
                assembly.units.len(),
                assembly.directory.display()
            );
            for unit in &assembly.units {
                let mut line = format!(
                    "  {} ({} resource(s), {})",
                    unit.template_file(),
                    unit.resource_count(),
                    unit.scope
                );
                if unit.is_split() {
                    line.push_str(&format!(", {} linked document(s)", unit.linked.len()));
                }
                println!("{}", line);
            }
        }
    }
}
