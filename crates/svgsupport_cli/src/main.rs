//! Command-line probe for the SVG support core.
//!
//! # Responsibility
//! - Run detection, sanitization, metadata and patch rules against local
//!   files without a host CMS.
//! - Exit 0 on success or accept, 1 on reject or error.

use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use svgsupport_core::gate::{
    AcceptAll, HeaderImageInfo, ImageInfoSource, MessageQueue, UploadValidator,
};
use svgsupport_core::patch::apply_rules;
use svgsupport_core::{
    default_log_level, init_logging, ContentGate, PatchRule, SupportConfig, SvgSupportPlugin,
    UploadedFile,
};

type CliResult = Result<bool, Box<dyn Error>>;

/// Detect, sanitize and inspect SVG uploads the way the host plugin does
#[derive(Parser)]
#[command(name = "svgsupport")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON config file
    #[arg(short = 'C', long = "config", global = true, env = "SVGSUPPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Write rotating log files to this directory
    #[arg(long = "log-dir", global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Log level used with --log-dir
    #[arg(long = "log-level", global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether a file counts as SVG
    Detect {
        /// Declared file name, e.g. logo.svg
        name: String,
        /// File to sniff (defaults to NAME)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Sanitize a file in place, as the upload gate would
    Sanitize {
        path: PathBuf,
        /// Declared file name (defaults to the file name of PATH)
        #[arg(long)]
        name: Option<String>,
        /// Keep references to remote resources
        #[arg(long)]
        keep_remote: bool,
    },
    /// Print the image metadata host helpers would see
    Info { path: PathBuf },
    /// Apply one substitution rule to a source file and print the result
    Patch {
        source: PathBuf,
        #[arg(long)]
        find: String,
        #[arg(long)]
        replace: String,
        /// Treat --find as a regular expression
        #[arg(long)]
        regex: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("svgsupport: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> CliResult {
    if let Some(dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        let dir = if dir.is_absolute() {
            dir.clone()
        } else {
            std::env::current_dir()?.join(dir)
        };
        init_logging(level, &dir.to_string_lossy())?;
    }
    let config = match &cli.config {
        Some(path) => SupportConfig::load(path)?,
        None => SupportConfig::default(),
    };
    info!(
        "event=cli_run module=cli status=start config={}",
        cli.config
            .as_deref()
            .map_or_else(|| "default".to_string(), |path| path.display().to_string())
    );

    match cli.command {
        Command::Detect { name, path } => detect(&config, &name, path.as_deref()),
        Command::Sanitize {
            path,
            name,
            keep_remote,
        } => sanitize(config, &path, name, keep_remote),
        Command::Info { path } => show_info(config, &path),
        Command::Patch {
            source,
            find,
            replace,
            regex,
        } => patch(&source, &find, &replace, regex),
    }
}

fn detect(config: &SupportConfig, name: &str, path: Option<&Path>) -> CliResult {
    let gate = ContentGate::new(config.clone());
    let path = path.unwrap_or_else(|| Path::new(name));
    let result = gate.detect(name, path);
    println!(
        "protected={} suffix_match={} sniffed={}",
        result.is_protected,
        result.suffix_match,
        result.sniffed.as_deref().unwrap_or("-")
    );
    Ok(true)
}

fn sanitize(
    mut config: SupportConfig,
    path: &Path,
    name: Option<String>,
    keep_remote: bool,
) -> CliResult {
    if keep_remote {
        config.sanitizer.remove_remote_references = false;
    }
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|value| value.to_string_lossy().into_owned())
            .ok_or("cannot derive a file name from PATH; pass --name")?,
    };

    let plugin = SvgSupportPlugin::new(config);
    let file = UploadedFile::new(name, path);
    let detection = plugin.gate().detect(&file.declared_name, &file.temp_path);
    let mut messages = MessageQueue::new();
    let accepted = plugin.upload_gate(AcceptAll).validate(&file, &mut messages);

    for (level, message) in messages.messages() {
        eprintln!("{}: {message}", level.as_str());
    }
    match (accepted, detection.is_protected) {
        (true, true) => println!("sanitized {}", path.display()),
        (true, false) => println!("not an svg upload; left untouched"),
        (false, _) => println!("rejected {}", path.display()),
    }
    Ok(accepted)
}

fn show_info(config: SupportConfig, path: &Path) -> CliResult {
    let gate = ContentGate::new(config);
    let provider = gate.image_info_provider(HeaderImageInfo);
    let (source, info) = match provider.resolve(path) {
        ImageInfoSource::Synthesized(info) => ("synthesized", Some(info)),
        ImageInfoSource::Native(info) => ("native", info),
    };
    let Some(info) = info else {
        println!("no image info for {}", path.display());
        return Ok(false);
    };
    println!("source={source}");
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(true)
}

fn patch(source: &Path, find: &str, replace: &str, regex: bool) -> CliResult {
    let text = std::fs::read_to_string(source)?;
    let rule = if regex {
        PatchRule::pattern(find, replace)?
    } else {
        PatchRule::literal(find, replace)?
    };
    let patched = apply_rules(&text, std::slice::from_ref(&rule));
    for label in &patched.unmatched {
        eprintln!("warning: rule matched nothing: {label}");
    }
    print!("{}", patched.text);
    Ok(true)
}
