use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use variance::{Result, Site, SiteConfig};

const LONG_HELP: &str = r#"
Layout:
  <root>/config/<site>/variance.yml       - site override file
  <root>/config/<site>/<kind>/            - one directory per device
  <root>/<kind>_variants/root/            - files every device of <kind> gets
  <root>/<kind>_variants/<variant>/       - files merged on top for a variant

Override file:
  ess-controller_variant: hv
  ess-controller_templates:
    - path: ess/bess_template.json
      filename_pattern:
        type: sequential                  # or: list (with `list: [...]`)
        filename_template: bess_{{target}}.json
        from: 1
        to: 4
      templated_replacements:
        - target: '{{BESS_ID}}'           # 1..4 unless `list` is given
  replacements:
    - target: '{{SITE_ID}}'
      value: north
      include: ['**/*.json']
      exclude: ['*/tests/*.json']

Examples:
  # Regenerate every site
  variance
  # Regenerate one site from another workspace
  variance --root /path/to/workspace --site north
  # Show what is happening
  variance --log-level debug
"#;

/// Per-site device configuration generator.
#[derive(Parser, Debug)]
#[command(
    name = "variance",
    version,
    about = "Per-site device configuration generator.",
    after_long_help = LONG_HELP
)]
struct Cli {
    /// Workspace root holding `config/` and the `<kind>_variants/` directories
    #[arg(short, long, value_name = "DIR", env = "VARIANCE_ROOT", default_value = ".")]
    root: PathBuf,

    /// Only regenerate these sites (repeatable). Defaults to every site
    #[arg(short, long = "site", value_name = "SITE", action = clap::ArgAction::Append)]
    sites: Vec<String>,

    /// Device kinds to process (repeatable). Defaults to the built-in list
    #[arg(short = 'k', long = "device-kind", value_name = "KIND", action = clap::ArgAction::Append)]
    device_kinds: Vec<String>,

    /// Console log level; `RUST_LOG` takes precedence when set
    #[arg(short, long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Below `info` the per-site banner goes to stdout instead of the log
    fn is_quiet(self) -> bool {
        matches!(self, Self::Error | Self::Warn)
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_level.as_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    println!("Finished!");
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = SiteConfig {
        root_dir: cli.root.clone(),
        ..SiteConfig::default()
    };
    if !cli.device_kinds.is_empty() {
        config.device_kinds.clone_from(&cli.device_kinds);
    }

    let sites = config.select_sites(&cli.sites)?;

    for id in &sites {
        if cli.log_level.is_quiet() {
            println!("\n------{id}------\n");
        }
        info!(site = %id, "------{id}------");

        let site = Site::open(&config, id)?;
        let summary = site.generate()?;
        info!(
            site = %id,
            devices = summary.devices.len(),
            replaced_files = summary.replaced_files,
            evaluated_tests = summary.evaluated_tests,
            "site complete"
        );
    }

    Ok(())
}
