use std::fs::{self, File};

use anyhow::{bail, Context, Result};
use kestrel_nav::cli::{usage, HarnessArgs};
use kestrel_nav::script_harness::{load_fixture, run_fixture_with_overrides, HarnessOutput};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run_cli() {
        tracing::error!("{err:?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let opts = HarnessArgs::parse_from_env()?;
    if opts.help {
        println!("{}", usage());
        return Ok(());
    }
    if !opts.overrides.is_empty() {
        tracing::info!(fields = ?opts.overrides.applied_fields(), "applying config overrides");
    }
    let fixture = load_fixture(&opts.fixture)?;
    let output = run_fixture_with_overrides(&fixture, &opts.overrides)?;

    if let Some(path) = &opts.write_output {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating output directory '{}'", parent.display()))?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("writing harness output to '{}'", path.display()))?;
        serde_json::to_writer_pretty(file, &output).with_context(|| "serializing harness output")?;
        tracing::info!(path = %path.display(), "wrote harness output");
    }

    if let Some(path) = &opts.check_golden {
        let file = File::open(path)
            .with_context(|| format!("opening golden file '{}'", path.display()))?;
        let expected: HarnessOutput =
            serde_json::from_reader(file).with_context(|| "parsing golden JSON")?;
        if expected != output {
            bail!(
                "golden mismatch for {} (use --write-output to refresh):\nexpected: {}\nactual:   {}",
                opts.fixture.display(),
                serde_json::to_string(&expected).unwrap_or_default(),
                serde_json::to_string(&output).unwrap_or_default(),
            );
        }
        tracing::info!(path = %path.display(), "matched golden");
    } else if opts.write_output.is_none() {
        serde_json::to_writer_pretty(std::io::stdout(), &output)?;
        println!();
    }

    Ok(())
}
