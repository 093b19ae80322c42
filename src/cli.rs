use crate::config::NavConfigOverrides;
use crate::gate::ThreatLevel;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Parsed `nav_harness` command line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HarnessArgs {
    pub fixture: PathBuf,
    pub write_output: Option<PathBuf>,
    pub check_golden: Option<PathBuf>,
    pub overrides: NavConfigOverrides,
    pub help: bool,
}

impl HarnessArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = HarnessArgs::default();
        let mut fixture = None;
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if matches!(flag, "--help" | "-h") {
                parsed.help = true;
                return Ok(parsed);
            }
            if !flag.starts_with('-') {
                bail!("Unexpected argument '{flag}'. Use --help for usage.");
            }
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match flag {
                "--fixture" | "-f" => fixture = Some(PathBuf::from(value)),
                "--write-output" | "-o" => parsed.write_output = Some(PathBuf::from(value)),
                "--golden" | "-g" => parsed.check_golden = Some(PathBuf::from(value)),
                "--patrol-flags" => {
                    parsed.overrides.patrol_flags =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid patrol flags '{value}'"))?);
                }
                "--max-threat" => {
                    parsed.overrides.max_threat_level = Some(
                        ThreatLevel::parse(&value).ok_or_else(|| anyhow!("Invalid threat level '{value}'"))?,
                    );
                }
                "--closest-offset" => {
                    parsed.overrides.closest_point_offset =
                        Some(value.parse::<f32>().with_context(|| format!("Invalid closest offset '{value}'"))?);
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --fixture, --golden, --write-output, --patrol-flags, \
                     --max-threat, --closest-offset."
                ),
            }
        }
        parsed.fixture = fixture.ok_or_else(|| anyhow!("--fixture <path> is required"))?;
        Ok(parsed)
    }
}

pub fn usage() -> &'static str {
    "Usage: nav_harness --fixture <path> [--golden <path>] [--write-output <path>]\n\
     \x20 -f, --fixture          Path to a harness fixture JSON file\n\
     \x20 -g, --golden           Optional golden output file to compare against\n\
     \x20 -o, --write-output     Optional path to write the actual output JSON\n\
     \x20     --patrol-flags     Override navigation.patrol_flags\n\
     \x20     --max-threat       Override gate.max_threat_level (none .. severe)\n\
     \x20     --closest-offset   Override navigation.closest_point_offset"
}
