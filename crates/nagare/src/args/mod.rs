mod release;
mod retry;
mod rollback;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{
    ValueEnum,
    builder::{Styles, styling::AnsiColor},
};
use nagare_core::config::{CONFIG_BASENAMES, CONFIG_EXTENSIONS};
use nagare_core::error::{Error, Result};
use nagare_core::{Config, parse_config};
use tracing::{info, level_filters::LevelFilter};

pub use release::Release;
pub use retry::Retry;
pub use rollback::Rollback;

const MAIN_COLOR: AnsiColor = AnsiColor::Blue;
const SECONDARY_COLOR: AnsiColor = AnsiColor::Cyan;
const HELP_STYLES: Styles = Styles::styled()
    .header(MAIN_COLOR.on_default().bold())
    .usage(MAIN_COLOR.on_default().bold())
    .placeholder(SECONDARY_COLOR.on_default())
    .literal(SECONDARY_COLOR.on_default());

/// Nagare automates releases driven by conventional commits: it derives
/// the next semantic version, rewrites version files and the changelog,
/// commits, tags, and publishes.
#[derive(clap::Parser, Debug)]
#[command(version, author, styles = HELP_STYLES)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,
    /// Path to the configuration file.
    ///
    /// Without this option, `release.config.*`, `nagare.config.*` and
    /// `.nagarerc.*` are probed in order (toml, json, yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,
    /// Compute and report every effect without performing any.
    #[arg(long, global = true)]
    pub dry_run: bool,
    /// Don't ask for confirmation before performing side-effects.
    #[arg(long = "skip-confirmation", short = 'y', global = true)]
    pub skip_confirmation: bool,
    /// Log level. `NAGARE_LOG` offers full tracing-filter control.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
    /// Language of user-facing messages.
    #[arg(long, global = true, value_enum, env = "NAGARE_LANG", default_value_t = Lang::En)]
    pub lang: Lang,
    /// Print detailed version information.
    #[arg(long = "version-detailed", conflicts_with = "version_json")]
    pub version_detailed: bool,
    /// Print version information as JSON.
    #[arg(long = "version-json")]
    pub version_json: bool,
}

impl CliArgs {
    pub fn log_level_filter(&self) -> Option<LevelFilter> {
        self.log_level.map(|level| match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        })
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lang {
    En,
    Ja,
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::En => "en",
            Self::Ja => "ja",
        };
        f.write_str(name)
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Scaffold the configuration file and changelog.
    Init,
    /// Execute a release; the bump is auto-detected from the commits
    /// unless one is given.
    Release(Release),
    /// Revert a release by version: delete its tag, reset the release
    /// commit, restore the rewritten files.
    Rollback(Rollback),
    /// Clear failed state for a version and finish or redo its release.
    ///
    /// When the previous attempt failed while publishing, only the
    /// publish step is re-run; otherwise a full release is performed.
    Retry(Retry),
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum BumpArg {
    Major,
    Minor,
    Patch,
}

impl From<BumpArg> for nagare_core::VersionIncrement {
    fn from(bump: BumpArg) -> Self {
        match bump {
            BumpArg::Major => Self::Major,
            BumpArg::Minor => Self::Minor,
            BumpArg::Patch => Self::Patch,
        }
    }
}

/// Load and validate the configuration; warnings (e.g. migrated
/// patterns) are logged.
pub fn load_config(explicit: Option<&Utf8Path>) -> Result<Config> {
    let (contents, path) = read_config_file(explicit)?;
    let extension = path.extension().unwrap_or("toml");
    let mut config = parse_config(&contents, extension)?;
    info!("using configuration file {path}");
    match config.validate() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!("{warning}");
            }
            Ok(config)
        }
        Err(errors) => {
            for error in &errors {
                tracing::error!("{error}");
            }
            Err(Error::ConfigInvalid {
                reason: format!("{} configuration problem(s), see above", errors.len()),
            })
        }
    }
}

fn read_config_file(explicit: Option<&Utf8Path>) -> Result<(String, Utf8PathBuf)> {
    if let Some(path) = explicit {
        return match fs_err::read_to_string(path.as_std_path()) {
            Ok(contents) => Ok((contents, path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::ConfigNotFound {
                searched: vec![path.to_string()],
            }),
            Err(e) => Err(anyhow::Error::from(e).into()),
        };
    }
    let mut searched = vec![];
    for basename in CONFIG_BASENAMES {
        for extension in CONFIG_EXTENSIONS {
            let candidate = Utf8PathBuf::from(format!("{basename}.{extension}"));
            match fs_err::read_to_string(candidate.as_std_path()) {
                Ok(contents) => return Ok((contents, candidate)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    searched.push(candidate.to_string());
                }
                Err(e) => return Err(anyhow::Error::from(e).into()),
            }
        }
    }
    Err(Error::ConfigNotFound { searched })
}
