use clap::ValueEnum;

use super::BumpArg;

#[derive(clap::Args, Debug)]
pub struct Release {
    /// Version bump to apply. Auto-detected from the commit history when
    /// omitted: breaking → major, feat → minor, otherwise patch.
    #[arg(value_enum)]
    pub bump: Option<BumpArg>,
    /// Print the release outcome in the given format.
    #[arg(long, value_enum)]
    pub output: Option<OutputType>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputType {
    Json,
}

impl Release {
    pub fn forced_bump(&self) -> Option<nagare_core::VersionIncrement> {
        self.bump.map(Into::into)
    }

    pub fn json_output(&self) -> bool {
        self.output == Some(OutputType::Json)
    }
}
