#[derive(clap::Args, Debug)]
pub struct Retry {
    /// Version whose failed release should be recovered.
    pub version: String,
}
