#[derive(clap::Args, Debug)]
pub struct Rollback {
    /// Version to revert, with or without the tag prefix
    /// (`1.4.0` and `v1.4.0` both work).
    pub version: String,
}
