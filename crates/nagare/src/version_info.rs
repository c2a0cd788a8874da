//! Self-version output.

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

pub fn print_detailed() {
    println!("{NAME} {VERSION}");
    println!("target: {}-{}", std::env::consts::ARCH, std::env::consts::OS);
    if let Some(commit) = option_env!("NAGARE_BUILD_COMMIT") {
        println!("commit: {commit}");
    }
}

pub fn print_json() {
    let info = serde_json::json!({
        "name": NAME,
        "version": VERSION,
        "arch": std::env::consts::ARCH,
        "os": std::env::consts::OS,
        "commit": option_env!("NAGARE_BUILD_COMMIT"),
    });
    println!("{info}");
}
