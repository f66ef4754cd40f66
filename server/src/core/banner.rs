//! Startup banner

use super::config::{AppConfig, is_all_interfaces};
use super::constants::APP_NAME;

// Label width for alignment
const W: usize = 12;

/// Print the startup banner with the API URLs and the permission mode
pub fn print_banner(config: &AppConfig) {
    let host = config.server.host.as_str();
    let port = config.server.port;
    let display_host = if is_all_interfaces(host) {
        "localhost"
    } else {
        host
    };
    let base_url = format!("http://{}:{}", display_host, port);

    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}",
        "API:",
        terminal_link(&format!("{}/api/v1", base_url))
    );
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}",
        "Docs:",
        terminal_link(&format!("{}/api/docs", base_url))
    );
    println!(
        "  \x1b[90m➜  {:<W$} {} loaded\x1b[0m",
        "Index sets:",
        config.index_sets.len()
    );

    let settings = &config.iam.settings;
    let iam_mode = if settings.skip_check {
        "\x1b[33mbusiness checks skipped\x1b[0m"
    } else if settings.ignore_permission {
        "\x1b[33mspace filtering disabled\x1b[0m"
    } else {
        "\x1b[90menforced\x1b[0m"
    };
    println!("  \x1b[90m➜  {:<W$}\x1b[0m {}", "IAM:", iam_mode);
    println!();
}

/// Format a URL as a clickable terminal hyperlink (OSC 8) when supported
fn terminal_link(url: &str) -> String {
    if supports_hyperlinks::on(supports_hyperlinks::Stream::Stdout) {
        format!("\x1b]8;;{}\x07\x1b[36m{}\x1b[0m\x1b]8;;\x07", url, url)
    } else {
        format!("\x1b[36m{}\x1b[0m", url)
    }
}
