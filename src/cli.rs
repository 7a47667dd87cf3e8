//! CLI argument parsing via clap.

use clap::Parser;

/// Storefront assistant for the terminal. Chat, browse, and check out
/// against an agentic commerce backend.
#[derive(Debug, Parser)]
#[command(name = "shopmate", version = Box::leak(shopmate::build_info::cli_version_text().into_boxed_str()) as &'static str)]
pub struct Args {
    /// Message to send. If provided, runs in one-shot mode and exits
    /// after the assistant's reply.
    pub prompt: Option<String>,

    /// Path to config file (default: ./shopmate.toml or
    /// ~/.config/shopmate/shopmate.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override API base URL.
    #[arg(long = "api-url")]
    pub api_url: Option<String>,

    /// Override websocket URL.
    #[arg(long = "ws-url")]
    pub ws_url: Option<String>,

    /// Disable color output.
    #[arg(long = "no-color")]
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::Args;
    use clap::Parser;

    #[test]
    fn one_shot_prompt_parses() {
        let args = Args::parse_from(["shopmate", "do you have running shoes?"]);
        assert_eq!(args.prompt.as_deref(), Some("do you have running shoes?"));
        assert!(args.config.is_none());
    }

    #[test]
    fn url_overrides_parse() {
        let args = Args::parse_from([
            "shopmate",
            "--api-url",
            "https://shop.example.com/v1",
            "--ws-url",
            "wss://shop.example.com/ws",
            "--no-color",
        ]);
        assert_eq!(args.api_url.as_deref(), Some("https://shop.example.com/v1"));
        assert_eq!(args.ws_url.as_deref(), Some("wss://shop.example.com/ws"));
        assert!(args.no_color);
    }
}
