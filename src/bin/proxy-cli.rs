use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;

use render_proxy::classify::{classify_with, ClassifierRules, ExpectedContent};
use render_proxy::config::load_config;
use render_proxy::target::TargetUrl;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Client and diagnostics CLI for the rendering proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Html,
    Screenshot,
    Pdf,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Html => "html",
            Mode::Screenshot => "screenshot",
            Mode::Pdf => "pdf",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show server liveness and render session state
    Health,
    /// Fetch a page through the proxy
    Fetch {
        target: String,
        #[arg(short, long, value_enum, default_value = "html")]
        mode: Mode,
        /// Write the body here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show how a URL would be served, without contacting the server
    Classify {
        target: String,
        /// Classifier lists from this config instead of the built-in ones
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = reqwest::get(format!("{}/health", base)).await?;
            print_json(res).await?;
        }
        Commands::Fetch { target, mode, output } => {
            let res = reqwest::Client::new()
                .get(format!("{}/proxy", base))
                .query(&[("url", target.as_str()), ("mode", mode.as_str())])
                .send()
                .await?;

            let status = res.status();
            for name in ["x-proxied-url", "x-proxy-class", "x-proxy-stub", "content-type", "cache-control"] {
                if let Some(value) = res.headers().get(name) {
                    eprintln!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
                }
            }
            if !status.is_success() {
                eprintln!("Error: proxy returned status {}", status);
                print_json(res).await?;
                return Ok(());
            }

            let body = res.bytes().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &body)?;
                    eprintln!("Wrote {} bytes to {}", body.len(), path.display());
                }
                None => println!("{}", String::from_utf8_lossy(&body)),
            }
        }
        Commands::Classify { target, config } => {
            let rules = match config {
                Some(path) => ClassifierRules::from_config(&load_config(&path)?.classifier)?,
                None => ClassifierRules::default(),
            };
            let target = TargetUrl::parse(&target)?;
            let expected = ExpectedContent::of(&target);

            let report = serde_json::json!({
                "url": target.as_str(),
                "class": classify_with(&rules, &target).as_str(),
                "expected": format!("{:?}", expected).to_lowercase(),
                "tracking": rules.is_tracking_host(target.host()) || rules.matches_tracking_url(&target),
                "navigation_denied": rules.is_navigation_denied(target.host()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
    }
    Ok(())
}
