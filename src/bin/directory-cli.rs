use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use url::Url;

#[derive(Parser)]
#[command(name = "directory-cli")]
#[command(about = "Management CLI for the embedded LDAP directory", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: Url,

    #[arg(short, long, env = "MANAGEMENT_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check host status
    Status,
    /// Show the directory's state, port and entry count
    Directory,
    /// Dump configuration sources (secrets masked)
    Config,
}

impl Commands {
    fn path(&self) -> &'static str {
        match self {
            Commands::Status => "/admin/status",
            Commands::Directory => "/admin/directory",
            Commands::Config => "/admin/config",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let endpoint = cli.url.join(cli.command.path())?;
    let res = client.get(endpoint).headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: management endpoint returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
