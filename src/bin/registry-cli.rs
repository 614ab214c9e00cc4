use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "registry-cli")]
#[command(about = "Management CLI for a running service registry app", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report uptime once every service is ready
    Status,
    /// Ask every service to stop gracefully
    Shutdown,
    /// Stop every service and force the process to exit
    Kill,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let url = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/", url)).send().await?;
            print_json(res).await?;
        }
        Commands::Shutdown => {
            let res = client.post(format!("{}/server/shutdown", url)).send().await?;
            print_text(res).await?;
        }
        Commands::Kill => {
            let res = client.post(format!("{}/server/kill", url)).send().await?;
            print_text(res).await?;
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if status.is_success() {
        print!("{}", text);
    } else {
        eprintln!("Error: server returned status {}", status);
        eprintln!("Response: {}", text);
    }
    Ok(())
}
