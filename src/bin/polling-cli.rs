use clap::{Parser, Subcommand};
use serde_json::Value;

use polling_transport::polling::framing;

#[derive(Parser)]
#[command(name = "polling-cli")]
#[command(about = "Command-line client for the long-polling server", long_about = None)]
struct Cli {
    /// Polling endpoint of the server.
    #[arg(short, long, default_value = "http://localhost:8080/polling")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session on the demo echo server
    Open,
    /// Wait for one message (or a heartbeat)
    Poll {
        #[arg(short, long)]
        sid: String,
    },
    /// Post one message
    Send {
        #[arg(short, long)]
        sid: String,
        message: String,
    },
    /// Show transport status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Open => {
            let res = client.post(format!("{}/open", base)).send().await?;
            print_json(res).await?;
        }
        Commands::Poll { sid } => {
            let res = client
                .get(base)
                .query(&[("sid", sid.as_str())])
                .send()
                .await?;
            let Some(body) = body_or_report(res).await? else {
                return Ok(());
            };
            if framing::is_heartbeat(&body) {
                println!("(heartbeat)");
            } else {
                println!("{}", framing::decode(&body)?);
            }
        }
        Commands::Send { sid, message } => {
            let res = client
                .post(base)
                .query(&[("sid", sid.as_str())])
                .body(framing::encode(&message))
                .send()
                .await?;
            if let Some(body) = body_or_report(res).await? {
                println!("{}", body);
            }
        }
        Commands::Status => {
            let res = client.get(format!("{}/status", base)).send().await?;
            print_json(res).await?;
        }
    }

    Ok(())
}

async fn body_or_report(res: reqwest::Response) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        eprintln!("Response: {}", text);
        return Ok(None);
    }
    Ok(Some(text))
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let Some(text) = body_or_report(res).await? else {
        return Ok(());
    };
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
