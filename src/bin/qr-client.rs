use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use qr_gateway::protocol::{read_response, write_image, write_quit, Response};

#[derive(Parser)]
#[command(name = "qr-client")]
#[command(about = "Send QR code images to a qr-gateway and print the decoded text", long_about = None)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 2012)]
    port: u16,

    /// Longest decoded text accepted from the server.
    #[arg(long, default_value_t = 64 * 1024)]
    max_text_len: u64,

    /// Image files, sent in order over one session.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let stream = TcpStream::connect((cli.host.as_str(), cli.port)).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    for image in &cli.images {
        let payload = tokio::fs::read(image).await?;
        write_image(&mut writer, &payload).await?;

        loop {
            match read_response(&mut reader, cli.max_text_len).await? {
                Response::Success(text) => {
                    println!("{}: {}", image.display(), text);
                    break;
                }
                Response::Failure => {
                    eprintln!("{}: no QR code found", image.display());
                    break;
                }
                Response::RateLimitExceeded => {
                    // The server holds the request and answers after the cooldown.
                    eprintln!("{}: rate limited, waiting", image.display());
                }
                Response::Timeout => {
                    eprintln!("Session timed out");
                    return Ok(());
                }
                Response::ServerBusy => {
                    eprintln!("Server busy, try again later");
                    return Ok(());
                }
            }
        }
    }

    write_quit(&mut writer).await?;
    writer.shutdown().await?;
    Ok(())
}
