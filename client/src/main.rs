use clap::Parser;
use client::session::Session;
use log::{error, info};
use shared::BUFFER_SIZE;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:5353")]
    server: String,

    /// Display name to join the chat under
    #[arg(short, long)]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    info!("Connecting to {}", args.server);
    let stream = TcpStream::connect(&args.server).await?;

    let mut session = Session::new(stream, args.name.clone());
    session.join().await?;
    info!("Joined as {}. Type messages and press Enter to send.", args.name);

    let (mut reader, mut writer) = session.into_inner().into_split();
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buf = [0u8; BUFFER_SIZE];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    // A silent close right after joining usually means the
                    // name was already taken.
                    info!("Server closed the connection");
                    break;
                }
                Ok(n) => {
                    print!("{}", String::from_utf8_lossy(&buf[..n]));
                    std::io::stdout().flush()?;
                }
                Err(e) => {
                    error!("read failed: {}", e);
                    break;
                }
            },
            line = stdin_lines.next_line() => match line? {
                Some(line) => {
                    let framed = format!("{}\n", line);
                    writer.write_all(framed.as_bytes()).await?;
                }
                None => break, // stdin closed
            },
        }
    }

    Ok(())
}
