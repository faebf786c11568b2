use clap::Parser;
use log::info;
use server::network::Server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the listener to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "5353")]
    port: u16,

    /// Chat room name, shown in the startup banner
    #[arg(short, long, default_value = "Letta ChatRoom")]
    name: String,

    /// How many recent messages to replay to a newcomer
    #[arg(long, default_value = "10")]
    history: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let server = Server::bind(&address, &args.name, args.history).await?;
    info!("Press Ctrl-C to shut down the server at any time");

    // Ctrl-C flips the running flag; the loop exits at its next boundary.
    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down server");
            handle.shutdown();
        }
    });

    server.run().await;
    Ok(())
}
