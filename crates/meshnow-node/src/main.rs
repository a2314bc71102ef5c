use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "meshnow-node", about = "Demo driver for the mesh handshake and OTA protocols")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a self-contained in-process mesh: one initiator and several
    /// responder nodes over a simulated radio, provisioning an application
    /// key and then distributing a firmware image end to end.
    Demo {
        #[arg(long, default_value_t = 3)]
        responders: usize,
        #[arg(long, default_value_t = 10_000)]
        image_size: u32,
        /// Scratch directory for each node's file-backed key-value store.
        #[arg(long, default_value = "./meshnow-demo-data")]
        data_dir: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Demo { responders, image_size, data_dir } => {
            let report = meshnow_node::run_demo(responders, image_size, data_dir).await;
            tracing::info!(
                successed = report.handshake.successed.len(),
                unfinished = report.handshake.unfinished.len(),
                "handshake batch complete"
            );
            tracing::info!(
                successed = report.ota.successed.len(),
                device_no_exist = report.ota.device_no_exist.len(),
                unfinished = report.ota.unfinished.len(),
                "ota batch complete"
            );
            for (mac, sha) in &report.responder_shas {
                tracing::info!(%mac, sha256 = ?sha, "responder flashed");
            }
        }
    }
}
