use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use recording_splitter::config::ServerConfig;
use recording_splitter::db::{self, PgMetadataStore};
use recording_splitter::segmenter::FfmpegSegmenter;
use recording_splitter::serve::{self, AppState};
use recording_splitter::split::SplitOptions;
use recording_splitter::storage::ConfigStorageProvider;

#[derive(Parser, Debug)]
#[command(author, version, about = "Split stored audio recordings into per-interval segments")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the split API over HTTP
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Serve { config } => {
            let config = ServerConfig::load(&config)?;
            config.validate()?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let pool = db::connect(&config.database).await?;
                db::init_schema(&pool).await?;
                println!(
                    "PostgreSQL database: {}@{}/{}",
                    config.database.username, config.database.host, config.database.database
                );

                let store = Arc::new(PgMetadataStore::new(pool));
                let storage = Arc::new(ConfigStorageProvider::from_config(&config.storage)?);
                let segmenter = Arc::new(FfmpegSegmenter::new(
                    config.segmenter.binary.clone(),
                    Duration::from_secs(config.segmenter.timeout_seconds),
                ));

                let state = Arc::new(AppState {
                    store,
                    storage,
                    segmenter,
                    split_options: SplitOptions {
                        default_segment_minutes: config.default_segment_minutes,
                    },
                });

                serve::serve(state, config.api_port).await
            })?;
        }
    }

    Ok(())
}
