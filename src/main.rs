use anyhow::{Result, anyhow};
use log::{info, error};
use clap::{Parser, Subcommand};

use gachabot::config::Config;
use gachabot::gacha::rarity::Rarity;
use gachabot::gacha::{DrawTrigger, GachaBot};
use gachabot::storage::{Card, Storage};

#[derive(Parser)]
#[command(name = "gachabot")]
#[command(about = "Chat-triggered card gacha bot for livestream channels")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to chat and start handing out cards
    Start,
    /// Write a default configuration file
    Init,
    /// Show catalog and user statistics
    Status,
    /// Run one draw locally, exactly as a chat message would
    Draw {
        /// Platform user id
        #[arg(long)]
        user_id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Treat the draw as a bit donation of this amount
        #[arg(long, default_value_t = 0)]
        bits: u32,
    },
    /// Replace the card set from a JSON array of cards
    ImportCards {
        /// Path to the JSON file
        file: String,
    },
    /// Show one random stored card of a rarity
    Sample {
        /// common, uncommon, rare, epic or legendary
        rarity: Rarity,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).await;

    // -v flags win over the configured level
    let log_level = match cli.verbose {
        0 => config.as_ref().map(|c| c.logging.level.clone()).unwrap_or_else(|_| "info".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .init();

    info!("Starting gachabot v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Start => {
            let config = config?;
            if let Err(e) = config.validate() {
                error!("Refusing to start: {}", e);
                return Err(e.into());
            }
            let mut bot = GachaBot::new(config).await?;
            bot.connect().await?;
            info!("Bot starting...");
            bot.run().await?;
        }
        Commands::Init => {
            info!("Initializing new configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let bot = GachaBot::new(config?).await?;
            bot.show_status().await?;
        }
        Commands::Draw { user_id, name, bits } => {
            let bot = GachaBot::new(config?).await?;
            let trigger = if bits > 0 { DrawTrigger::Bits(bits) } else { DrawTrigger::Command };
            match bot.draw(&user_id, &name, trigger).await? {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => println!("No cards available!"),
            }
        }
        Commands::ImportCards { file } => {
            let config = config?;
            let content = tokio::fs::read_to_string(&file).await
                .map_err(|e| anyhow!("Failed to read {}: {}", file, e))?;
            let cards: Vec<Card> = serde_json::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", file, e))?;
            let storage = Storage::new(&config.storage.data_dir).await?;
            storage.save_cards(&cards).await?;
            info!("Imported {} cards into {}", cards.len(), storage.base_dir());
        }
        Commands::Sample { rarity } => {
            let config = config?;
            let storage = Storage::new(&config.storage.data_dir).await?;
            match storage.random_sample_card(rarity).await? {
                Some(card) => println!("{}", serde_json::to_string_pretty(&card)?),
                None => println!("No {} cards stored", rarity),
            }
        }
    }

    Ok(())
}
