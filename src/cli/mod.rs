use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::config;
use crate::domain::track::Track;
use crate::storage::db::i64_seconds_to_local_time;
use crate::storage::operations::{Storage, Visibility};

#[derive(Parser)]
#[command(name = "encore")]
#[command(version = "0.1")]
#[command(about = "Single-artist music storefront")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show catalog status
    Status,
    /// Import new audio files from the library roots
    Import,
    /// Run http server hosting the catalog and the playback session
    Serve,
    /// List songs in the catalog
    List {
        /// Include unpublished songs
        #[arg(short, long)]
        all: bool,
    },
    /// Search published songs by title, artist, genre or lyrics
    Search { query: String },
    /// List albums with their songs
    Albums,
    /// Show the most played songs
    Top {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
}

fn print_track(track: &Track) {
    let status = if track.is_published { "" } else { " [UNPUBLISHED]" };
    println!("{} - {}{}", track.artist, track.title, status);
    println!("    id: {}, plays: {}", track.id, track.play_count);
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::Config::load(&cli.config)?;
    let mut storage = Storage::new(cfg.database.clone(), cfg.library_source.clone())
        .with_context(|| "Failed to initialize storage")?;

    match &cli.command {
        Commands::Status => {
            let counts = storage.counts()?;
            println!(
                "Catalog contains {} songs ({} published), {} albums, {} likes",
                counts.tracks, counts.published, counts.albums, counts.likes
            );
            match storage.last_updated()? {
                Some(at) => println!(
                    "Library was last imported {}",
                    i64_seconds_to_local_time(at)?
                ),
                None => println!("Library was never imported. Run \"import\" to scan it"),
            }
        }

        Commands::Import => {
            let tracks = storage.import_library()?;
            println!("Catalog updated, new songs ({}):", tracks.len());
            for track in &tracks {
                println!("    - {} at {}", track.id, track.audio_url);
            }
        }

        Commands::Serve => {
            let storage = Arc::new(Mutex::new(storage));
            let session = crate::session::start(Arc::clone(&storage), &cfg.playback)?;

            let http_server =
                crate::http::server::HttpServer::new(storage, session, cfg.http, cfg.public);

            println!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::List { all } => {
            let visibility = if *all {
                Visibility::All
            } else {
                Visibility::Published
            };
            for track in storage.list_tracks(visibility)? {
                print_track(&track);
            }
        }

        Commands::Search { query } => {
            let tracks = storage.search(query)?;
            println!("Results for \"{query}\" ({}):", tracks.len());
            for track in &tracks {
                print_track(track);
            }
        }

        Commands::Albums => {
            for summary in storage.list_albums()? {
                println!(
                    "{} ({} songs)",
                    summary.album.title, summary.song_count
                );
                let (_, tracks) = storage.album_tracks(&summary.album.id)?;
                for track in &tracks {
                    println!("    - {}", track.title);
                }
            }
            let singles = storage.singles()?;
            if !singles.is_empty() {
                println!("Singles ({} songs)", singles.len());
                for track in &singles {
                    println!("    - {}", track.title);
                }
            }
        }

        Commands::Top { limit } => {
            for (rank, track) in storage.most_played(*limit)?.iter().enumerate() {
                println!("{:>3}. {} - {} ({} plays)", rank + 1, track.artist, track.title, track.play_count);
            }
        }
    }

    Ok(())
}
