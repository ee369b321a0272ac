use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracklens::cache::ResponseCache;
use tracklens::cluster::{self, ClusterResult};
use tracklens::config::AppConfig;
use tracklens::schema::{
    ANNOTATION_COLUMNS, CANONICAL_COLUMNS, FEATURE_COLUMNS, TRACK_MOODS, VISUAL_COLUMNS,
};
use tracklens::session::Session;
use tracklens::spotify::{self, SpotifyClient};
use tracklens::store::Store;
use tracklens::table::Table;
use tracklens::{ingest, table};

#[derive(Parser)]
#[command(name = "tracklens", version, about = "Spotify playlist audio-feature explorer")]
struct Cli {
    /// Directory for snapshots and the master table
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a playlist's audio features from the Spotify API
    Fetch {
        /// Playlist id, share URL, or spotify: URI
        playlist: String,

        /// Spotify client id (falls back to SPOTIFY_CLIENT_ID, then config)
        #[arg(long)]
        client_id: Option<String>,

        /// Spotify client secret (falls back to SPOTIFY_CLIENT_SECRET, then config)
        #[arg(long)]
        client_secret: Option<String>,

        /// Bypass the response cache and re-fetch everything
        #[arg(long)]
        refresh: bool,
    },

    /// Import an existing snapshot file and merge it into the master table
    Import {
        /// Path to a snapshot file
        file: PathBuf,
    },

    /// Print the working table
    Show {
        /// Read from a snapshot instead of the master table
        #[arg(long)]
        file: Option<PathBuf>,

        /// Number of rows to print
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Set moods and/or notes on a track, writing a new snapshot
    Annotate {
        /// Exact track name to annotate
        track: String,

        /// Mood tags from the controlled vocabulary (comma-separated)
        #[arg(long, value_delimiter = ',')]
        moods: Vec<String>,

        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,

        /// Read from a snapshot instead of the master table
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Cluster tracks with k-means over a feature subset
    Cluster {
        /// Feature columns to cluster on (comma-separated; default: the
        /// [0,1]-bounded visual features)
        #[arg(long, value_delimiter = ',')]
        features: Vec<String>,

        /// Number of clusters
        #[arg(short, default_value = "5")]
        k: usize,

        /// RNG seed for reproducible runs
        #[arg(long, default_value_t = cluster::DEFAULT_SEED)]
        seed: u64,

        /// Copy labels into the working table and write a new snapshot
        #[arg(long)]
        commit: bool,

        /// Read from a snapshot instead of the master table
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List the controlled mood vocabulary
    Moods,

    /// Show master table statistics
    Stats,

    /// Inspect or clear the API response cache
    Cache {
        /// Drop all cached responses
        #[arg(long)]
        clear: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    // Resolve storage paths: CLI > config > XDG default
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.resolve_data_dir());
    let master_path = match &cli.data_dir {
        Some(dir) => dir.join("master.json"),
        None => config.resolve_master_path(),
    };
    log::info!("Data directory: {}", data_dir.display());

    let store = Store::new(data_dir.join("snapshots"), master_path);

    match cli.command {
        Commands::Fetch { playlist, client_id, client_secret, refresh } => {
            let playlist_id = spotify::parse_playlist_id(&playlist)
                .context("Could not parse playlist identifier")?;
            let (cid, secret) = resolve_credentials(&config, client_id, client_secret)?;

            let client = SpotifyClient::connect(&cid, &secret, &config.api)
                .context("Spotify authentication failed")?;
            let cache = ResponseCache::open(&config.resolve_cache_db_path())
                .context("Failed to open response cache")?;

            println!("Fetching playlist {playlist_id}...");
            let result = ingest::ingest_playlist(
                &client,
                &cache,
                &playlist_id,
                config.cache.ttl_days,
                refresh,
            )
            .context("Ingestion failed")?;

            let clean = table::clean(&result.rows).context("Cleaning fetched data failed")?;
            let snapshot = store.save_snapshot(&clean).context("Snapshot save failed")?;
            let merge = store.merge_into_master(&clean).context("Master merge failed")?;

            println!(
                "Fetch complete: {} tracks fetched, {} skipped",
                result.fetched, result.skipped
            );
            println!("Snapshot: {}", snapshot.display());
            println!(
                "Master table: {} rows ({} new) at {}",
                merge.total,
                merge.added,
                store.master_path().display()
            );
        }

        Commands::Import { file } => {
            let imported = Store::load(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let merge = store.merge_into_master(&imported).context("Master merge failed")?;
            println!(
                "Imported {} rows; master table now {} rows ({} new)",
                imported.len(),
                merge.total,
                merge.added
            );
        }

        Commands::Show { file, limit } => {
            let session = Session::open(&store, file.as_deref())
                .context("Failed to load working table")?;
            if session.table.is_empty() {
                println!("No data. Run `tracklens fetch` or `tracklens import` first.");
                return Ok(());
            }
            print_track_table(&session.table, limit);
        }

        Commands::Annotate { track, moods, notes, file } => {
            let mut session = Session::open(&store, file.as_deref())
                .context("Failed to load working table")?;

            let updated = session
                .table
                .annotate(&track, &moods, notes.as_deref())
                .context("Annotation rejected")?;
            if updated == 0 {
                anyhow::bail!("No track named {track:?} in the working table");
            }

            let snapshot = store.save_snapshot(&session.table)
                .context("Snapshot save failed")?;
            println!("Annotated {updated} row(s) for {track:?}");
            println!("Snapshot: {}", snapshot.display());
            println!("(merge it with `tracklens import` to update the master table)");
        }

        Commands::Cluster { features, k, seed, commit, file } => {
            let mut session = Session::open(&store, file.as_deref())
                .context("Failed to load working table")?;
            if session.table.is_empty() {
                anyhow::bail!("No data to cluster. Run `tracklens fetch` first.");
            }

            let features = if features.is_empty() {
                VISUAL_COLUMNS.iter().map(|s| s.to_string()).collect()
            } else {
                features
            };

            let result = cluster::cluster_tracks(&session.table, &features, k, seed)
                .with_context(|| {
                    format!(
                        "Clustering failed (available features: {})",
                        FEATURE_COLUMNS.join(", ")
                    )
                })?;
            print_cluster_summary(&session.table, &result, k);
            session.record_clustering(result);

            if commit {
                session.commit_clusters().context("Failed to apply labels")?;
                let snapshot = store.save_snapshot(&session.table)
                    .context("Snapshot save failed")?;
                println!();
                println!("Labels written to cluster column");
                println!("Snapshot: {}", snapshot.display());
            } else {
                println!();
                println!("(labels not saved — re-run with --commit to write them)");
            }
        }

        Commands::Moods => {
            println!("Mood vocabulary ({} tags):", TRACK_MOODS.len());
            for tag in TRACK_MOODS {
                println!("  {tag}");
            }
        }

        Commands::Stats => {
            let master = store.load_master().context("Failed to load master table")?;
            let distinct_artists: std::collections::HashSet<&str> =
                master.iter().map(|r| r.artist.as_str()).collect();
            let with_moods = master.iter().filter(|r| !r.moods.is_empty()).count();
            let with_notes = master.iter().filter(|r| !r.notes.is_empty()).count();
            let clustered = master.iter().filter(|r| r.cluster.is_some()).count();

            println!("Master Table Statistics");
            println!("=======================");
            println!("Rows:             {}", master.len());
            println!("Distinct artists: {}", distinct_artists.len());
            println!("With moods:       {with_moods}");
            println!("With notes:       {with_notes}");
            println!("Clustered:        {clustered}");
            println!("Location:         {}", store.master_path().display());
        }

        Commands::Cache { clear } => {
            let cache_path = config.resolve_cache_db_path();
            let cache = ResponseCache::open(&cache_path)
                .context("Failed to open response cache")?;
            if clear {
                let removed = cache.clear().context("Failed to clear cache")?;
                println!("Cleared {removed} cached responses");
            } else {
                let count = cache.len().context("Failed to read cache")?;
                println!("{count} cached responses at {}", cache_path.display());
            }
        }
    }

    Ok(())
}

/// Resolve credentials: CLI flag > environment > config file.
fn resolve_credentials(
    config: &AppConfig,
    cli_id: Option<String>,
    cli_secret: Option<String>,
) -> Result<(String, String)> {
    let id = cli_id
        .or_else(|| std::env::var("SPOTIFY_CLIENT_ID").ok())
        .or_else(|| config.spotify.client_id.clone())
        .context("No Spotify client id. Pass --client-id, set SPOTIFY_CLIENT_ID, or add it to the config file.")?;
    let secret = cli_secret
        .or_else(|| std::env::var("SPOTIFY_CLIENT_SECRET").ok())
        .or_else(|| config.spotify.client_secret.clone())
        .context("No Spotify client secret. Pass --client-secret, set SPOTIFY_CLIENT_SECRET, or add it to the config file.")?;
    Ok((id, secret))
}

/// Print a table of tracks with their headline features and annotations.
fn print_track_table(table: &Table, limit: usize) {
    println!(
        "{:<25} {:<20} {:>6} {:>6} {:>6} {:>6}  {:<20} {:>7}",
        "Name", "Artist", "Tempo", "Enrgy", "Dance", "Valnc", "Moods", "Cluster"
    );
    println!("{}", "-".repeat(105));

    for row in table.iter().take(limit) {
        let cluster = row
            .cluster
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<25} {:<20} {:>6.1} {:>6.2} {:>6.2} {:>6.2}  {:<20} {:>7}",
            truncate(&row.name, 25),
            truncate(&row.artist, 20),
            row.tempo,
            row.energy,
            row.danceability,
            row.valence,
            truncate(&row.moods, 20),
            cluster,
        );
    }

    if table.len() > limit {
        println!("... and {} more rows", table.len() - limit);
    }
    println!();
    println!(
        "{} rows x {} columns",
        table.len(),
        CANONICAL_COLUMNS.len() + ANNOTATION_COLUMNS.len()
    );
}

/// Print per-cluster sizes and the centroid table.
fn print_cluster_summary(table: &Table, result: &ClusterResult, k: usize) {
    let mut counts = vec![0usize; k];
    for &label in &result.labels {
        counts[label] += 1;
    }

    println!("Clustered {} tracks into {} clusters:", table.len(), k);
    for (c, count) in counts.iter().enumerate() {
        println!("  cluster {c}: {count} tracks");
    }

    println!();
    println!("Centroids (scaled feature space):");
    print!("{:<10}", "");
    for name in &result.features {
        print!(" {:>12}", truncate(name, 12));
    }
    println!();
    for (c, centroid) in result.centroids.iter().enumerate() {
        print!("{:<10}", format!("cluster {c}"));
        for v in centroid {
            print!(" {v:>12.3}");
        }
        println!();
    }
}

/// Truncate long values for display, char-safe.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
