//! NBA matchup sample preparation CLI
//!
//! Ingests game-finder rows, extracts per-team features, builds rolling
//! sequences and exports labelled matchup samples for training.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use hoops::{Config, Result};

#[derive(Parser)]
#[command(name = "hoops")]
#[command(about = "NBA matchup training sample pipeline", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Extract per-team feature vectors for stored games
    Features {
        #[command(flatten)]
        games: GameArgs,
    },
    /// Rebuild rolling sequences from stored feature vectors
    Sequences {
        /// Override the configured window size
        #[arg(long)]
        window: Option<usize>,
    },
    /// Assemble matchup samples and export training arrays
    Dataset {
        #[command(flatten)]
        games: GameArgs,
        /// Override the configured output path
        #[arg(short, long)]
        output: Option<String>,
        /// Check an exported file instead of building a new one
        #[arg(long, value_name = "FILE")]
        check: Option<String>,
    },
    /// Run every stage end to end
    Pipeline {
        /// Game-finder rows to ingest first (JSON)
        #[arg(short, long)]
        input: Option<String>,
        /// Override the configured window size
        #[arg(long)]
        window: Option<usize>,
        /// Clear the database before running
        #[arg(long)]
        fresh: bool,
    },
    /// Initialize configuration file
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Ingest a JSON file of game-finder rows
    Ingest {
        /// Path to the rows file
        file: String,
    },
    /// Show database status
    Status,
    /// Drop all stored games, features and sequences
    Reset,
}

#[derive(clap::Args)]
struct GameArgs {
    /// Only games from this season id (e.g. 22023)
    #[arg(long)]
    season: Option<String>,
    /// Only games on or after this date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Only games before this date (YYYY-MM-DD)
    #[arg(long)]
    before: Option<NaiveDate>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Ingest { file } => commands::data_ingest(&config, &file),
            DataCommands::Status => commands::data_status(&config),
            DataCommands::Reset => commands::data_reset(&config),
        },
        Commands::Features { games } => commands::features(&config, games),
        Commands::Sequences { window } => commands::sequences(&config, window),
        Commands::Dataset {
            games,
            output,
            check,
        } => match check {
            Some(file) => commands::dataset_check(&file),
            None => commands::dataset(&config, games, output),
        },
        Commands::Pipeline {
            input,
            window,
            fresh,
        } => commands::run_pipeline(&config, input, window, fresh),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use hoops::data::export::{ExportSink, JsonFileSink, TrainingArrays};
    use hoops::data::{Database, GameFilter};
    use hoops::pipeline;
    use hoops::SkipCounters;

    impl GameArgs {
        fn filter(self) -> GameFilter {
            let mut filter = GameFilter::all();
            if let Some(season) = self.season {
                filter = filter.season(season);
            }
            if let Some(from) = self.from {
                filter = filter.from(from);
            }
            if let Some(before) = self.before {
                filter = filter.before(before);
            }
            filter
        }
    }

    fn print_skips(skips: &SkipCounters) {
        if skips.is_empty() {
            println!("  Skipped:  none");
            return;
        }
        println!("  Skipped:  {}", skips.total());
        for (reason, count) in skips.iter() {
            println!("    {:<24}{}", reason.as_str(), count);
        }
    }

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data/raw")?;
        std::fs::create_dir_all("data/database")?;
        std::fs::create_dir_all("data/processed")?;
        println!("Created data/ directories");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'hoops data ingest <rows.json>' to load games");
        println!("  3. Run 'hoops pipeline' to build training samples");

        Ok(())
    }

    pub fn data_ingest(config: &Config, file: &str) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;

        println!("Ingesting {}...", file);
        let report = pipeline::ingest_file(&db, file, &config.ingest)?;
        println!("Stored {} games in database", report.games.len());
        print_skips(&report.skips);

        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:      {}", config.data.database_path);
        println!("  Teams:     {}", stats.team_count);
        println!("  Games:     {}", stats.game_count);
        println!("  Features:  {}", stats.feature_count);
        println!("  Sequences: {}", stats.sequence_count);
        if let (Some(earliest), Some(latest)) = (stats.earliest_game, stats.latest_game) {
            println!("  Range:     {} to {}", earliest, latest);
        }

        Ok(())
    }

    pub fn data_reset(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        db.reset()?;
        println!("Cleared {}", config.data.database_path);
        Ok(())
    }

    pub fn features(config: &Config, games: GameArgs) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let report = pipeline::extract_all(&db, &games.filter())?;

        println!("Stored {} feature vectors", report.inserted);
        print_skips(&report.skips);
        Ok(())
    }

    pub fn sequences(config: &Config, window: Option<usize>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let window = window.unwrap_or(config.pipeline.window_size);
        let report = pipeline::build_all_sequences(&db, window)?;

        println!("Built {} sequences (window {})", report.sequences, window);
        println!("  Teams with sequences:  {}", report.teams_with_sequences);
        println!("  Teams without enough:  {}", report.teams_skipped);
        print_skips(&report.skips);
        Ok(())
    }

    pub fn dataset(config: &Config, games: GameArgs, output: Option<String>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let (dataset, skips) = pipeline::build_dataset(&db, &games.filter())?;

        let arrays = TrainingArrays::from_samples(dataset.samples())?;
        let mut sink = JsonFileSink::new(output.unwrap_or_else(|| config.data.output_path.clone()));
        sink.export(&arrays)?;

        let summary = dataset.summary();
        println!("Dataset");
        println!("───────────────────────────────");
        println!("  Samples:   {}", summary.num_samples);
        println!(
            "  Shape:     {} x {}",
            arrays.metadata.window_size, arrays.metadata.num_features
        );
        println!("  Home wins: {:.1}%", summary.home_win_rate() * 100.0);
        println!("  Scores:    {} to {}", summary.min_score, summary.max_score);
        println!("  Output:    {}", sink.path().display());
        print_skips(&skips);
        Ok(())
    }

    pub fn dataset_check(file: &str) -> Result<()> {
        let arrays = JsonFileSink::load(file)?;
        let meta = arrays.metadata;

        println!("Export Check");
        println!("───────────────────────────────");
        println!("  File:       {}", file);
        println!("  Samples:    {}", meta.num_samples);
        println!("  Window:     {}", meta.window_size);
        println!("  Features:   {}", meta.num_features);
        println!(
            "  sequence_a: [{}][{}][{}]",
            arrays.sequence_a.len(),
            arrays.sequence_a.first().map(|s| s.len()).unwrap_or(0),
            arrays.sequence_a.first().and_then(|s| s.first()).map(|s| s.len()).unwrap_or(0)
        );
        println!(
            "  sequence_b: [{}][{}][{}]",
            arrays.sequence_b.len(),
            arrays.sequence_b.first().map(|s| s.len()).unwrap_or(0),
            arrays.sequence_b.first().and_then(|s| s.first()).map(|s| s.len()).unwrap_or(0)
        );
        println!("  score_a:    [{}][1]", arrays.score_a.len());
        println!("  score_b:    [{}][1]", arrays.score_b.len());
        println!("  win_a:      [{}][1]", arrays.win_a.len());

        arrays.validate()?;
        println!("  Status:     ok");
        Ok(())
    }

    pub fn run_pipeline(
        config: &Config,
        input: Option<String>,
        window: Option<usize>,
        fresh: bool,
    ) -> Result<()> {
        let mut config = config.clone();
        if let Some(window) = window {
            config.pipeline.window_size = window;
        }

        let db = Database::open(&config.data.database_path)?;
        if fresh {
            db.reset()?;
        }
        let report = pipeline::run(&db, &config, input.as_deref().map(std::path::Path::new))?;

        println!("Pipeline complete");
        println!("───────────────────────────────");
        if let Some(games) = report.games_ingested {
            println!("  Ingested:  {} games", games);
        }
        println!("  Features:  {}", report.extraction.inserted);
        println!("  Sequences: {}", report.sequences.sequences);
        println!("  Samples:   {}", report.summary.num_samples);
        println!("  Home wins: {:.1}%", report.summary.home_win_rate() * 100.0);
        println!("  Output:    {}", config.data.output_path);
        print_skips(&report.skips);
        Ok(())
    }
}
