use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgGroup, Parser};

use hotelfinder::config::{self, SessionConfig};
use hotelfinder::coordinator::{CoordinatorOptions, RunCoordinator};
use hotelfinder::debug;
use hotelfinder::models::SearchCriteria;
use hotelfinder::planner::{plan, ScrapeMode, StayDefaults};
use hotelfinder::request::RequestBuilder;
use hotelfinder::sink::{CsvSink, MultiSink, Sink, SqliteSink};
use hotelfinder::transport::HttpTransport;
use hotelfinder::utils;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Hotelfinder - Hotel Price Scraper")]
#[clap(group(ArgGroup::new("mode").required(true).args(["scraper", "whole_mth", "japan_hotel"])))]
struct Args {
    /// Run a single search for one city and date range
    #[clap(long)]
    scraper: bool,

    /// Sweep every start day of one calendar month
    #[clap(long)]
    whole_mth: bool,

    /// Sweep Japanese prefectures across a month range
    #[clap(long)]
    japan_hotel: bool,

    /// City to search (required with --scraper and --whole-mth)
    #[clap(long)]
    city: Option<String>,

    /// Country the city belongs to
    #[clap(long, default_value = "Japan")]
    country: String,

    /// Prefecture to sweep with --japan-hotel; repeatable, defaults to all 47
    #[clap(long)]
    prefecture: Vec<String>,

    /// Check-in date as YYYY-MM-DD (with --scraper)
    #[clap(long)]
    check_in: Option<String>,

    /// Check-out date as YYYY-MM-DD (with --scraper)
    #[clap(long)]
    check_out: Option<String>,

    /// Number of adults
    #[clap(long, default_value_t = 1)]
    group_adults: u32,

    /// Number of rooms
    #[clap(long, default_value_t = 1)]
    num_rooms: u32,

    /// Number of children
    #[clap(long, default_value_t = 0)]
    group_children: u32,

    /// Currency for room prices
    #[clap(long, default_value = "USD")]
    selected_currency: String,

    /// Only scrape hotel properties, not apartments or hostels
    #[clap(long)]
    scrape_only_hotel: bool,

    /// Year to sweep (with --whole-mth and --japan-hotel)
    #[clap(long)]
    year: Option<i32>,

    /// Month to sweep (with --whole-mth)
    #[clap(long)]
    month: Option<u32>,

    /// First start day of the month sweep
    #[clap(long, default_value_t = 1)]
    start_day: u32,

    /// Length of stay in nights for each criteria unit
    #[clap(long, default_value_t = 1)]
    nights: u32,

    /// First month of the prefecture sweep
    #[clap(long, default_value_t = 1)]
    start_month: u32,

    /// Last month of the prefecture sweep
    #[clap(long, default_value_t = 12)]
    end_month: u32,

    /// Keep process environment variables over .env file values
    #[clap(long)]
    no_override_env: bool,

    /// Directory for output CSV files
    #[clap(long, default_value = "output")]
    output_dir: PathBuf,

    /// Also mirror records into this SQLite database
    #[clap(long)]
    sqlite: Option<PathBuf>,

    /// Skip (city, check-in) pairs already present in the output CSV
    #[clap(long)]
    skip_scraped: bool,

    /// Enable debug output; pass twice for per-entry detail
    #[clap(long, action = clap::ArgAction::Count)]
    debug: u8,
}

fn parse_date(value: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .context(format!("Failed to parse {} as YYYY-MM-DD: {}", flag, value))
}

fn build_mode(args: &Args) -> Result<ScrapeMode> {
    let stay = StayDefaults {
        group_adults: args.group_adults,
        group_children: args.group_children,
        num_rooms: args.num_rooms,
        currency: args.selected_currency.clone(),
    };

    if args.scraper {
        let city = args.city.clone().context("--city is required with --scraper")?;
        let check_in = args.check_in.as_deref().context("--check-in is required with --scraper")?;
        let check_out =
            args.check_out.as_deref().context("--check-out is required with --scraper")?;
        Ok(ScrapeMode::Basic {
            criteria: SearchCriteria {
                country: args.country.clone(),
                city,
                check_in: parse_date(check_in, "--check-in")?,
                check_out: parse_date(check_out, "--check-out")?,
                group_adults: args.group_adults,
                group_children: args.group_children,
                num_rooms: args.num_rooms,
                currency: args.selected_currency.clone(),
            },
        })
    } else if args.whole_mth {
        let city = args.city.clone().context("--city is required with --whole-mth")?;
        let year = args.year.context("--year is required with --whole-mth")?;
        let month = args.month.context("--month is required with --whole-mth")?;
        Ok(ScrapeMode::WholeMonth {
            city,
            country: args.country.clone(),
            year,
            month,
            start_day: args.start_day,
            nights: args.nights,
            stay,
        })
    } else if args.japan_hotel {
        let year = args.year.context("--year is required with --japan-hotel")?;
        Ok(ScrapeMode::JapanHotel {
            prefectures: args.prefecture.clone(),
            year,
            start_month: args.start_month,
            end_month: args.end_month,
            nights: args.nights,
            stay,
        })
    } else {
        // clap's mode group guarantees one of the flags is set.
        bail!("No scraping mode selected")
    }
}

fn output_stem(args: &Args) -> String {
    if args.japan_hotel {
        "japan_hotel_data".to_string()
    } else {
        let city = args.city.as_deref().unwrap_or("hotel");
        format!("{}_hotel_data", city.to_lowercase().replace(' ', "_"))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    debug::set_verbosity(args.debug);

    println!("Hotelfinder - Hotel Price Scraper");
    println!("=================================");

    // Everything that can be validated without the network happens first:
    // mode flags, dates, sweep ranges, then the session tokens.
    let mode = build_mode(&args)?;
    let units = plan(&mode)?;
    println!("Planned {} criteria units", units.len());

    config::load_env_file(args.no_override_env);
    let session = SessionConfig::from_env()?;

    let stem = output_stem(&args);
    let csv_path = args.output_dir.join(format!("{}.csv", stem));
    let scraped = if args.skip_scraped {
        utils::load_scraped_units(&csv_path)?
    } else {
        Default::default()
    };

    let mut sinks: Vec<Box<dyn Sink>> =
        vec![Box::new(CsvSink::create(&args.output_dir, &stem)?)];
    if let Some(db_path) = &args.sqlite {
        sinks.push(Box::new(SqliteSink::open(db_path)?));
    }

    let builder = RequestBuilder::new(session, args.scrape_only_hotel);
    let transport = HttpTransport::new(Duration::from_secs(30))?;

    let mut coordinator = RunCoordinator::new(
        builder,
        transport,
        MultiSink::new(sinks),
        CoordinatorOptions::default(),
    );
    coordinator.skip_already_scraped(scraped);

    let summary = coordinator.run(&units)?;

    println!("\n=== Summary ===");
    println!("Units succeeded: {}", summary.succeeded);
    println!("Units failed:    {}", summary.failed);
    println!("Units skipped:   {}", summary.skipped);
    println!("Records written: {}", summary.records_written);
    println!("Output file:     {}", csv_path.display());
    if summary.cancelled {
        println!("Run was cancelled before completing the sweep");
    }
    if !summary.failed_units.is_empty() {
        println!("\nFailed units:");
        for (label, reason) in &summary.failed_units {
            println!("  {} - {}", label, reason);
        }
    }

    Ok(())
}
