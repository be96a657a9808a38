//! floodview - flood risk dashboard client
//!
//! Talks to the flood prediction backend and renders each dashboard page
//! on the terminal:
//! 1. Regions overview with search, risk filter and ordering
//! 2. Alert simulation and subscription alerts
//! 3. Historical records, statistics and risk trends
//! 4. Latest forecasts, forecast history and the overview metrics
//! 5. Single and batch predictions, data export
//! 6. Login/session management, admin jobs and a local JSON endpoint
//!
//! Usage:
//!   floodview regions --risk high --sort risk_ratio
//!   floodview trend batken_area --days 14
//!   floodview overview
//!   floodview admin cleanup --days 30
//!   floodview serve --port 8080
//!   floodview watch --rounds 3
//!
//! Environment:
//!   FLOODVIEW_API_URL, FLOODVIEW_TIMEOUT_SECS, FLOODVIEW_SESSION_FILE
//!   RUST_LOG for log verbosity

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use floodview::alert::{self, AlertSeverity};
use floodview::analysis::filter::{self, RegionQuery, RiskFilter, SortKey};
use floodview::analysis::overview::{self, TOP_REGIONS};
use floodview::analysis::statistics::{self, DataStats};
use floodview::analysis::trend;
use floodview::config::{self, DashboardConfig};
use floodview::dashboard::Dashboard;
use floodview::endpoint;
use floodview::export::{self, ExportFormat};
use floodview::format;
use floodview::ingest::api::{ForecastRange, HistoricalQuery, SignupRequest};
use floodview::ingest::client::ApiClient;
use floodview::model::{Forecast, PredictionInput, RegionRisk};
use floodview::risk;
use floodview::session::{SessionContext, SessionStore, ThemeMode};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "floodview", author, version, about = "Flood risk dashboard for the prediction backend", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the backend base URL
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List regions with search, risk filter and ordering
    Regions {
        /// Case-insensitive match on region name or basin
        #[arg(short, long)]
        search: Option<String>,
        /// all, low, medium or high
        #[arg(short, long, default_value = "all")]
        risk: RiskFilter,
        /// name, basin, river_level, risk_ratio or risk_level
        #[arg(long, default_value = "name")]
        sort: SortKey,
    },
    /// Show one region in detail
    Region { id: String },
    /// List regions the server rates High
    HighRisk {
        /// Use the latest forecasts and include Moderate regions
        #[arg(long)]
        forecast: bool,
    },
    /// Latest model forecast for every region
    Forecast,
    /// Forecast history for one region
    ForecastHistory {
        region: String,
        #[arg(short, long, conflicts_with_all = ["start", "end"])]
        days: Option<u32>,
        #[arg(long, requires = "end")]
        start: Option<NaiveDate>,
        #[arg(long, requires = "start")]
        end: Option<NaiveDate>,
    },
    /// Forecast overview: level counts, average risk and the top regions
    Overview,
    /// Simulate alerts from current river levels
    Alerts {
        /// Probability threshold; defaults to the configured value
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Ask the backend to simulate instead of deriving locally
        #[arg(long)]
        server: bool,
    },
    /// Historical records
    History {
        #[arg(short, long)]
        region: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Dataset statistics
    Stats {
        /// Aggregate historical records locally instead of using /data/stats
        #[arg(long)]
        local: bool,
        #[arg(short, long)]
        region: Option<String>,
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Risk trend for a region
    Trend {
        region: String,
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Run a single prediction
    Predict {
        /// JSON file holding one prediction input; the demo input is used otherwise
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Month stamped on the demo input (defaults to the current month)
        #[arg(short, long)]
        month: Option<u32>,
    },
    /// Run predictions for a JSON array of inputs
    BatchPredict { file: PathBuf },
    /// Download the dataset export
    Export {
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,
        #[arg(short, long)]
        region: Option<String>,
        /// Output path; defaults to flood_data_export[_region].<format>
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Log in and store the access token
    Login { username: String, password: String },
    /// Create an account
    Signup {
        username: String,
        email: String,
        password: String,
        #[arg(long)]
        preferred_region: Option<String>,
    },
    /// Forget the stored access token
    Logout,
    /// Show the logged-in user and token expiry
    Whoami {
        /// Ask the backend who the token belongs to
        #[arg(long)]
        server: bool,
    },
    /// Admin jobs (requires an admin token)
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Show or change the theme: light, dark or toggle
    Theme { mode: Option<String> },
    /// Manage alert subscriptions
    #[command(subcommand)]
    Subscriptions(SubscriptionCommand),
    /// Serve the dashboard as JSON over HTTP
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
    /// Refresh the dashboard on the configured interval
    Watch {
        /// Stop after this many refreshes
        #[arg(long)]
        rounds: Option<usize>,
    },
}

#[derive(Subcommand)]
enum SubscriptionCommand {
    List,
    Add { region: String },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum AdminCommand {
    /// Trigger the forecast ingestion job
    Ingest,
    /// Delete forecasts older than the given number of days
    Cleanup {
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("\n❌ {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("   caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult {
    let mut config = config::load_from_env(&cli.config)?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
        config.validate()?;
    }
    let store = SessionStore::new(&config.session.file);
    let session = store.load()?;

    match cli.command {
        Command::Regions { search, risk, sort } => {
            let query = RegionQuery {
                search,
                risk_filter: risk,
                sort_key: sort,
            };
            cmd_regions(&client(&config, session)?, &query)
        }
        Command::Region { id } => cmd_region(&client(&config, session)?, &id),
        Command::HighRisk { forecast } => {
            if forecast {
                cmd_elevated_forecasts(&client(&config, session)?)
            } else {
                cmd_high_risk(&client(&config, session)?)
            }
        }
        Command::Forecast => cmd_forecast(&client(&config, session)?),
        Command::ForecastHistory { region, days, start, end } => {
            let range = match (days, start, end) {
                (Some(days), _, _) => ForecastRange::LastDays(days),
                (None, Some(start), Some(end)) => ForecastRange::Between(start, end),
                _ => ForecastRange::All,
            };
            cmd_forecast_history(&client(&config, session)?, &region, range)
        }
        Command::Overview => cmd_overview(&client(&config, session)?),
        Command::Alerts { threshold, server } => {
            let threshold = threshold.unwrap_or(config.defaults.alert_threshold);
            cmd_alerts(&client(&config, session)?, threshold, server)
        }
        Command::History { region, start, end, days } => {
            let query = HistoricalQuery {
                region_id: region,
                start_date: start,
                end_date: end,
                days,
            };
            cmd_history(&client(&config, session)?, &query)
        }
        Command::Stats { local, region, days } => {
            let client = client(&config, session)?;
            if local || region.is_some() {
                let query = HistoricalQuery {
                    region_id: region,
                    days: Some(days.unwrap_or(config.defaults.history_days)),
                    ..HistoricalQuery::default()
                };
                cmd_local_stats(&client, &query)
            } else {
                println!("📊 Dataset statistics ({})\n", client.base_url());
                print_stats(&client.stats()?);
                Ok(())
            }
        }
        Command::Trend { region, days } => {
            let days = days.unwrap_or(config.defaults.trend_days);
            cmd_trend(&client(&config, session)?, &region, days)
        }
        Command::Predict { input, month } => {
            let input = match input {
                Some(path) => serde_json::from_str(&fs::read_to_string(&path)?)?,
                None => PredictionInput::sample(month.unwrap_or_else(|| Utc::now().month())),
            };
            cmd_predict(&client(&config, session)?, &input)
        }
        Command::BatchPredict { file } => {
            let inputs: Vec<PredictionInput> = serde_json::from_str(&fs::read_to_string(&file)?)?;
            cmd_batch_predict(&client(&config, session)?, &inputs)
        }
        Command::Export { format, region, output } => {
            let path = output.unwrap_or_else(|| {
                PathBuf::from(export::default_file_name(format, region.as_deref()))
            });
            println!("📥 Exporting {} data...", format);
            let summary = export::download(&client(&config, session)?, format, region.as_deref(), &path)?;
            println!(
                "✓ Wrote {} records ({} bytes) to {}",
                summary.records,
                summary.bytes,
                summary.path.display()
            );
            Ok(())
        }
        Command::Login { username, password } => {
            let token = client(&config, SessionContext::anonymous())?.login(&username, &password)?;
            let mut session = session;
            session.token = Some(token.access_token);
            store.save(&session)?;
            println!("✓ Logged in as {}", username);
            print_expiry(&session);
            Ok(())
        }
        Command::Signup { username, email, password, preferred_region } => {
            let request = SignupRequest {
                username: &username,
                email: &email,
                password: &password,
                preferred_region: preferred_region.as_deref(),
            };
            let message = client(&config, session)?.signup(&request)?;
            println!("✓ {}", message);
            Ok(())
        }
        Command::Logout => {
            let mut session = session;
            session.logout();
            store.save(&session)?;
            println!("✓ Logged out");
            Ok(())
        }
        Command::Whoami { server: true } => {
            let user = client(&config, session)?.me()?;
            println!("👤 {}", user.display_name());
            if let Some(email) = &user.email {
                println!("   Email: {}", email);
            }
            if user.is_admin {
                println!("   Role:  admin");
            }
            Ok(())
        }
        Command::Whoami { server: false } => {
            match session.claims()? {
                Some(claims) => {
                    println!("👤 {}", claims.sub.as_deref().unwrap_or("(no subject)"));
                    print_expiry(&session);
                }
                None => println!("Not logged in"),
            }
            Ok(())
        }
        Command::Theme { mode } => {
            let mut session = session;
            match mode.as_deref() {
                None => {
                    println!("Theme: {}", session.theme);
                    return Ok(());
                }
                Some("toggle") => session.theme = session.theme.toggled(),
                Some(other) => session.theme = other.parse::<ThemeMode>()?,
            }
            store.save(&session)?;
            println!("✓ Theme set to {}", session.theme);
            Ok(())
        }
        Command::Subscriptions(sub) => cmd_subscriptions(&client(&config, session)?, sub),
        Command::Admin(admin) => cmd_admin(&client(&config, session)?, admin),
        Command::Serve { port } => {
            println!("🚀 Starting HTTP endpoint server...");
            println!("   Backend: {}", config.api.base_url);
            println!("   Endpoint running on http://0.0.0.0:{}\n", port);
            endpoint::start_endpoint_server(port, client(&config, session)?, config.defaults.clone())?;
            Ok(())
        }
        Command::Watch { rounds } => {
            let mut dashboard = Dashboard::new(client(&config, session)?, &config)?;
            dashboard.run(rounds);
            Ok(())
        }
    }
}

fn client(config: &DashboardConfig, session: SessionContext) -> Result<ApiClient, Box<dyn Error>> {
    Ok(ApiClient::new(&config.api, session)?)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_regions(client: &ApiClient, query: &RegionQuery) -> CliResult {
    let regions = client.regions(None)?;
    let shown = filter::filter_and_sort(&regions, query);

    println!("🌊 Regions ({} of {}, sorted by {})\n", shown.len(), regions.len(), query.sort_key);
    print_region_table(&shown);

    let distribution = filter::risk_distribution(&regions);
    println!(
        "\nDistribution: {}",
        distribution
            .iter()
            .map(|(level, n)| format!("{} {}", level, n))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

fn cmd_region(client: &ApiClient, id: &str) -> CliResult {
    let region = client.region(id)?;
    println!("📍 {} ({})", region.name, region.id);
    println!("   Basin:           {}", region.basin);
    println!("   Elevation:       {}", region.elevation_range);
    println!("   Coordinates:     {:.2}, {:.2}", region.coordinates.lat, region.coordinates.lon);
    println!("   River level:     {}", format::format_river_level(Some(region.current_river_level)));
    println!("   Flood threshold: {}", format::format_river_level(Some(region.flood_threshold)));
    println!("   Level/threshold: {}", format::format_percent(region.risk_ratio()));
    println!("   Risk level:      {}", region.risk_level);
    if let Some(d) = risk::reconcile(&region) {
        println!("   ⚠️  River level suggests {} (ratio {:.2})", d.ratio_level, d.ratio);
    }
    Ok(())
}

fn cmd_high_risk(client: &ApiClient) -> CliResult {
    let regions = client.regions(None)?;
    let high = filter::high_risk(&regions);
    if high.is_empty() {
        println!("✓ No high-risk regions");
        return Ok(());
    }
    println!("🚨 {} high-risk regions\n", high.len());
    print_region_table(&high);
    Ok(())
}

fn cmd_forecast(client: &ApiClient) -> CliResult {
    let forecasts = client.latest_forecasts()?;
    println!("🔮 Latest forecasts for {} regions\n", forecasts.len());
    print_forecast_table(&forecasts);
    Ok(())
}

fn cmd_forecast_history(client: &ApiClient, region: &str, range: ForecastRange) -> CliResult {
    let forecasts = client.forecast_history(region, range)?;
    println!("📜 {} forecasts for {}\n", forecasts.len(), region);
    print_forecast_table(&forecasts);
    Ok(())
}

fn cmd_overview(client: &ApiClient) -> CliResult {
    let forecasts = client.latest_forecasts()?;
    let o = overview::overview(&forecasts, TOP_REGIONS);

    println!("🌍 Forecast overview\n");
    println!("   Regions:       {}", o.total_regions);
    for (level, n) in &o.distribution {
        println!("   {:<14} {}", format!("{}:", format::format_forecast_level(*level)), n);
    }
    println!("   Average risk:  {}", format::format_percent(o.average_probability));
    match &o.highest {
        Some(f) => println!(
            "   Highest risk:  {} ({})",
            f.region,
            format::format_percent(Some(f.probability))
        ),
        None => println!("   Highest risk:  N/A"),
    }

    if !o.top.is_empty() {
        println!("\n   Top {} regions", o.top.len());
        for (rank, f) in o.top.iter().enumerate() {
            println!(
                "   {}. {:<20} {:>7}  {}",
                rank + 1,
                f.region,
                format::format_percent(Some(f.probability)),
                format::format_forecast_level(f.risk_level)
            );
        }
    }
    Ok(())
}

fn cmd_elevated_forecasts(client: &ApiClient) -> CliResult {
    let elevated = overview::elevated(&client.latest_forecasts()?);
    if elevated.is_empty() {
        println!("✓ No regions forecast above Low");
        return Ok(());
    }
    println!("🚨 {} regions forecast Moderate or High\n", elevated.len());
    print_forecast_table(&elevated);
    Ok(())
}

fn cmd_admin(client: &ApiClient, command: AdminCommand) -> CliResult {
    match command {
        AdminCommand::Ingest => {
            let report = client.admin_ingest()?;
            println!("{}", report.message);
            if let Some(output) = report.output {
                println!("{}", output.trim_end());
            }
        }
        AdminCommand::Cleanup { days } => {
            let report = client.admin_cleanup(days)?;
            println!("{}", report.message);
        }
    }
    Ok(())
}

fn cmd_alerts(client: &ApiClient, threshold: f64, server: bool) -> CliResult {
    let mut alerts = if server {
        client.simulate_alerts(threshold)?
    } else {
        let regions = client.regions(None)?;
        alert::simulate(&regions, &alert::RatioProbability, threshold, Utc::now())
    };
    alert::sort_by_probability(&mut alerts);

    println!("🔔 Alerts at threshold {:.2}: {}\n", threshold, alerts.len());
    let now = Utc::now();
    for a in &alerts {
        let icon = match a.severity() {
            AlertSeverity::Critical | AlertSeverity::High => "🚨",
            AlertSeverity::Medium => "⚠️ ",
            AlertSeverity::Low => "ℹ️ ",
        };
        println!(
            "   {} {:<20} {:>7}  {}",
            icon,
            a.region,
            format::format_percent(Some(a.risk_probability)),
            format::format_relative_time(a.alert_time, now)
        );
    }

    if client.session().is_authenticated() {
        let subscriptions = client.subscriptions()?;
        let mine = alert::alerts_for_subscriptions(&alerts, &subscriptions);
        println!("\n   {} of these are for your subscribed regions", mine.len());
    }
    Ok(())
}

fn cmd_history(client: &ApiClient, query: &HistoricalQuery) -> CliResult {
    let records = client.historical(query)?;
    println!("📜 {} historical records\n", records.len());
    println!(
        "   {:<14} {:<20} {:>8} {:>8} {:>8}  {}",
        "Date", "Region", "Level", "Precip", "Temp", "Status"
    );
    for r in &records {
        println!(
            "   {:<14} {:<20} {:>8} {:>8} {:>8}  {}",
            format::format_date(r.date),
            r.region,
            format::format_river_level(Some(r.river_level)),
            format::format_precipitation(Some(r.precipitation)),
            format::format_temperature(Some(r.temperature)),
            format::format_flood_status(r.flood_status)
        );
    }
    Ok(())
}

fn cmd_local_stats(client: &ApiClient, query: &HistoricalQuery) -> CliResult {
    let records = client.historical(query)?;
    println!("📊 Statistics from {} historical records\n", records.len());
    print_stats(&statistics::aggregate(&records));
    Ok(())
}

fn cmd_trend(client: &ApiClient, region: &str, days: u32) -> CliResult {
    let series = client.risk_trend(region, days)?;
    let points = trend::format_trend(&series)?;

    println!("📈 Risk trend for {} ({} days)\n", region, days);
    for p in &points {
        let bar = "█".repeat((p.probability * 40.0).round() as usize);
        println!("   {:<12} {:>7} {:<6} {}", p.date, format::format_percent(Some(p.probability)), p.risk_level, bar);
    }
    match trend::trend_summary(&points) {
        Some(s) => println!(
            "\n   Range {} - {}, latest {} ({})",
            format::format_percent(Some(s.min_probability)),
            format::format_percent(Some(s.max_probability)),
            format::format_percent(Some(s.latest.probability)),
            s.latest.risk_level
        ),
        None => println!("   No trend data"),
    }
    Ok(())
}

fn cmd_predict(client: &ApiClient, input: &PredictionInput) -> CliResult {
    let result = client.predict(input)?;
    println!("🔮 Prediction for {} (month {})\n", input.region, input.month);
    println!("   Probability: {}", format::format_percent(Some(result.probability)));
    println!("   Prediction:  {}", if result.is_flood() { "Flood" } else { "No Flood" });
    println!("   Risk level:  {}", result.risk_level);
    println!("   Features:    {}", result.features_used.join(", "));
    Ok(())
}

fn cmd_batch_predict(client: &ApiClient, inputs: &[PredictionInput]) -> CliResult {
    let batch = client.batch_predict(inputs)?;
    println!("🔮 Batch prediction: {} inputs\n", inputs.len());
    for (input, result) in inputs.iter().zip(&batch.predictions) {
        println!(
            "   {:<20} {:>7} {}",
            input.region,
            format::format_percent(Some(result.probability)),
            result.risk_level
        );
    }
    println!(
        "\n   {} of {} predicted to flood",
        batch.summary.flood_count, batch.summary.count
    );
    Ok(())
}

fn cmd_subscriptions(client: &ApiClient, command: SubscriptionCommand) -> CliResult {
    match command {
        SubscriptionCommand::List => {
            let subscriptions = client.subscriptions()?;
            println!("🔔 {} subscriptions", subscriptions.len());
            for s in &subscriptions {
                println!("   #{:<4} {}", s.id, s.region);
            }
        }
        SubscriptionCommand::Add { region } => {
            let s = client.subscribe(&region)?;
            println!("✓ Subscribed to {} (#{})", s.region, s.id);
        }
        SubscriptionCommand::Remove { id } => {
            client.unsubscribe(id)?;
            println!("✓ Removed subscription #{}", id);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_region_table(regions: &[RegionRisk]) {
    println!(
        "   {:<16} {:<20} {:<10} {:>8} {:>8} {:>7}  {}",
        "ID", "Name", "Basin", "Level", "Flood", "Ratio", "Risk"
    );
    for r in regions {
        println!(
            "   {:<16} {:<20} {:<10} {:>8} {:>8} {:>7}  {}",
            r.id,
            r.name,
            r.basin,
            format::format_river_level(Some(r.current_river_level)),
            format::format_river_level(Some(r.flood_threshold)),
            format::format_decimal(r.risk_ratio(), 2),
            r.risk_level
        );
    }
}

fn print_forecast_table(forecasts: &[Forecast]) {
    println!("   {:<14} {:<20} {:>7}  {:<9} {}", "Date", "Region", "Risk", "Level", "Alert");
    for f in forecasts {
        println!(
            "   {:<14} {:<20} {:>7}  {:<9} {}",
            format::format_date(f.forecast_date),
            f.region,
            format::format_percent(Some(f.probability)),
            format::format_forecast_level(f.risk_level),
            if f.alert { "🚨" } else { "" }
        );
    }
}

fn print_stats(stats: &DataStats) {
    let overall = &stats.overall_stats;
    println!("   Records:    {}", overall.total_records);
    println!("   Regions:    {}", overall.regions_count);
    println!(
        "   Floods:     {} ({})",
        overall.flood_events,
        format::format_percent(overall.flood_ratio())
    );
    println!("   No flood:   {}", overall.non_flood_events);

    println!("\n   Month  Floods  Total  Share");
    for row in stats.time_series.monthly_rows() {
        println!(
            "   {:<5} {:>7} {:>6}  {}",
            row.month_name,
            row.flood_count,
            row.total_count,
            format::format_percent(row.flood_ratio)
        );
    }

    if !stats.region_stats.is_empty() {
        println!("\n   Region               Records  Floods  Avg level  Max level");
        for (name, r) in &stats.region_stats {
            println!(
                "   {:<20} {:>7} {:>7} {:>10} {:>10}",
                name,
                r.records,
                r.flood_events,
                format::format_river_level(Some(r.avg_river_level)),
                format::format_river_level(Some(r.max_river_level))
            );
        }
    }
}

fn print_expiry(session: &SessionContext) {
    match session.claims() {
        Ok(Some(claims)) => match claims.expires_at() {
            Some(at) if claims.is_expired(Utc::now()) => println!("   ⚠️  Token expired {}", at),
            Some(at) => println!("   Token expires {}", at),
            None => println!("   Token has no expiry"),
        },
        Ok(None) => {}
        Err(e) => eprintln!("   ⚠️  Could not read token: {}", e),
    }
}
