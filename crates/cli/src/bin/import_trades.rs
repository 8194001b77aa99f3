use anyhow::{Context, Result};
use clap::Parser;
use models::{ParseResult, ValidationError};
use std::{fs, path::PathBuf};
use tracing::info;
use trade_import::{BrokerSelection, ImportContext, ParseOptions, Registry};

/// How many errors/warnings the summary prints before eliding the rest.
const SHOWN_ISSUES: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "import-trades", about = "Detect, parse and convert a broker trade export (CSV).")]
struct Args {
    /// Path to the exported CSV file
    #[arg(required_unless_present = "list_brokers")]
    csv: Option<PathBuf>,

    /// Broker id (tradovate, thinkorswim, tradingview, interactive-brokers, rithmic, ninjatrader, generic) or auto
    #[arg(short, long, default_value = "auto")]
    broker: String,

    /// Account id stamped on every converted trade
    #[arg(short, long)]
    account: Option<String>,

    /// Settings JSON (defaults to ./settings.json when present)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Only print the detected format
    #[arg(long, default_value_t = false)]
    detect_only: bool,

    /// Skip baseline trade validation
    #[arg(long, default_value_t = false)]
    skip_validation: bool,

    /// Write the converted trades here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the supported broker ids and exit
    #[arg(long, default_value_t = false)]
    list_brokers: bool,
}

fn print_issues(label: &str, issues: &[ValidationError]) {
    for issue in issues.iter().take(SHOWN_ISSUES) {
        println!("[{}] {}", label, issue);
    }
    if issues.len() > SHOWN_ISSUES {
        println!("[{}] ... and {} more", label, issues.len() - SHOWN_ISSUES);
    }
}

fn print_summary(result: &ParseResult) {
    println!(
        "{}: {} trades ({} valid), {} rows, {} skipped, {} duplicates, {} errors, {} warnings",
        result.broker.display_name(),
        result.trades.len(),
        result.stats.valid_trades,
        result.stats.total_rows,
        result.stats.skipped_rows,
        result.stats.duplicates,
        result.errors.len(),
        result.warnings.len()
    );
    print_issues("ERROR", &result.errors);
    print_issues("WARN", &result.warnings);
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();

    let settings = settings_loader::load_settings_or_default(args.settings.as_ref())?;
    let registry = Registry::with_default_parsers(ImportContext::new(settings));

    if args.list_brokers {
        for b in registry.supported_brokers() {
            println!("{:<22}{}", b.id, b.display_name);
        }
        return Ok(());
    }

    let Some(csv_path) = args.csv.as_ref() else {
        return Ok(());
    };
    let content = fs::read_to_string(csv_path).with_context(|| format!("reading {}", csv_path.display()))?;

    let detection = registry.detect_broker_format(&content);
    println!(
        "Detected {} (confidence {:.2}): {}",
        detection.broker.display_name(),
        detection.confidence,
        detection.reason
    );
    if args.detect_only {
        return Ok(());
    }

    let options = ParseOptions {
        broker: args.broker.parse::<BrokerSelection>()?,
        account_id: args.account.clone(),
        skip_validation: args.skip_validation,
    };
    let result = registry
        .parse_csv(&content, &options)
        .with_context(|| format!("parsing {}", csv_path.display()))?;
    print_summary(&result);

    let records = registry.convert_trades_to_input(&result, options.account_id.as_deref());
    let json = serde_json::to_string_pretty(&records)?;
    match &args.output {
        Some(out) => {
            fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
            info!("Wrote {} trades to {}", records.len(), out.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
