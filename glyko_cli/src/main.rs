use clap::{Parser, Subcommand};
use glyko_core::*;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "glyko")]
#[command(about = "Diabetes care journal and bolus calculator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a bolus recommendation and optionally log it
    Dose {
        /// Current blood glucose in g/L
        #[arg(long)]
        glucose: f64,

        /// Consumed carbohydrates in grams
        #[arg(long, default_value_t = 0.0)]
        carbs: f64,

        /// Meal slot (breakfast, lunch, snack, dinner)
        #[arg(long)]
        slot: String,

        /// Dry run - show recommendation without logging
        #[arg(long)]
        dry_run: bool,

        /// Log without prompting (for scripts and tests)
        #[arg(long)]
        yes: bool,
    },

    /// Log a blood-glucose measurement
    Measure {
        /// Blood glucose in g/L
        #[arg(long)]
        glucose: f64,

        #[arg(long)]
        note: Option<String>,
    },

    /// Compose a meal from the food library and log it
    Meal {
        /// Meal slot (breakfast, lunch, snack, dinner)
        #[arg(long)]
        slot: String,

        /// Portions as FOOD_ID:GRAMS (e.g. white_bread:50)
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Browse the food-carbohydrate library
    Foods {
        /// Filter by name or ID
        #[arg(long)]
        search: Option<String>,
    },

    /// Show recent journal entries
    Journal {
        /// Days of history to show
        #[arg(long)]
        days: Option<i64>,
    },

    /// Show or edit the care protocol
    Protocol {
        #[command(subcommand)]
        action: ProtocolCommands,
    },

    /// Roll up journal WAL entries to CSV
    Rollup {
        /// Clean up processed WAL files after rollup
        #[arg(long)]
        cleanup: bool,
    },
}

#[derive(Subcommand)]
enum ProtocolCommands {
    /// Print the current protocol
    Show,

    /// Set the glycemic target range (g/L)
    SetTarget {
        #[arg(long)]
        min: f64,
        #[arg(long)]
        max: f64,
    },

    /// Set the carb ratio for one meal slot (grams per insulin unit)
    SetRatio {
        #[arg(long)]
        slot: String,
        #[arg(long)]
        grams_per_unit: f64,
    },

    /// Set the minimum interval between correction doses
    SetDelay {
        #[arg(long)]
        hours: f64,
    },

    /// Set the advisory max bolus ceiling
    SetMaxBolus {
        #[arg(long)]
        units: f64,
    },

    /// Replace the correction ladder (tiers as MAX:UNITS, last as above:UNITS)
    SetLadder {
        #[arg(required = true)]
        tiers: Vec<String>,
    },
}

/// Data-directory layout shared by all commands
struct Paths {
    wal_dir: PathBuf,
    wal_path: PathBuf,
    csv_path: PathBuf,
    patient_path: PathBuf,
}

impl Paths {
    fn new(data_dir: &PathBuf) -> Self {
        let wal_dir = data_dir.join("wal");
        Self {
            wal_path: wal_dir.join("journal.wal"),
            wal_dir,
            csv_path: data_dir.join("journal.csv"),
            patient_path: data_dir.join("patient.json"),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    glyko_core::logging::init();

    let cli = Cli::parse();

    // Determine data directory
    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let paths = Paths::new(&data_dir);

    match cli.command {
        Commands::Dose {
            glucose,
            carbs,
            slot,
            dry_run,
            yes,
        } => cmd_dose(&paths, &config, glucose, carbs, &slot, dry_run, yes),
        Commands::Measure { glucose, note } => cmd_measure(&paths, &config, glucose, note),
        Commands::Meal { slot, items } => cmd_meal(&paths, &slot, &items),
        Commands::Foods { search } => cmd_foods(search.as_deref()),
        Commands::Journal { days } => cmd_journal(&paths, &config, days),
        Commands::Protocol { action } => cmd_protocol(&paths, &config, action),
        Commands::Rollup { cleanup } => cmd_rollup(&paths, cleanup),
    }
}

fn parse_slot(s: &str) -> Result<MealSlot> {
    match s.to_lowercase().as_str() {
        "breakfast" => Ok(MealSlot::Breakfast),
        "lunch" => Ok(MealSlot::Lunch),
        "snack" => Ok(MealSlot::Snack),
        "dinner" => Ok(MealSlot::Dinner),
        other => Err(Error::Other(format!(
            "Unknown meal slot '{}' (expected breakfast, lunch, snack, or dinner)",
            other
        ))),
    }
}

fn cmd_dose(
    paths: &Paths,
    config: &Config,
    glucose: f64,
    carbs: f64,
    slot: &str,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    let meal_slot = parse_slot(slot)?;

    std::fs::create_dir_all(&paths.wal_dir)?;

    // Load patient record and check the protocol before dosing anything
    let patient = Patient::load(&paths.patient_path)?;
    let errors = patient.protocol.validate();
    if !errors.is_empty() {
        eprintln!("Protocol validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::Protocol("Invalid protocol".into()));
    }

    // The journal supplies the last correction timestamp
    let recent =
        load_recent_entries(&paths.wal_path, &paths.csv_path, config.journal.window_days)?;
    let last_correction = last_correction_at(&recent);

    let now = chrono::Utc::now();
    let request = DoseRequest {
        glucose_gl: glucose,
        meal_slot,
        carbs_g: carbs,
        last_correction_at: last_correction,
        now,
    };

    let result = calculate_dose(&patient.protocol, &request);

    display_dose(config, &patient.protocol, &request, &result);

    if dry_run {
        println!("\n[Dry run - not logging]");
        return Ok(());
    }

    let accept = if yes { true } else { prompt_accept()? };
    if !accept {
        println!("\nNot logged.");
        return Ok(());
    }

    // Persisting the records is the caller's action, never the calculator's
    let mut sink = JsonlSink::new(&paths.wal_path);
    sink.append(&JournalEntry::Measurement(Measurement {
        id: uuid::Uuid::new_v4(),
        taken_at: now,
        glucose_gl: glucose,
        note: None,
    }))?;
    sink.append(&JournalEntry::Injection(Injection {
        id: uuid::Uuid::new_v4(),
        injected_at: now,
        meal_units: result.meal_dose_units,
        correction_units: result.correction_dose_units,
        note: result.advisory.clone(),
    }))?;

    println!("\n✓ Injection logged!");

    Ok(())
}

fn display_dose(
    config: &Config,
    protocol: &CareProtocol,
    request: &DoseRequest,
    result: &DoseResult,
) {
    let unit = config.display.glucose_unit;

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  BOLUS RECOMMENDATION");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!(
        "  Glucose: {} ({} g carbs at {})",
        unit.format(request.glucose_gl),
        request.carbs_g,
        request.meal_slot.as_str()
    );
    println!();
    println!("  Meal dose:       {:.1} U", result.meal_dose_units);
    println!("  Correction dose: {} U", result.correction_dose_units);
    println!("  Total:           {} U", result.total_dose_units);

    if let Some(ref advisory) = result.advisory {
        println!();
        println!("  ⚠ {}", advisory);
    }

    if (result.total_dose_units as f64) > protocol.max_bolus_units {
        println!();
        println!(
            "  ⚠ Total exceeds the protocol max bolus of {} U - double-check before injecting",
            protocol.max_bolus_units
        );
    }

    println!();
}

fn prompt_accept() -> Result<bool> {
    println!("─────────────────────────────────────────");
    println!("Press Enter to log this injection");
    println!("  's' + Enter to skip");
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().to_lowercase() != "s")
}

fn cmd_measure(paths: &Paths, config: &Config, glucose: f64, note: Option<String>) -> Result<()> {
    let measurement = Measurement {
        id: uuid::Uuid::new_v4(),
        taken_at: chrono::Utc::now(),
        glucose_gl: glucose,
        note,
    };

    let mut sink = JsonlSink::new(&paths.wal_path);
    sink.append(&JournalEntry::Measurement(measurement))?;

    println!(
        "✓ Measurement logged: {}",
        config.display.glucose_unit.format(glucose)
    );

    Ok(())
}

fn cmd_meal(paths: &Paths, slot: &str, items: &[String]) -> Result<()> {
    let meal_slot = parse_slot(slot)?;
    let library = build_default_foods();

    // Parse FOOD_ID:GRAMS arguments
    let mut portions = Vec::with_capacity(items.len());
    for item in items {
        let (food_id, weight) = item.split_once(':').ok_or_else(|| {
            Error::Other(format!("Expected FOOD_ID:GRAMS, got '{}'", item))
        })?;
        let weight_g: f64 = weight
            .parse()
            .map_err(|_| Error::Other(format!("Invalid weight '{}' in '{}'", weight, item)))?;
        portions.push((food_id.to_string(), weight_g));
    }

    let meal = compose_meal(&library, meal_slot, chrono::Utc::now(), &portions)?;

    println!("Meal at {}:", meal.slot.as_str());
    for portion in &meal.portions {
        println!(
            "  {} - {} g -> {:.1} g carbs",
            portion.food_id, portion.weight_g, portion.carbs_g
        );
    }
    println!("  Total: {:.1} g carbs", meal.total_carbs_g);

    let total = meal.total_carbs_g;
    let mut sink = JsonlSink::new(&paths.wal_path);
    sink.append(&JournalEntry::Meal(meal))?;

    println!("\n✓ Meal logged ({:.1} g carbs)", total);

    Ok(())
}

fn cmd_foods(search: Option<&str>) -> Result<()> {
    let library = build_default_foods();
    let errors = library.validate();
    if !errors.is_empty() {
        eprintln!("Food library validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::Food("Invalid food library".into()));
    }

    let foods = match search {
        Some(term) => library.search(term),
        None => library.sorted(),
    };

    if foods.is_empty() {
        println!("No foods found.");
        return Ok(());
    }

    for food in foods {
        println!(
            "  {:<16} {:<20} {:>5.1} g carbs / 100 g",
            food.id, food.name, food.carbs_per_100g
        );
    }

    Ok(())
}

fn cmd_journal(paths: &Paths, config: &Config, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(config.journal.window_days);
    let entries = load_recent_entries(&paths.wal_path, &paths.csv_path, days)?;

    if entries.is_empty() {
        println!("No journal entries in the last {} days.", days);
        return Ok(());
    }

    let unit = config.display.glucose_unit;
    println!("Journal (last {} days, newest first):", days);
    for entry in &entries {
        let when = entry.timestamp().format("%Y-%m-%d %H:%M");
        match entry {
            JournalEntry::Measurement(m) => {
                println!("  {}  measurement  {}", when, unit.format(m.glucose_gl));
            }
            JournalEntry::Meal(m) => {
                println!(
                    "  {}  meal         {} - {:.1} g carbs",
                    when,
                    m.slot.as_str(),
                    m.total_carbs_g
                );
            }
            JournalEntry::Injection(i) => {
                println!(
                    "  {}  injection    {:.1} U meal + {} U correction",
                    when, i.meal_units, i.correction_units
                );
            }
        }
    }

    Ok(())
}

fn cmd_protocol(paths: &Paths, config: &Config, action: ProtocolCommands) -> Result<()> {
    match action {
        ProtocolCommands::Show => {
            let patient = Patient::load(&paths.patient_path)?;
            display_protocol(config, &patient.protocol);
            Ok(())
        }
        ProtocolCommands::SetTarget { min, max } => {
            Patient::update(&paths.patient_path, |p| p.protocol.set_target_range(min, max))?;
            println!("✓ Target range set to {:.2}-{:.2} g/L", min, max);
            Ok(())
        }
        ProtocolCommands::SetRatio {
            slot,
            grams_per_unit,
        } => {
            let meal_slot = parse_slot(&slot)?;
            Patient::update(&paths.patient_path, |p| {
                p.protocol.set_carb_ratio(meal_slot, grams_per_unit)
            })?;
            println!(
                "✓ Carb ratio for {} set to {} g/U",
                meal_slot.as_str(),
                grams_per_unit
            );
            Ok(())
        }
        ProtocolCommands::SetDelay { hours } => {
            Patient::update(&paths.patient_path, |p| {
                p.protocol.set_re_correction_delay(hours)
            })?;
            println!("✓ Re-correction delay set to {} h", hours);
            Ok(())
        }
        ProtocolCommands::SetMaxBolus { units } => {
            Patient::update(&paths.patient_path, |p| p.protocol.set_max_bolus(units))?;
            println!("✓ Max bolus set to {} U", units);
            Ok(())
        }
        ProtocolCommands::SetLadder { tiers } => {
            let ladder = parse_ladder(&tiers)?;
            Patient::update(&paths.patient_path, |p| {
                p.protocol.replace_ladder(ladder.clone())
            })?;
            println!("✓ Correction ladder replaced ({} tiers)", tiers.len());
            Ok(())
        }
    }
}

/// Parse ladder tier arguments: bounded tiers as "MAX:UNITS", the final
/// catch-all as "above:UNITS"
fn parse_ladder(tiers: &[String]) -> Result<CorrectionLadder> {
    let mut parsed = Vec::with_capacity(tiers.len());

    for tier in tiers {
        let (bound, units) = tier.split_once(':').ok_or_else(|| {
            Error::Other(format!("Expected MAX:UNITS or above:UNITS, got '{}'", tier))
        })?;
        let units: u32 = units
            .parse()
            .map_err(|_| Error::Other(format!("Invalid units '{}' in '{}'", units, tier)))?;

        if bound.eq_ignore_ascii_case("above") {
            parsed.push(CorrectionTier::Unbounded { units });
        } else {
            let max_glucose: f64 = bound.parse().map_err(|_| {
                Error::Other(format!("Invalid threshold '{}' in '{}'", bound, tier))
            })?;
            parsed.push(CorrectionTier::Bounded { max_glucose, units });
        }
    }

    Ok(CorrectionLadder { tiers: parsed })
}

fn display_protocol(config: &Config, protocol: &CareProtocol) {
    let unit = config.display.glucose_unit;

    println!("Care protocol:");
    println!(
        "  Target range: {} - {}",
        unit.format(protocol.target_range.min),
        unit.format(protocol.target_range.max)
    );

    println!("  Carb ratios:");
    for slot in [
        MealSlot::Breakfast,
        MealSlot::Lunch,
        MealSlot::Snack,
        MealSlot::Dinner,
    ] {
        if let Some(ratio) = protocol.carb_ratios.get(&slot) {
            println!("    {:<10} {} g/U", slot.as_str(), ratio);
        }
    }

    println!("  Correction ladder:");
    for tier in &protocol.correction_ladder.tiers {
        match tier {
            CorrectionTier::Bounded { max_glucose, units } => {
                println!("    up to {}: {} U", unit.format(*max_glucose), units);
            }
            CorrectionTier::Unbounded { units } => {
                println!("    above:   {} U", units);
            }
        }
    }

    println!("  Max bolus (advisory): {} U", protocol.max_bolus_units);
    println!(
        "  Re-correction delay:  {} h",
        protocol.re_correction_delay_hours
    );
}

fn cmd_rollup(paths: &Paths, cleanup: bool) -> Result<()> {
    if !paths.wal_path.exists() {
        println!("No WAL file found - nothing to roll up.");
        return Ok(());
    }

    let count = glyko_core::csv_rollup::wal_to_csv_and_archive(&paths.wal_path, &paths.csv_path)?;

    println!("✓ Rolled up {} entries to CSV", count);
    println!("  CSV: {}", paths.csv_path.display());

    if cleanup {
        let cleaned = glyko_core::csv_rollup::cleanup_processed_wals(&paths.wal_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed WAL files", cleaned);
        }
    }

    Ok(())
}
