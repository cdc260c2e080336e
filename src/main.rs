use anyhow::Result;
use std::env;
use std::path::Path;

use museum_attendance::{
    get_all_museums, harmonize, load_wikitext, metrics, open_store, parse_museum_table,
    predict_from_population, train_and_persist, upsert_museum, verify_count, CityMatcher,
    PopulationIndex, DEFAULT_DB_PATH, DEFAULT_MIN_VISITORS_MILLIONS, DEFAULT_MODEL_PATH,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("etl") => run_etl(args.get(2), args.get(3))?,
        Some("train") => run_train(args.get(2))?,
        Some("predict") => run_predict(args.get(2))?,
        _ => print_usage(),
    }

    Ok(())
}

fn print_usage() {
    println!("🏛️  Museum Attendance Pipeline");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Usage:");
    println!("  museum-attendance etl <wikitext_file> <city_population_csv>");
    println!("      Parse the attendance table, harmonize against city populations,");
    println!("      and upsert into {DEFAULT_DB_PATH}");
    println!("  museum-attendance train [min_visitors_millions]");
    println!("      Fit the log-log regression (default cutoff {DEFAULT_MIN_VISITORS_MILLIONS})");
    println!("      and write {DEFAULT_MODEL_PATH}");
    println!("  museum-attendance predict <population>");
    println!("      Predict annual visitors (millions) for a city population");
}

fn run_etl(wikitext_arg: Option<&String>, city_csv_arg: Option<&String>) -> Result<()> {
    let (Some(wikitext_path), Some(city_csv_path)) = (wikitext_arg, city_csv_arg) else {
        print_usage();
        anyhow::bail!("etl requires <wikitext_file> and <city_population_csv>");
    };

    println!("🏛️  Museum Attendance ETL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Parse museum table
    println!("\n📂 Parsing museum table...");
    let wikitext = load_wikitext(Path::new(wikitext_path))?;
    let (records, discarded) = parse_museum_table(&wikitext)?;
    if records.is_empty() {
        anyhow::bail!("No museum records parsed from wikitext");
    }
    println!("✓ Parsed {} museum rows", records.len());
    if !discarded.is_empty() {
        println!("✓ Discarded {} rows during parsing", discarded.len());
    }

    // 2. Load population index
    println!("\n🌍 Loading city populations...");
    let index = PopulationIndex::from_csv(Path::new(city_csv_path))?;
    println!("✓ Indexed {} cities", index.len());

    // 3. Harmonize and upsert
    println!("\n💾 Harmonizing and storing...");
    let conn = open_store(Path::new(DEFAULT_DB_PATH))?;
    let matcher = CityMatcher::new();

    let mut matched = 0;
    for record in &records {
        let harmonized = harmonize(record, &matcher, &index);
        if harmonized.is_matched() {
            matched += 1;
        }
        upsert_museum(&conn, &harmonized)?;
    }

    let count = verify_count(&conn)?;
    println!("✓ Upserted {} museums ({} matched to a city)", records.len(), matched);
    println!("✓ Database contains {count} museums");

    Ok(())
}

fn run_train(min_visitors_arg: Option<&String>) -> Result<()> {
    let min_visitors = match min_visitors_arg {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| anyhow::anyhow!("min_visitors_millions must be a number, got {raw:?}"))?,
        None => DEFAULT_MIN_VISITORS_MILLIONS,
    };

    println!("📈 Training log-log regression (min visitors: {min_visitors}M)");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_store(Path::new(DEFAULT_DB_PATH))?;
    let artifact = train_and_persist(&conn, Path::new(DEFAULT_MODEL_PATH), min_visitors)?;

    println!("✓ Fitted on {} samples", artifact.sample_count);
    println!("  slope:     {:.6}", artifact.slope);
    println!("  intercept: {:.6}", artifact.intercept);
    println!("  r2:        {:.6}", artifact.r2);
    println!("  mae:       {:.6}", artifact.mae);
    println!("  rmse:      {:.6}", artifact.rmse);
    println!("✓ Artifact written to {DEFAULT_MODEL_PATH}");

    Ok(())
}

fn run_predict(population_arg: Option<&String>) -> Result<()> {
    let Some(raw) = population_arg else {
        print_usage();
        anyhow::bail!("predict requires <population>");
    };
    let population: i64 = raw
        .parse()
        .map_err(|_| anyhow::anyhow!("population must be an integer, got {raw:?}"))?;

    let predicted = predict_from_population(Path::new(DEFAULT_MODEL_PATH), population)?;
    let artifact = metrics(Path::new(DEFAULT_MODEL_PATH))?;

    println!("🔮 Predicted annual visitors for a city of {population}:");
    println!("   {predicted:.3} million");
    println!(
        "   (model trained {} on {} samples, r2 {:.3})",
        artifact.trained_at.format("%Y-%m-%d"),
        artifact.sample_count,
        artifact.r2
    );

    // Context: how many harmonized rows back the model
    if Path::new(DEFAULT_DB_PATH).exists() {
        let conn = open_store(Path::new(DEFAULT_DB_PATH))?;
        let museums = get_all_museums(&conn)?;
        let matched = museums.iter().filter(|m| m.is_matched()).count();
        println!("   ({matched}/{} stored museums matched to a city)", museums.len());
    }

    Ok(())
}
