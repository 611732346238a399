//! Demo driver for the extendible hashing index.
//!
//! This binary shows how to:
//! - Create and open an index file
//! - Load a batch of generated records
//! - Run point lookups and a full scan
//! - Read occupancy statistics
//! - Observe the errors a closed descriptor produces

use exhash::{Error, HashIndex, Options, Record};

const FILE_NAME: &str = "demo_index.db";
const GLOBAL_DEPTH: u32 = 2;
const RECORD_COUNT: i32 = 120;

const NAMES: &[&str] = &[
    "Yannis",
    "Christofos",
    "Sofia",
    "Marianna",
    "Vagelis",
    "Maria",
    "Iosif",
    "Dionisis",
    "Konstantina",
    "Theofilos",
    "Giorgos",
    "Dimitris",
];

const SURNAMES: &[&str] = &[
    "Ioannidis",
    "Svingos",
    "Karvounari",
    "Rezkalla",
    "Nikolopoulos",
    "Berreta",
    "Koronis",
    "Gaitanis",
    "Oikonomou",
    "Mailis",
    "Michas",
    "Halatsis",
];

const CITIES: &[&str] = &[
    "Athens",
    "San Francisco",
    "Los Angeles",
    "Amsterdam",
    "London",
    "New York",
    "Tokyo",
    "Hong Kong",
    "Munich",
    "Miami",
];

fn sample_record(id: i32) -> Result<Record, Error> {
    let i = id as usize;
    Record::new(
        id,
        NAMES[i % NAMES.len()],
        SURNAMES[i % SURNAMES.len()],
        CITIES[i % CITIES.len()],
    )
}

fn main() -> Result<(), Error> {
    // Initialize logger
    env_logger::init();

    // Start from a clean slate; a previous run may have left the file behind
    if let Err(e) = std::fs::remove_file(FILE_NAME) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(Error::Io(e));
        }
    }

    let index = HashIndex::new(Options::default())?;

    println!("Creating index {} with global depth {}...", FILE_NAME, GLOBAL_DEPTH);
    index.create_index(FILE_NAME, GLOBAL_DEPTH)?;
    let people = index.open_index(FILE_NAME)?;

    // Load generated records
    println!("\n=== Loading Records ===");
    let mut inserted = 0;
    for id in 0..RECORD_COUNT {
        match index.insert(people, sample_record(id)?) {
            Ok(()) => inserted += 1,
            Err(Error::ResourceExhausted(reason)) => {
                // The directory has a hard ceiling; report it and move on
                // to the read path with what fit.
                println!("Stopping load at id {}: {}", id, reason);
                break;
            }
            Err(e) => return Err(e),
        }
    }
    println!("Inserted {} records", inserted);

    // Point lookup
    println!("\n=== Point Lookup ===");
    let wanted = 47;
    let matches = index.lookup(people, Some(wanted))?;
    if matches.is_empty() {
        println!("Lookup: id {} -> Not found", wanted);
    } else {
        for record in &matches {
            println!("Lookup: {}", record);
        }
    }

    // Full scan
    println!("\n=== Full Scan ===");
    let everything = index.lookup(people, None)?;
    println!("Scan returned {} records", everything.len());
    for record in everything.iter().take(5) {
        println!("  {}", record);
    }
    if everything.len() > 5 {
        println!("  ... and {} more", everything.len() - 5);
    }

    // Statistics
    println!("\n=== Statistics ===");
    let stats = index.statistics(FILE_NAME)?;
    println!("Blocks:           {}", stats.blocks);
    println!("Buckets:          {}", stats.buckets);
    println!("Max records:      {}", stats.max_records);
    println!("Min records:      {}", stats.min_records);
    println!("Mean records:     {:.2}", stats.mean_records);

    let cache = index.cache_stats();
    println!(
        "Cache: {} lookups, {:.0}% hit rate, {} write-backs",
        cache.lookups,
        cache.hit_rate() * 100.0,
        cache.write_backs
    );

    // Close and demonstrate what a stale descriptor gets
    println!("\n=== Closed Descriptor ===");
    index.close_index(people)?;
    println!("Index closed");

    match index.insert(people, sample_record(999)?) {
        Ok(()) => println!("ERROR: insert on a closed descriptor succeeded!"),
        Err(e) => println!("Insert rejected: {}", e),
    }
    match index.lookup(people, Some(wanted)) {
        Ok(_) => println!("ERROR: lookup on a closed descriptor succeeded!"),
        Err(e) => println!("Lookup rejected: {}", e),
    }
    match index.close_index(people) {
        Ok(()) => println!("ERROR: double close succeeded!"),
        Err(e) => println!("Second close rejected: {}", e),
    }

    println!("\nDone");
    Ok(())
}
