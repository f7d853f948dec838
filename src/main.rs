use clap::Parser;
use hfa_reader::{Endianness, FeatureKind, HfaReader, OpenOptions};

#[derive(Parser, Debug)]
#[command(version, about = "Inspect Erdas Imagine HFA (.ovr) files", long_about = None)]
struct Args {
    /// Path to the .ovr/.img file
    path: String,
    /// Print the entry tree
    #[clap(short = 't', long)]
    tree: bool,
    /// Print the type dictionary
    #[clap(short = 'd', long)]
    dictionary: bool,
    /// Read multi-byte fields as little-endian
    #[clap(short, long)]
    little_endian: bool,
    /// Text encoding label (e.g. "windows-1252", "utf-8")
    #[clap(short, long)]
    encoding: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut options = OpenOptions::new();
    if args.little_endian {
        options = options.endianness(Endianness::Little);
    }
    if let Some(label) = &args.encoding {
        options = options.encoding_label(label);
    }

    println!("Reading HFA file: {}", args.path);
    println!("{}", "=".repeat(60));

    let reader = match HfaReader::with_options(&args.path, options) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("\nERROR: Failed to open HFA file");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let header = reader.header();
    println!("\nFile Information:");
    println!("  Version: {}", header.record.version);
    println!("  Root entry: {:#x}", header.record.root_entry);
    println!("  Dictionary: {:#x} ({} types)", header.record.dictionary, reader.dictionary().len());
    println!("  Byte order: {}", reader.options().endianness);
    println!("  Encoding: {}", reader.options().encoding.name());

    if args.tree {
        println!("\nEntry Tree:");
        for item in reader.walk() {
            match item {
                Ok((depth, entry)) => println!(
                    "  {}{} ({}) data={:#x}+{}",
                    "  ".repeat(depth),
                    entry.name,
                    entry.type_name,
                    entry.data,
                    entry.data_size
                ),
                Err(e) => println!("  <error: {}>", e),
            }
        }
    }

    if args.dictionary {
        println!("\nType Dictionary:");
        print!("{}", reader.dictionary());
    }

    let extraction = match reader.extract() {
        Ok(extraction) => extraction,
        Err(e) => {
            eprintln!("\nERROR: Failed to extract annotations");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("\n{}", "=".repeat(60));
    println!("Annotations:");
    for feature in extraction.geometries() {
        println!("  {}", feature);
    }

    println!("\nStatistics:");
    for kind in [FeatureKind::Point, FeatureKind::LineString, FeatureKind::Polygon, FeatureKind::Metadata] {
        let count = extraction.features.iter().filter(|f| f.kind == kind).count();
        println!("  {}: {}", kind, count);
    }
    println!("  Skipped entries: {}", extraction.skipped.len());
    for skipped in &extraction.skipped {
        println!("    {:#x} {:?} ({}): {}", skipped.offset, skipped.name, skipped.type_name, skipped.error);
    }

    match &extraction.projection {
        Some(projection) => println!("\nSpatial reference: {}", projection),
        None => println!("\nSpatial reference: none"),
    }
}
