mod commands;
mod logging;
mod output;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stakeout",
    version,
    about = "Read, convert and reproject survey point files (CSV, Excel, DXF, KML, GSI, SDR33)"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON settings file (read, write and transform sections)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Options shared by every command that reads point files.
#[derive(Args, Clone)]
pub struct ReadArgs {
    /// Reader to use instead of the file extension (csv, xlsx, dxf, kml, kmz, gsi, sdr)
    #[arg(long = "from", value_name = "FORMAT")]
    format: Option<String>,

    /// Column order, e.g. "PT,N,E,Z,Code" (default: auto-detect)
    #[arg(long, value_name = "ORDER")]
    columns: Option<String>,

    /// UTM zone number used for KML input and CRS detection
    #[arg(long)]
    zone: Option<u8>,

    /// UTM zone letter; letters before N select the southern hemisphere
    #[arg(long)]
    zone_letter: Option<char>,

    /// Worksheet to read from spreadsheet input
    #[arg(long, value_name = "NAME")]
    sheet: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one or more point files and print the combined table
    Read {
        /// Input files, read in order and concatenated
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        read: ReadArgs,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,

        /// Save the combined table; the format follows the extension
        #[arg(short = 'O', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Read point files, optionally reproject them, and write another format
    Convert {
        /// Input files, read in order and concatenated
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short = 'O', long = "out", value_name = "FILE")]
        out: PathBuf,

        #[command(flatten)]
        read: ReadArgs,

        /// Writer to use instead of the output extension
        #[arg(long = "to", value_name = "FORMAT")]
        to_format: Option<String>,

        /// Source CRS (EPSG code or name); "auto" detects it from the data
        #[arg(long = "source-crs", value_name = "CRS")]
        source_crs: Option<String>,

        /// Target CRS (EPSG code or name)
        #[arg(long = "target-crs", value_name = "CRS")]
        target_crs: Option<String>,

        /// Swap Easting and Northing before transforming
        #[arg(long)]
        flip_en: bool,

        /// Keep Easting/Northing and add the results as new columns
        #[arg(long)]
        new_columns: bool,

        /// Never use the UTM 36N to Red Belt pipeline
        #[arg(long)]
        no_custom: bool,

        /// Delimiter for delimited text output
        #[arg(long)]
        delimiter: Option<char>,
    },
    /// Detect the CRS of a point file
    DetectCrs {
        input: PathBuf,

        #[command(flatten)]
        read: ReadArgs,

        /// Also infer the Egyptian belt of projected coordinates
        #[arg(long)]
        belt: bool,
    },
    /// Show how points are grouped into lines and polygons
    Groups {
        input: PathBuf,

        #[command(flatten)]
        read: ReadArgs,

        /// Grouping: code, description, pt, sequential or custom
        #[arg(long, default_value = "code")]
        logic: String,

        /// Column used by custom grouping
        #[arg(long, value_name = "NAME")]
        column: Option<String>,

        /// Keep source order inside each group
        #[arg(long)]
        no_sort: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(logging::level(cli.verbose, cli.quiet));

    let settings = match commands::load_settings(cli.settings.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Read {
            inputs,
            read,
            output,
            out,
        } => commands::read::run(&inputs, &read, settings, &output, out),
        Commands::Convert {
            inputs,
            out,
            read,
            to_format,
            source_crs,
            target_crs,
            flip_en,
            new_columns,
            no_custom,
            delimiter,
        } => commands::convert::run(
            &inputs,
            &out,
            &read,
            settings,
            commands::convert::ConvertOptions {
                to_format,
                source_crs,
                target_crs,
                flip_en,
                new_columns,
                no_custom,
                delimiter,
            },
        ),
        Commands::DetectCrs { input, read, belt } => commands::detect::run(&input, &read, settings, belt),
        Commands::Groups {
            input,
            read,
            logic,
            column,
            no_sort,
        } => commands::groups::run(&input, &read, settings, &logic, column, no_sort),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
