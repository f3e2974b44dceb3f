//! ArborKV CLI Client
//!
//! Command-line interface for interacting with an ArborKV node.

use arborkv::Client;
use clap::{Parser, Subcommand};

/// ArborKV CLI
#[derive(Parser, Debug)]
#[command(name = "arborkv-cli")]
#[command(about = "CLI for the ArborKV key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Dump every entry
    GetAll,

    /// Join as a child, print the snapshot and then every forwarded write
    Join,

    /// Send a raw protocol line and print the reply
    Raw {
        /// The line, e.g. 'GET||{"key":"k"}'
        line: String,
    },
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> arborkv::Result<()> {
    let mut client = Client::connect(args.server.as_str())?;

    match args.command {
        Commands::Get { key } => println!("{}", client.get(&key)?),
        Commands::Set { key, value } => {
            let entry = client.set(&key, &value)?;
            println!("{} = {}", entry.key, entry.value);
        }
        Commands::GetAll => {
            for entry in client.get_all()? {
                println!("{} = {}", entry.key, entry.value);
            }
        }
        Commands::Join => {
            for entry in client.join()? {
                println!("{} = {}", entry.key, entry.value);
            }
            while let Some(line) = client.read_line()? {
                println!("{}", line);
            }
        }
        Commands::Raw { line } => println!("{}", client.send_raw(&line)?),
    }

    Ok(())
}
