// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Command-line entry point for the BlockVault cache.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use blockvault::{Cache, OpenOptions, DEFAULT_BLOCK_SIZE};

mod log;

#[derive(Debug, Parser)]
#[command(author, about, version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the cache directory.
    #[arg(long, short = 'c', global = true, default_value = "./cache")]
    cache_dir: PathBuf,

    /// Show debug trace to stderr.
    #[arg(long, short = 'D', global = true)]
    debug: bool,

    /// Write a full trace log to this file, in addition to the terminal.
    #[arg(long, short = 'F', global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new, empty cache directory.
    Init {
        /// Size in bytes of each content-addressed block.
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: u64,
    },
    /// Store a file's contents under a given or freshly minted file id.
    Store {
        /// Path of the file to read.
        source: PathBuf,
        /// File id to store under; a random one is minted if omitted.
        #[arg(long)]
        file_id: Option<String>,
    },
    /// Write a stored file's contents back out to disk.
    Retrieve {
        /// File id to retrieve.
        file_id: String,
        /// Destination path to write.
        dest: PathBuf,
    },
    /// Remove a stored file and release any blocks it alone referenced.
    Remove {
        /// File id to remove.
        file_id: String,
    },
    /// List the file ids currently stored in the cache.
    List,
    /// Print aggregate cache statistics.
    Stats,
    /// Delete on-disk blocks with no remaining reference.
    Gc,
    /// Re-hash every stored block and report any that are missing or corrupt.
    Validate,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    let _log_guard = log::init(level, args.log_file.as_deref());

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("blockvault: error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> blockvault::Result<()> {
    match &args.command {
        Command::Init { block_size } => {
            Cache::open(
                &args.cache_dir,
                OpenOptions {
                    create: true,
                    block_size: Some(*block_size),
                },
            )?;
            println!("initialized cache at {:?}", args.cache_dir);
            Ok(())
        }
        Command::Store { source, file_id } => {
            let cache = open_existing(&args.cache_dir)?;
            let file_id = file_id.clone().unwrap_or_else(Cache::new_file_id);
            cache.store_file_from_path(source, &file_id)?;
            println!("{file_id}");
            Ok(())
        }
        Command::Retrieve { file_id, dest } => {
            let cache = open_existing(&args.cache_dir)?;
            cache.retrieve_file_to_path(file_id, dest)
        }
        Command::Remove { file_id } => {
            let cache = open_existing(&args.cache_dir)?;
            cache.remove_file(file_id)
        }
        Command::List => {
            let cache = open_existing(&args.cache_dir)?;
            let mut ids = cache.list_file_ids();
            ids.sort();
            for id in ids {
                println!("{id}");
            }
            Ok(())
        }
        Command::Stats => {
            let cache = open_existing(&args.cache_dir)?;
            print!("{}", cache.stats());
            Ok(())
        }
        Command::Gc => {
            let cache = open_existing(&args.cache_dir)?;
            let stats = cache.collect_garbage()?;
            println!("{stats}");
            Ok(())
        }
        Command::Validate => {
            let cache = open_existing(&args.cache_dir)?;
            let report = cache.validate()?;
            print!("{report}");
            if report.is_ok() {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::Other, "validation found problems").into())
            }
        }
    }
}

fn open_existing(cache_dir: &std::path::Path) -> blockvault::Result<Cache> {
    Cache::open(
        cache_dir,
        OpenOptions {
            create: false,
            block_size: None,
        },
    )
}
