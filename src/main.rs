//! anvil-region: inspect, repack and edit region files from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use anvil_region::{Compression, Region, RegionPos};

#[derive(Parser)]
#[command(name = "anvil-region", version, about = "Anvil region file tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the chunks stored in a region file
    Info {
        file: PathBuf,
        /// Print one JSON document instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Report which of the given files are region files
    Detect { files: Vec<PathBuf> },
    /// Rewrite a region file with every chunk packed from sector 2.
    /// Untouched chunks keep their bytes and timestamps; unreadable ones are dropped.
    Repack {
        file: PathBuf,
        /// Write the result here instead of in place
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List empty chunk coordinates
    Free {
        file: PathBuf,
        #[arg(long, default_value_t = 0, value_parser = local_coord())]
        start_x: u8,
        #[arg(long, default_value_t = 0, value_parser = local_coord())]
        start_z: u8,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Move a chunk from one region file to another
    Move {
        source: PathBuf,
        #[arg(value_parser = local_coord())]
        x: u8,
        #[arg(value_parser = local_coord())]
        z: u8,
        target: PathBuf,
        /// Target coordinates; the first free slot when omitted
        #[arg(long, requires = "to_z", value_parser = local_coord())]
        to_x: Option<u8>,
        #[arg(long, requires = "to_x", value_parser = local_coord())]
        to_z: Option<u8>,
    },
}

#[derive(Serialize)]
struct ChunkSummary {
    x: u8,
    z: u8,
    world: Option<(i32, i32)>,
    offset: u64,
    size: u64,
    timestamp: u32,
    compression: Option<Compression>,
    corrupt: bool,
}

#[derive(Serialize)]
struct RegionSummary {
    path: PathBuf,
    chunk_count: usize,
    chunks: Vec<ChunkSummary>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Info { file, json } => info(file, json),
        Command::Detect { files } => {
            for file in files {
                match Region::try_open(&file) {
                    Some(region) => println!("{}: region, {} chunks", file.display(), region.chunk_count()),
                    None => println!("{}: not a region file", file.display()),
                }
            }
            Ok(())
        }
        Command::Repack { file, output } => {
            let mut region = open(&file)?;
            match output {
                Some(output) => region
                    .save_as(&output)
                    .with_context(|| format!("Failed to write {}", output.display()))?,
                None => region
                    .save()
                    .with_context(|| format!("Failed to write {}", file.display()))?,
            }
            println!("Repacked {} chunks", region.chunk_count());
            Ok(())
        }
        Command::Free {
            file,
            start_x,
            start_z,
            limit,
        } => {
            let region = open(&file)?;
            let free = region.free_coordinates(start_x, start_z);
            for (x, z) in free.take(limit.unwrap_or(usize::MAX)) {
                println!("{} {}", x, z);
            }
            Ok(())
        }
        Command::Move {
            source,
            x,
            z,
            target,
            to_x,
            to_z,
        } => {
            if same_file(&source, &target)? {
                bail!("Source and target are the same file");
            }
            let mut from = open(&source)?;
            let mut to = open(&target)?;
            let dest = match (to_x, to_z) {
                (Some(tx), Some(tz)) => (tx, tz),
                _ => to
                    .free_coordinates(0, 0)
                    .next()
                    .context("Target region has no free slot")?,
            };
            if !to.import(&mut from, (x, z), dest)? {
                bail!("No chunk at ({}, {}) in {}", x, z, source.display());
            }
            to.save().with_context(|| format!("Failed to write {}", target.display()))?;
            if from.chunk_count() == 0 {
                log::warn!("{} is now empty and will not reopen as a region", source.display());
            }
            from.save().with_context(|| format!("Failed to write {}", source.display()))?;
            println!("Moved ({}, {}) to ({}, {})", x, z, dest.0, dest.1);
            Ok(())
        }
    }
}

/// Chunk coordinates inside a region run from 0 to 31.
fn local_coord() -> clap::builder::RangedI64ValueParser<u8> {
    clap::value_parser!(u8).range(0..32)
}

fn same_file(a: &Path, b: &Path) -> anyhow::Result<bool> {
    let a = std::fs::canonicalize(a).with_context(|| format!("Failed to resolve {}", a.display()))?;
    let b = std::fs::canonicalize(b).with_context(|| format!("Failed to resolve {}", b.display()))?;
    Ok(a == b)
}

fn open(path: &Path) -> anyhow::Result<Region> {
    Region::open(path).with_context(|| format!("Failed to open region {}", path.display()))
}

/// Load every chunk so corrupt ones show up in the listing.
fn load_all(region: &mut Region) -> anyhow::Result<()> {
    let coords: Vec<(u8, u8)> = region.chunks().map(|c| (c.x(), c.z())).collect();
    for (x, z) in coords {
        region.load_chunk(x, z)?;
    }
    Ok(())
}

fn info(file: PathBuf, json: bool) -> anyhow::Result<()> {
    let mut region = open(&file)?;
    load_all(&mut region)?;

    let pos = file
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(RegionPos::from_filename);

    let chunks: Vec<ChunkSummary> = region
        .chunks()
        .map(|chunk| {
            let location = region.location(chunk.x(), chunk.z());
            ChunkSummary {
                x: chunk.x(),
                z: chunk.z(),
                world: pos.map(|p| p.local_to_world(chunk.x(), chunk.z())),
                offset: location.offset,
                size: location.size,
                timestamp: region.timestamp(chunk.x(), chunk.z()),
                compression: chunk.is_loaded().then(|| chunk.compression()),
                corrupt: chunk.is_corrupt(),
            }
        })
        .collect();

    if json {
        let summary = RegionSummary {
            path: file,
            chunk_count: region.chunk_count(),
            chunks,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}: {} chunks", file.display(), region.chunk_count());
    for c in &chunks {
        println!(
            "({:2}, {:2}) offset {:>9} size {:>8} ts {:>10} {}",
            c.x,
            c.z,
            c.offset,
            c.size,
            c.timestamp,
            match (c.corrupt, c.compression) {
                (true, _) => "CORRUPT".to_string(),
                (false, Some(comp)) => format!("{:?}", comp),
                (false, None) => "-".to_string(),
            }
        );
    }
    Ok(())
}
