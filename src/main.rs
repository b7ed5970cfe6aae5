// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use std::path::PathBuf;

use adffs::dir::Entry;
use adffs::fuse::{self, MountOptions};
use adffs::image::DiskImage;
use adffs::volume::{DiskType, Volume, VolumeInfo};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "adffs",
    version = env!("CARGO_PKG_VERSION"),
    author = "Volker Schwaberow <volker@schwaberow.de>",
    about = "Mount and inspect Amiga ADF disk images"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount an ADF image as a filesystem
    Mount {
        image: PathBuf,
        mountpoint: PathBuf,
        #[arg(short, long, action = ArgAction::SetTrue)]
        read_only: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        allow_other: bool,
    },
    /// Show volume information
    Info {
        image: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List a directory of the image
    List {
        image: PathBuf,
        #[arg(short, long, default_value = "/")]
        path: String,
    },
    /// Write a fresh filesystem onto an image, creating it if missing
    Format {
        image: PathBuf,
        #[arg(short, long, default_value = "FFS")]
        disk_type: String,
        #[arg(short, long, default_value = "Untitled")]
        name: String,
    },
}

fn format_date(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Invalid date".to_string())
}

fn print_volume_info(info: &VolumeInfo, path: &str) {
    println!("ADF Information for: {}", path);
    println!("------------------------");
    println!("Filesystem:      {}", info.filesystem);
    println!("Volume Name:     {}", info.volume_name);
    println!("Modified:        {}", format_date(info.modified));
    println!("Disk Size:       {} bytes", info.disk_size);
    println!("Geometry:");
    println!("  Heads:         {}", info.heads);
    println!("  Cylinders:     {}", info.cylinders);
    println!("  Sectors/Track: {}", info.sectors_per_track);
    println!("Hash Table Size: {}", info.hash_table_size);
    println!(
        "Blocks:          {} total, {} free, {} used",
        info.total_blocks, info.free_blocks, info.used_blocks
    );
    if info.read_only {
        println!("Access:          read-only");
    }
}

fn print_directory_listing(path: &str, entries: &[Entry]) {
    println!("Directory listing for {}", path);
    println!(
        "{:<30} {:>8}   {:<5}   {}",
        "Name", "Size", "Type", "Modified"
    );
    println!("{:-<70}", "");
    for entry in entries {
        let kind = if entry.is_dir { "dir" } else { "file" };
        println!(
            "{:<30} {:>8}   {:<5}   {}",
            entry.name,
            entry.size,
            kind,
            format_date(entry.mtime)
        );
    }
    println!("\nTotal entries: {}", entries.len());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mount {
            image,
            mountpoint,
            read_only,
            allow_other,
        } => {
            let disk = if read_only {
                DiskImage::open_read_only(&image)?
            } else {
                DiskImage::open(&image)?
            };
            let volume = Volume::mount(disk)?;
            println!(
                "Mounted ADF volume: {} ({}) [{}]",
                volume.name(),
                if volume.is_ffs() { "FFS" } else { "OFS" },
                if read_only || volume.is_read_only() {
                    "READ-ONLY"
                } else {
                    "READ-WRITE"
                }
            );
            let options = MountOptions {
                read_only,
                allow_other,
                ..MountOptions::default()
            };
            fuse::mount(volume, &mountpoint, &options)?;
        }
        Commands::Info { image, json } => {
            let volume = Volume::open(&image)?;
            let info = volume.info()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_volume_info(&info, &image.display().to_string());
            }
        }
        Commands::List { image, path } => {
            let mut volume = Volume::open(&image)?;
            let entries = volume.readdir(&path)?;
            print_directory_listing(&path, &entries);
        }
        Commands::Format {
            image,
            disk_type,
            name,
        } => {
            let disk_type = match disk_type.to_uppercase().as_str() {
                "OFS" => DiskType::OFS,
                "FFS" => DiskType::FFS,
                _ => return Err("Invalid disk type provided".into()),
            };
            let disk = if image.exists() {
                DiskImage::open(&image)?
            } else {
                DiskImage::create(&image)?
            };
            let mut volume = Volume::format(disk, disk_type, &name)?;
            volume.flush()?;
            println!(
                "Formatted ADF image: {} (Type: {:?}, Name: {})",
                image.display(),
                disk_type,
                name
            );
        }
    }

    Ok(())
}
