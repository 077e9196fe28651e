//! Command-line interface for clockin.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clockin - live QR attendance check-in service
#[derive(Parser)]
#[command(name = "clockin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the search path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server until Ctrl-C
    #[command(alias = "daemon", alias = "-d")]
    Serve,

    /// Create a default config file with a fresh HMAC key
    #[command(alias = "--init")]
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Manage company QR codes
    Qr {
        #[command(subcommand)]
        command: QrCommands,
    },
}

#[derive(Subcommand)]
pub enum QrCommands {
    /// Make sure the company has a valid QR code
    Ensure {
        /// Company ID
        company: i32,
        /// Validity in minutes (defaults to the short-lived validity)
        #[arg(long)]
        minutes: Option<i64>,
        /// Replace the active QR code even if it is still valid
        #[arg(long)]
        force: bool,
    },

    /// List QR codes issued for a company
    #[command(alias = "ls")]
    List {
        /// Company ID
        company: i32,
    },

    /// Render the live token of a QR code as PNG
    Render {
        /// QR code ID
        id: i32,
        /// Output file
        #[arg(long, short, default_value = "qr.png")]
        out: PathBuf,
        /// Scan endpoint to embed, e.g. https://host/scan
        #[arg(long)]
        base_url: Option<String>,
        /// Pixels per QR module
        #[arg(long)]
        pixels_per_module: Option<u32>,
    },

    /// Deactivate a company QR code
    Deactivate {
        /// Company ID
        company: i32,
        /// QR code ID
        id: i32,
    },
}
