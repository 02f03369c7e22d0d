//! Generate FUNCTIONS.md from the function registry.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin gen-functions
//! cargo run --bin gen-functions -- docs/FUNCTIONS.md
//! ```
//!
//! Without an argument the file is written to `takeoff_core/FUNCTIONS.md`.

use std::fs;
use std::path::PathBuf;

use takeoff_core::functions::generate_functions_markdown;

fn main() {
    let output_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("takeoff_core/FUNCTIONS.md"));

    let markdown = generate_functions_markdown();

    match fs::write(&output_path, &markdown) {
        Ok(()) => println!("Wrote {} bytes to {}", markdown.len(), output_path.display()),
        Err(e) => {
            eprintln!("Error writing {}: {}", output_path.display(), e);
            std::process::exit(1);
        }
    }
}
