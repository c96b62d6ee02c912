// Build script for the live quiz client
// Copies the sample config file to the output directory after build

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Tell Cargo to rerun this script if the config file changes
    println!("cargo:rerun-if-changed=live_quiz.toml");

    let out_dir = env::var("OUT_DIR").unwrap();

    // OUT_DIR = target/<profile>/build/<crate>-<hash>/out
    let out_path = Path::new(&out_dir);
    let target_dir = out_path
        .ancestors()
        .nth(3)
        .expect("Could not find target directory");

    let config_src = Path::new("live_quiz.toml");
    let config_dst = target_dir.join("live_quiz.toml");

    if config_src.exists() {
        fs::copy(config_src, &config_dst).expect("Failed to copy config file");
        println!(
            "cargo:warning=Copied config file to {}",
            config_dst.display()
        );
    }
}
