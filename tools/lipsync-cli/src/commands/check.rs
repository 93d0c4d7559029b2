//! Check the recognizer executable.

use std::path::PathBuf;

use lipsync_capture_engine::{ensure_executable, ExecutableInfo};
use lipsync_common::config::AppConfig;

pub fn run(config: &AppConfig, executable: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Lipsync Recognizer Check");
    println!("{}", "=".repeat(50));

    let path = super::executable_path(config, executable);
    if let Err(e) = ensure_executable(&path) {
        println!("[FAIL] {e}");
        println!();
        println!("Set executable.path in {}", lipsync_common::config::config_file_path().display());
        anyhow::bail!("recognizer executable is not usable");
    }
    println!("[OK] Executable: {}", path.display());

    let mut info = ExecutableInfo::new(&path);
    match info.ensure_version() {
        Ok("") => println!("[WARN] Version: not reported"),
        Ok(version) => println!("[OK] Version: {version}"),
        Err(e) => println!("[WARN] Version: {e}"),
    }

    let exec = &config.executable;
    println!("     Recognizer: {}", exec.recognizer.cli_name());
    println!(
        "     Extended shapes: {}",
        if exec.extended_shapes.is_empty() {
            "(none)"
        } else {
            exec.extended_shapes.as_str()
        }
    );
    println!("     Frame rate: {} fps", config.frame.rate());

    println!();
    println!("Recognizer is ready.");
    Ok(())
}
