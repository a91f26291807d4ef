//! Validate a project document.

use std::path::PathBuf;

use rendermode_project_model::{validate_project, Complexity};

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating project at: {}", path.display());

    let project = super::load_project(&path)?;

    println!("  Id: {}", project.id);
    println!("  Version: {}", project.version);
    println!(
        "  Output: {}x{} @ {} fps ({})",
        project.settings.width,
        project.settings.height,
        project.settings.fps,
        project.settings.format.as_str()
    );
    println!("  Tracks: {}", project.tracks.len());
    println!("  Clips: {}", project.clips().count());
    println!("  Duration: {:.2}s", project.duration_secs());

    match validate_project(&project) {
        Ok(()) => {
            let complexity = Complexity::of(&project, &project.settings);
            println!("  Complexity: {:.2}", complexity.score);
            println!("\nProject is valid.");
            Ok(())
        }
        Err(e) => {
            println!("\nValidation issues:");
            for issue in &e.issues {
                println!("  - {}: {}", issue.path, issue.message);
            }
            anyhow::bail!("{} issue(s) found", e.issues.len())
        }
    }
}
