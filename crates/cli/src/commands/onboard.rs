//! `chorus onboard`: First-time setup.

use chorus_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Chorus — First-Time Setup");
    println!("=========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let defaults = AppConfig::default();
    let memory_dir = defaults.memory.resolved_dir();
    if !memory_dir.exists() {
        std::fs::create_dir_all(&memory_dir)?;
        println!("✅ Created memory directory: {}", memory_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Set CHORUS_API_KEY (or api_key in {})", config_path.display());
        println!("   2. Tweak the [[agents]] and [[channels]] to your liking");
        println!("   3. Run: chorus chat\n");
    }

    Ok(())
}
