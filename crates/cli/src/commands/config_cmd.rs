//! `statecraft config` — Show the effective configuration.

use statecraft_config::AppConfig;

pub fn show(config: &AppConfig) {
    println!("# environment: {}", config.environment);
    println!(
        "# file: {}",
        AppConfig::config_dir().join("config.toml").display()
    );
    if !config.has_api_key() {
        println!("# warning: no API key set (STATECRAFT_API_KEY or OPENAI_API_KEY)");
    }
    println!();
    print!("{}", config.to_redacted_toml());
}
