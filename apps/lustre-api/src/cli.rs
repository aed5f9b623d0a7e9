use anyhow::Result;
use sqlx::SqlitePool;

use crate::settings::SettingsService;

/// Dump the runtime settings table.
pub async fn show_settings(pool: &SqlitePool) -> Result<()> {
    let settings = SettingsService::new(pool.clone()).await?;
    let all = settings.all().await;

    if all.is_empty() {
        println!("No settings configured.");
        return Ok(());
    }

    let mut keys: Vec<_> = all.keys().collect();
    keys.sort();
    for key in keys {
        let value = &all[key];
        // Credentials stay out of terminal history.
        if key.contains("password") || key.contains("secret") {
            println!("{} = ********", key);
        } else {
            println!("{} = {}", key, value);
        }
    }
    Ok(())
}

/// Write one runtime setting.
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    let settings = SettingsService::new(pool.clone()).await?;
    settings.set(key, value).await?;
    println!("Setting '{}' updated.", key);
    Ok(())
}
