use crate::config::{self, AppConfig, DEFAULT_BUCKET, DEFAULT_TABLE, SETTING_API_KEY, SETTING_PLATFORM_URL};
use crate::db::Database;
use crate::models::Settings;
use crate::services::crypto::CryptoService;
use crate::services::hosted::HostedPlatform;
use crate::utils::mask_secret;

/// Stored settings, with the API key masked.
pub fn get_settings(db: &Database) -> Result<Settings, String> {
    let platform_url = db.get_setting(SETTING_PLATFORM_URL).map_err(|e| e.to_string())?;
    let platform_api_key = match db.get_setting(SETTING_API_KEY).map_err(|e| e.to_string())? {
        Some(stored) => match CryptoService::decrypt_api_key(&stored) {
            Ok(key) => Some(mask_secret(&key)),
            Err(err) => {
                tracing::warn!("stored API key unreadable: {}", err);
                Some("<unreadable>".to_string())
            }
        },
        None => None,
    };
    Ok(Settings {
        platform_url,
        platform_api_key,
        bucket: DEFAULT_BUCKET.to_string(),
        table: DEFAULT_TABLE.to_string(),
    })
}

pub fn save_platform_url(db: &Database, url: &str) -> Result<String, String> {
    let url = config::check_platform_url(url).map_err(|e| e.to_string())?;
    db.set_setting(SETTING_PLATFORM_URL, &url).map_err(|e| e.to_string())?;
    Ok(url)
}

pub fn save_api_key(db: &Database, api_key: &str) -> Result<(), String> {
    config::check_api_key(api_key).map_err(|e| e.to_string())?;
    let encrypted = CryptoService::encrypt_api_key(api_key.trim()).map_err(|e| e.to_string())?;
    db.set_setting(SETTING_API_KEY, &encrypted).map_err(|e| e.to_string())?;
    Ok(())
}

pub async fn test_connection(config: &AppConfig) -> Result<bool, String> {
    let platform = HostedPlatform::new(config).map_err(|e| e.to_string())?;
    platform
        .probe()
        .await
        .map_err(|e| format!("Connection failed: {}", e))
}
