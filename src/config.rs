use dotenv::dotenv;
use std::env;
use uuid::Uuid;

const INSTRUMENT_ID: &str = "INSTRUMENT_ID";
const INSTRUMENT_SYMBOL: &str = "INSTRUMENT_SYMBOL";
const PRICE_PRECISION: &str = "PRICE_PRECISION";
const APP_ID: &str = "APP_ID";

/// Runtime configuration for the demo binary, loaded from the environment.
#[derive(Clone)]
pub struct Config {
    pub instrument_id: Uuid,
    pub instrument_symbol: String,
    pub price_precision: u8,
    pub app_id: String,
}

impl Config {
    pub fn from_env() -> Config {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_from_env() -> Result<Config, String> {
        // Load .env file
        dotenv().ok();

        let instrument_id = env::var(INSTRUMENT_ID)
            .map_err(|_| format!("failed to load environment variable {}", INSTRUMENT_ID))
            .and_then(|raw| {
                Uuid::parse_str(raw.trim())
                    .map_err(|_| format!("failed to parse instrument id: {}", raw))
            })?;

        let instrument_symbol = env::var(INSTRUMENT_SYMBOL)
            .map_err(|_| format!("failed to load environment variable {}", INSTRUMENT_SYMBOL))?;

        let price_precision = env::var(PRICE_PRECISION)
            .map_err(|_| format!("failed to load environment variable {}", PRICE_PRECISION))
            .and_then(|raw| {
                raw.trim()
                    .parse::<u8>()
                    .map_err(|_| format!("failed to parse price precision: {}", raw))
            })?;

        let app_id = env::var(APP_ID).unwrap_or_else(|_| "matching-core".to_string());

        Ok(Config {
            instrument_id,
            instrument_symbol,
            price_precision,
            app_id,
        })
    }

    pub fn default() -> Config {
        Config {
            instrument_id: Uuid::new_v4(),
            instrument_symbol: "BTC-PERP".to_string(),
            price_precision: 2,
            app_id: "matching-core".to_string(),
        }
    }
}
