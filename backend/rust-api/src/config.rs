use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub ai_api_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
    pub ai_daily_call_limit: u32,
    pub questions_per_session: u32,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            // Fallback to current directory .env for backward compatibility
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            // Load base config from TOML file
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        // Extract values with fallbacks to ENV or defaults
        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/adaptix".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "adaptix".to_string());

        let ai_api_url = settings
            .get_string("ai.api_url")
            .or_else(|_| env::var("AI_API_URL"))
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());

        let ai_api_key = settings
            .get_string("ai.api_key")
            .or_else(|_| env::var("AI_API_KEY"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: AI_API_KEY must be set in production!");
                }
                eprintln!("WARNING: AI_API_KEY not set; remote generation will fail over to templates");
                String::new()
            });

        let ai_model = settings
            .get_string("ai.model")
            .or_else(|_| env::var("AI_MODEL"))
            .unwrap_or_else(|_| "gemini-2.0-flash-exp".to_string());

        let ai_daily_call_limit = settings
            .get_int("ai.daily_call_limit")
            .ok()
            .or_else(|| {
                env::var("AI_DAILY_CALL_LIMIT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(200) as u32;

        let questions_per_session = settings
            .get_int("assessment.questions_per_session")
            .ok()
            .or_else(|| {
                env::var("QUESTIONS_PER_SESSION")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(5) as u32;

        Ok(Config {
            mongo_uri,
            mongo_database,
            ai_api_url,
            ai_api_key,
            ai_model,
            ai_daily_call_limit,
            questions_per_session,
        })
    }
}
