use chorus_core::agent::{AgentProfile, AgentRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";
const REQUIRED_VARS: [&str; 3] = ["ELEVENLABS_API_KEY", "AGENT1_VOICE_ID", "AGENT2_VOICE_ID"];

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub environment: String,
    pub api_key: String,
    pub agents: AgentRegistry,
    pub provider_url: String,
    pub cors_origin: String,
    pub static_dir: PathBuf,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Every missing required variable is reported at once so a misconfigured
    /// deployment fails on the first start instead of one variable at a time.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|var| non_empty_var(var).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVar(missing.join(", ")));
        }
        let api_key = required_var("ELEVENLABS_API_KEY")?;

        let bind_address = match non_empty_var("BIND_ADDRESS") {
            Some(addr) => addr
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?,
            None => {
                let port = parse_var::<u16>("PORT", 9000)?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let mut agents = AgentRegistry::new();
        for (agent_id, prefix) in [("agent1", "AGENT1"), ("agent2", "AGENT2")] {
            let voice_id = required_var(&format!("{prefix}_VOICE_ID"))?;
            let model_id = non_empty_var(&format!("{prefix}_MODEL_ID"))
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
            agents.insert(agent_id, AgentProfile::new(voice_id, model_id));
        }
        if let Some(path) = non_empty_var("AGENTS_FILE") {
            agents.merge(load_agents_file(&path)?);
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            environment: non_empty_var("APP_ENV").unwrap_or_else(|| "development".to_string()),
            api_key,
            agents,
            provider_url: non_empty_var("PROVIDER_WS_URL")
                .unwrap_or_else(|| "wss://api.elevenlabs.io".to_string()),
            cors_origin: non_empty_var("CORS_ORIGIN").unwrap_or_else(|| "*".to_string()),
            static_dir: non_empty_var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./public")),
            connect_timeout: Duration::from_secs(parse_var("PROVIDER_CONNECT_TIMEOUT_SECS", 10)?),
            idle_timeout: Duration::from_secs(parse_var("CHANNEL_IDLE_TIMEOUT_SECS", 30)?),
            log_level,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    non_empty_var(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn load_agents_file(path: &str) -> Result<AgentRegistry, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue("AGENTS_FILE".to_string(), msg);
    let content = std::fs::read_to_string(path).map_err(|e| invalid(format!("{path}: {e}")))?;
    serde_json::from_str(&content).map_err(|e| invalid(format!("{path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: [&str; 15] = [
        "ELEVENLABS_API_KEY",
        "AGENT1_VOICE_ID",
        "AGENT2_VOICE_ID",
        "AGENT1_MODEL_ID",
        "AGENT2_MODEL_ID",
        "AGENTS_FILE",
        "PORT",
        "BIND_ADDRESS",
        "CORS_ORIGIN",
        "STATIC_DIR",
        "PROVIDER_WS_URL",
        "PROVIDER_CONNECT_TIMEOUT_SECS",
        "CHANNEL_IDLE_TIMEOUT_SECS",
        "APP_ENV",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in ALL_VARS {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("ELEVENLABS_API_KEY", "test-key");
            env::set_var("AGENT1_VOICE_ID", "voice-one");
            env::set_var("AGENT2_VOICE_ID", "voice-two");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing required environment variables: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:9000");
        assert_eq!(config.environment, "development");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.agents.len(), 2);
        let agent1 = config.agents.get("agent1").unwrap();
        assert_eq!(agent1.voice_id, "voice-one");
        assert_eq!(agent1.model_id, "eleven_monolingual_v1");
        assert_eq!(agent1.settings.stability, 0.5);
        assert_eq!(agent1.settings.similarity_boost, 0.8);
        assert_eq!(config.agents.get("agent2").unwrap().voice_id, "voice-two");
        assert_eq!(config.provider_url, "wss://api.elevenlabs.io");
        assert_eq!(config.cors_origin, "*");
        assert_eq!(config.static_dir, PathBuf::from("./public"));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("PORT", "8080");
            env::set_var("AGENT2_MODEL_ID", "eleven_turbo_v2");
            env::set_var("CORS_ORIGIN", "https://chorus.example");
            env::set_var("STATIC_DIR", "/srv/chorus");
            env::set_var("PROVIDER_WS_URL", "ws://127.0.0.1:7000");
            env::set_var("PROVIDER_CONNECT_TIMEOUT_SECS", "3");
            env::set_var("CHANNEL_IDLE_TIMEOUT_SECS", "60");
            env::set_var("APP_ENV", "production");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8080");
        assert_eq!(config.agents.get("agent2").unwrap().model_id, "eleven_turbo_v2");
        assert_eq!(config.cors_origin, "https://chorus.example");
        assert_eq!(config.static_dir, PathBuf::from("/srv/chorus"));
        assert_eq!(config.provider_url, "ws://127.0.0.1:7000");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.environment, "production");
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_bind_address_overrides_port() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("PORT", "8080");
            env::set_var("BIND_ADDRESS", "127.0.0.1:9100");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9100");
    }

    #[test]
    #[serial]
    fn test_missing_vars_are_reported_together() {
        clear_env_vars();
        unsafe {
            env::set_var("AGENT1_VOICE_ID", "voice-one");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert_eq!(msg, "ELEVENLABS_API_KEY, AGENT2_VOICE_ID");
            }
            _ => panic!("Expected MissingVar"),
        }
    }

    #[test]
    #[serial]
    fn test_blank_required_var_counts_as_missing() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("ELEVENLABS_API_KEY", "   ");
        }

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingVar(msg)) if msg == "ELEVENLABS_API_KEY"
        ));
    }

    #[test]
    #[serial]
    fn test_config_invalid_port_and_timeouts() {
        for (var, value) in [
            ("PORT", "not-a-port"),
            ("BIND_ADDRESS", "nowhere"),
            ("PROVIDER_CONNECT_TIMEOUT_SECS", "-1"),
            ("CHANNEL_IDLE_TIMEOUT_SECS", "soon"),
            ("RUST_LOG", "not-a-level"),
        ] {
            clear_env_vars();
            set_minimal_env();
            unsafe {
                env::set_var(var, value);
            }

            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                other => panic!("Expected InvalidValue for {var}, got {other:?}"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_agents_file_extends_registry() {
        clear_env_vars();
        set_minimal_env();
        let path = env::temp_dir().join(format!("chorus-agents-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "agent2": { "voiceId": "voice-override", "modelId": "eleven_turbo_v2" },
                "narrator": {
                    "voiceId": "voice-n",
                    "modelId": "eleven_monolingual_v1",
                    "settings": { "stability": 0.2, "similarityBoost": 0.6 }
                }
            }"#,
        )
        .unwrap();
        unsafe {
            env::set_var("AGENTS_FILE", &path);
        }

        let config = Config::from_env().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.agents.len(), 3);
        assert_eq!(config.agents.get("agent1").unwrap().voice_id, "voice-one");
        assert_eq!(config.agents.get("agent2").unwrap().voice_id, "voice-override");
        assert_eq!(config.agents.get("narrator").unwrap().settings.stability, 0.2);
    }

    #[test]
    #[serial]
    fn test_unreadable_agents_file_is_rejected() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("AGENTS_FILE", "/definitely/not/here.json");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(name, msg) => {
                assert_eq!(name, "AGENTS_FILE");
                assert!(msg.contains("/definitely/not/here.json"));
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }
}
