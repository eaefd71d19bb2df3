use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Config {
    pub listen: String,
    /// Empty string → in-memory store (dev/test); otherwise a Redis URL
    #[serde(default)]
    pub redis_url: String,
}

impl Config {
    pub fn load() -> Self {
        let mut cfg = Self {
            listen: "0.0.0.0:8080".to_string(),
            redis_url: String::new(),
        };

        if let Ok(l) = std::env::var("NIMBUS_LISTEN") {
            cfg.listen = l;
        }
        if let Ok(r) = std::env::var("NIMBUS_REDIS_URL") {
            cfg.redis_url = r;
        } else if let Ok(r) = std::env::var("REDIS_URL") {
            // container/legacy alias
            cfg.redis_url = r;
        }

        // File overlay, if present
        if let Ok(txt) = std::fs::read_to_string("nimbus_config.json") {
            match serde_json::from_str::<Config>(&txt) {
                Ok(file_cfg) => {
                    println!("✅ Loaded config from nimbus_config.json");
                    cfg = file_cfg;
                }
                Err(e) => {
                    eprintln!("⚠️ Failed to parse nimbus_config.json: {}", e);
                }
            }
        }

        if cfg.listen.is_empty() {
            cfg.listen = "0.0.0.0:8080".to_string();
        }
        if cfg.redis_url.is_empty() {
            eprintln!("⚠️  NIMBUS_REDIS_URL not set — using in-memory store (data lost on restart)");
        }
        if crate::auth::admin_token().is_none() {
            eprintln!("⚠️  NIMBUS_ADMIN_TOKEN not set — admin endpoints are OPEN (dev only)");
        }

        cfg
    }
}
