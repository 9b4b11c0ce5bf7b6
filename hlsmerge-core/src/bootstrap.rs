//! Startup helpers: configuration loading and engine construction

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::engine::AggregationEngine;
use crate::error::{Error, Result};
use crate::fetch::{HttpFetcher, PlaylistFetcher};

/// Load configuration from a config file or environment variables
///
/// Config file search order:
/// 1. `explicit` (command line / `HLSMERGE_CONFIG_PATH`)
/// 2. ./config.yaml (current working directory)
/// 3. Fall back to environment variables only
///
/// Runs before logging is initialised, so progress goes to stderr.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    let config_path = explicit
        .map(ToString::to_string)
        .or_else(|| {
            let cwd = "config.yaml";
            std::path::Path::new(cwd)
                .exists()
                .then(|| cwd.to_string())
        });

    let config = if let Some(path) = config_path {
        if !std::path::Path::new(&path).exists() {
            return Err(Error::InvalidConfig(format!("config file {path} not found")));
        }
        eprintln!("Loading config from {path}");
        Config::from_file(&path)?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env()?
    };

    if let Err(errors) = config.validate() {
        return Err(Error::InvalidConfig(format!(
            "{} error(s): {}",
            errors.len(),
            errors.join("; ")
        )));
    }

    Ok(config)
}

/// Build one engine per configured stream, all sharing `fetcher`.
pub fn build_engines(
    config: &Config,
    fetcher: &Arc<dyn PlaylistFetcher>,
) -> Vec<Arc<AggregationEngine>> {
    config
        .streams
        .iter()
        .map(|stream| {
            info!(
                stream = %stream.name,
                origins = stream.origins.len(),
                poll_interval_ms = stream.poll_interval_ms,
                "Configured stream"
            );
            Arc::new(
                AggregationEngine::new(stream, Arc::clone(fetcher))
                    .with_fetch_timeout(config.fetch.timeout()),
            )
        })
        .collect()
}

/// Shared HTTP fetcher for every origin of every stream.
pub fn build_fetcher(config: &Config) -> Result<HttpFetcher> {
    Ok(HttpFetcher::new(&config.fetch)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use std::io::Write;

    #[test]
    fn test_load_config_missing_explicit_file() {
        let err = load_config(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "streams:\n  - name: live\n    origins: []\n").unwrap();

        let err = load_config(Some(file.path().to_str().unwrap())).unwrap_err();
        let Error::InvalidConfig(msg) = err else {
            panic!("expected InvalidConfig");
        };
        assert!(msg.contains("at least one origin"));
    }

    #[test]
    fn test_build_engines_one_per_stream() {
        let config = Config {
            streams: vec![
                StreamConfig::new("news", vec!["http://a.example.com/news.m3u8".to_string()]),
                StreamConfig::new("sport", vec!["http://a.example.com/sport.m3u8".to_string()]),
            ],
            ..Config::default()
        };

        let fetcher: Arc<dyn PlaylistFetcher> = Arc::new(build_fetcher(&config).unwrap());
        let engines = build_engines(&config, &fetcher);
        let names: Vec<&str> = engines.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["news", "sport"]);
        assert_eq!(engines[0].origins().len(), 1);
    }
}
