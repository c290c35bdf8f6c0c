//! 配置单元测试

use super::*;

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.eval_cache.capacity, 64);
        assert!(config.eval_cache.clear_on_full_collection);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.gc, GCConfig::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [eval_cache]
            capacity = 8

            [gc]
            collection_threshold = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.eval_cache.capacity, 8);
        assert!(config.eval_cache.clear_on_full_collection);
        assert_eq!(config.gc.collection_threshold, 32);
        assert_eq!(config.gc.max_pause_ms, 10);
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let err = RuntimeConfig::from_toml_str("[log]\nlevel = \"loud\"").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "log.level",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = RuntimeConfig::from_toml_str("[eval_cache\ncapacity = 1").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [(CAPACITY_ENV, " 3 "), (LOG_ENV, "DEBUG")].into();
        let mut config = RuntimeConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.eval_cache.capacity, 3);
        assert_eq!(config.log.level().unwrap(), LogLevel::Debug);
    }

    #[test]
    fn test_bad_capacity_override() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_overrides(|key| (key == CAPACITY_ENV).then(|| "lots".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid value \"lots\" for EVALCACHE_CAPACITY");
        assert_eq!(config.eval_cache.capacity, 64);
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RuntimeConfig::default();
        config.eval_cache.capacity = 5;
        config.log.level = "warn".to_string();
        save_config(&config, &path).unwrap();

        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "eval_cache = 3").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
