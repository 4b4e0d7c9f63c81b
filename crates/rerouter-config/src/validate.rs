use crate::config::Config;
use anyhow::{bail, Result};
use url::Url;

pub fn validate_config(config: &Config) -> Result<()> {
    if config.b_base_url.trim().is_empty() {
        bail!("B_BASE_URL is required (env or config file)");
    }
    match Url::parse(&config.b_base_url) {
        Ok(u) if u.host_str().is_some() => {}
        Ok(_) => bail!("Invalid B_BASE_URL '{}': missing host", config.b_base_url),
        Err(e) => bail!("Invalid B_BASE_URL '{}': {}", config.b_base_url, e),
    }

    if let Some(a) = config.a_base_url.as_deref().filter(|a| !a.is_empty()) {
        if let Err(e) = Url::parse(a) {
            bail!("Invalid A_BASE_URL '{}': {}", a, e);
        }
    }

    if !(300..400).contains(&config.redirect_status) {
        bail!(
            "Invalid config field 'redirect_status': {} (must be a 3xx status)",
            config.redirect_status
        );
    }

    if config.prefetch.workers == 0 {
        bail!("Invalid config field 'prefetch.workers': must be at least 1");
    }
    if config.prefetch.queue_capacity == 0 {
        bail!("Invalid config field 'prefetch.queue_capacity': must be at least 1");
    }

    for (i, rule) in config.cache.ttl_rules.iter().enumerate() {
        if rule.pattern.trim().is_empty() {
            bail!("TTL rule #{} has empty pattern", i + 1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TtlRule;

    fn valid() -> Config {
        Config {
            b_base_url: "https://b.example".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_missing_upstream() {
        let err = validate_config(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("B_BASE_URL is required"));
    }

    #[test]
    fn test_relative_upstream_rejected() {
        let mut config = valid();
        config.b_base_url = "/just/a/path".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_redirect_status_bounds() {
        let mut config = valid();
        config.redirect_status = 200;
        assert!(validate_config(&config).is_err());

        config.redirect_status = 307;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_ttl_pattern() {
        let mut config = valid();
        config.cache.ttl_rules.push(TtlRule {
            pattern: "  ".to_string(),
            ttl_seconds: 10,
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("TTL rule #1"));
    }

    #[test]
    fn test_zero_workers() {
        let mut config = valid();
        config.prefetch.workers = 0;
        assert!(validate_config(&config).is_err());
    }
}
