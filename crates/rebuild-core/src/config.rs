//! Configuración del controlador.
//!
//! El parseo es una función pura sobre un lookup clave→valor, así se prueba
//! sin tocar el entorno del proceso. La carga de `.env` vive en los binarios.

use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_FILTER_CONFIG_NAME;
use crate::discovery::parse_major;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Imagen de builder disponible para recetas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuilderImage {
    pub name: String,
    pub image: String,
    pub jdk: u32,
}

impl BuilderImage {
    pub fn new(name: impl Into<String>, image: impl Into<String>, jdk: u32) -> Self {
        Self { name: name.into(), image: image.into(), jdk }
    }

    /// `jdk11=quay.io/org/builder:jdk11`; la versión sale de los dígitos del nombre.
    pub fn parse(spec: &str) -> Option<Self> {
        let (name, image) = spec.split_once('=')?;
        let (name, image) = (name.trim(), image.trim());
        let digits: String = name.chars().filter(char::is_ascii_digit).collect();
        let jdk = parse_major(&digits)?;
        if image.is_empty() {
            return None;
        }
        Some(Self::new(name, image, jdk))
    }
}

pub fn default_builder_images() -> Vec<BuilderImage> {
    vec![BuilderImage::new("jdk8", "quay.io/redhat-appstudio/hacbs-jdk8-builder:latest", 8),
         BuilderImage::new("jdk11", "quay.io/redhat-appstudio/hacbs-jdk11-builder:latest", 11),
         BuilderImage::new("jdk17", "quay.io/redhat-appstudio/hacbs-jdk17-builder:latest", 17)]
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Pases de reconciliación concurrentes.
    pub workers: usize,
    /// Presupuesto de reloj de un pase.
    pub pass_timeout: Duration,
    /// Espera antes de re-encolar tras conflicto o error transitorio.
    pub requeue_delay: Duration,
    /// Política: con `false`, New es un no-op.
    pub rebuilds_enabled: bool,
    pub builder_images: Vec<BuilderImage>,
    /// TTL por defecto de requests en estado terminal.
    pub request_ttl: Option<Duration>,
    pub filter_config_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { workers: 4,
               pass_timeout: Duration::from_secs(300),
               requeue_delay: Duration::from_millis(250),
               rebuilds_enabled: true,
               builder_images: default_builder_images(),
               request_ttl: None,
               filter_config_name: DEFAULT_FILTER_CONFIG_NAME.to_string() }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|k| std::env::var(k).ok()) }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup("REBUILD_WORKERS") {
            cfg.workers = parse_num::<usize>("REBUILD_WORKERS", &v)?.max(1);
        }
        if let Some(v) = lookup("REBUILD_PASS_TIMEOUT_SECS") {
            cfg.pass_timeout = Duration::from_secs(parse_num("REBUILD_PASS_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("REBUILD_REQUEUE_MILLIS") {
            cfg.requeue_delay = Duration::from_millis(parse_num("REBUILD_REQUEUE_MILLIS", &v)?);
        }
        if let Some(v) = lookup("REBUILD_ENABLED") {
            cfg.rebuilds_enabled = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::Invalid { key: "REBUILD_ENABLED", value: v }),
            };
        }
        if let Some(v) = lookup("REBUILD_BUILDER_IMAGES") {
            let images: Option<Vec<BuilderImage>> =
                v.split(',').filter(|s| !s.trim().is_empty()).map(BuilderImage::parse).collect();
            cfg.builder_images = match images {
                Some(list) if !list.is_empty() => list,
                _ => return Err(ConfigError::Invalid { key: "REBUILD_BUILDER_IMAGES", value: v }),
            };
        }
        if let Some(v) = lookup("REBUILD_REQUEST_TTL_SECS") {
            cfg.request_ttl = Some(Duration::from_secs(parse_num("REBUILD_REQUEST_TTL_SECS", &v)?));
        }
        if let Some(v) = lookup("REBUILD_FILTER_CONFIG_NAME") {
            if !v.trim().is_empty() {
                cfg.filter_config_name = v.trim().to_string();
            }
        }
        Ok(cfg)
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid { key, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let cfg = ControllerConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(cfg, ControllerConfig::default());
        assert_eq!(cfg.builder_images.len(), 3);
    }

    #[test]
    fn reads_overrides() {
        let cfg = ControllerConfig::from_lookup(lookup(&[("REBUILD_WORKERS", "8"),
                                                         ("REBUILD_ENABLED", "off"),
                                                         ("REBUILD_BUILDER_IMAGES", "jdk21=img:21, jdk8=img:8"),
                                                         ("REBUILD_REQUEST_TTL_SECS", "60")])).expect("config");
        assert_eq!(cfg.workers, 8);
        assert!(!cfg.rebuilds_enabled);
        assert_eq!(cfg.builder_images, vec![BuilderImage::new("jdk21", "img:21", 21), BuilderImage::new("jdk8", "img:8", 8)]);
        assert_eq!(cfg.request_ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn rejects_garbage() {
        let err = ControllerConfig::from_lookup(lookup(&[("REBUILD_WORKERS", "many")])).expect_err("debe fallar");
        assert_eq!(err, ConfigError::Invalid { key: "REBUILD_WORKERS", value: "many".into() });
        assert!(ControllerConfig::from_lookup(lookup(&[("REBUILD_BUILDER_IMAGES", "nodigits=img")])).is_err());
    }
}
