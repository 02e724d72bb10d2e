use std::path::{Path, PathBuf};

use clap::Args;
use serde::Deserialize;

use escan_client::SubscriptionQuery;

use super::error::ExportError;

pub const DEFAULT_ENDPOINT: &str = "wss://escan-mainnet.euler.finance";
pub const DEFAULT_TOPIC: &str = "accounts";
pub const DEFAULT_SORT_FIELD: &str = "healthScore";
pub const DEFAULT_HEALTH_MAX: u64 = 10_000_000_000_000_000_000;
pub const DEFAULT_LIMIT: u64 = 10_000;
pub const DEFAULT_OUTPUT: &str = "ethereum_euler.json";

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub endpoint: Option<String>,
    pub topic: Option<String>,
    pub sort_field: Option<String>,
    pub health_max: Option<u64>,
    pub limit: Option<u64>,
    pub output: Option<PathBuf>,
    pub echo: Option<bool>,
}

pub fn load_config(path: &str) -> Result<Config, ExportError> {
    let content = std::fs::read_to_string(path).map_err(|e| ExportError::Config {
        context: "read",
        detail: format!("'{path}': {e}"),
    })?;
    toml::from_str(&content).map_err(|e| ExportError::Config {
        context: "parse",
        detail: format!("'{path}': {e}"),
    })
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct ExportArgs {
    /// Путь к конфигу (TOML). Отсутствующий файл = значения по умолчанию
    #[arg(long, default_value = "escan-export.toml", env = "ESCAN_EXPORT_CONFIG")]
    pub config: String,

    /// WebSocket endpoint Eulerscan
    #[arg(long, env = "ESCAN_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Topic подписки
    #[arg(long)]
    pub topic: Option<String>,

    /// Поле сортировки (`by` в запросе)
    #[arg(long)]
    pub sort_field: Option<String>,

    /// Верхняя граница healthScore
    #[arg(long)]
    pub health_max: Option<u64>,

    /// Максимальное число записей в результате
    #[arg(long)]
    pub limit: Option<u64>,

    /// Файл для сохранения результата (перезаписывается)
    #[arg(long, env = "ESCAN_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Дополнительно вывести результат в stdout
    #[arg(long)]
    pub echo: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: defaults < config.toml < env/CLI
#[derive(Debug, Clone, PartialEq)]
pub struct Effective {
    pub endpoint: String,
    pub topic: String,
    pub sort_field: String,
    pub health_max: u64,
    pub limit: u64,
    pub output: PathBuf,
    pub echo: bool,
}

impl Default for Effective {
    fn default() -> Self {
        Self::merge(&ExportArgs::default(), Config::default())
    }
}

impl Effective {
    pub fn new(args: &ExportArgs) -> Result<Self, ExportError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };
        Ok(Self::merge(args, cfg))
    }

    fn merge(args: &ExportArgs, cfg: Config) -> Self {
        Self {
            endpoint: args.endpoint.clone().or(cfg.endpoint).unwrap_or_else(|| DEFAULT_ENDPOINT.into()),
            topic: args.topic.clone().or(cfg.topic).unwrap_or_else(|| DEFAULT_TOPIC.into()),
            sort_field: args.sort_field.clone().or(cfg.sort_field).unwrap_or_else(|| DEFAULT_SORT_FIELD.into()),
            health_max: args.health_max.or(cfg.health_max).unwrap_or(DEFAULT_HEALTH_MAX),
            limit: args.limit.or(cfg.limit).unwrap_or(DEFAULT_LIMIT),
            output: args.output.clone().or(cfg.output).unwrap_or_else(|| DEFAULT_OUTPUT.into()),
            echo: args.echo || cfg.echo.unwrap_or(false),
        }
    }

    pub fn query(&self) -> SubscriptionQuery {
        SubscriptionQuery {
            topic: self.topic.clone(),
            by: self.sort_field.clone(),
            health_max: self.health_max,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn args_with_config(path: &Path) -> ExportArgs {
        ExportArgs {
            config: path.display().to_string(),
            ..ExportArgs::default()
        }
    }

    #[test]
    fn missing_config_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let eff = Effective::new(&args_with_config(&dir.path().join("absent.toml"))).unwrap();

        assert_eq!(eff, Effective::default());
        assert_eq!(eff.endpoint, "wss://escan-mainnet.euler.finance");
        assert_eq!(eff.output, PathBuf::from("ethereum_euler.json"));
        assert_eq!(
            eff.query(),
            SubscriptionQuery {
                topic: "accounts".into(),
                by: "healthScore".into(),
                health_max: 10_000_000_000_000_000_000,
                limit: 10_000,
            }
        );
        assert!(!eff.echo);
    }

    #[test]
    fn cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
endpoint = "ws://127.0.0.1:9000"
topic = "markets"
limit = 50
echo = true
"#
        )
        .unwrap();

        let args = ExportArgs {
            limit: Some(5),
            output: Some("out.json".into()),
            ..args_with_config(file.path())
        };
        let eff = Effective::new(&args).unwrap();

        assert_eq!(eff.endpoint, "ws://127.0.0.1:9000");
        assert_eq!(eff.topic, "markets");
        assert_eq!(eff.sort_field, "healthScore");
        assert_eq!(eff.limit, 5);
        assert_eq!(eff.output, PathBuf::from("out.json"));
        assert!(eff.echo);
    }

    #[test]
    fn broken_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "limit = \"lots\"").unwrap();

        let err = Effective::new(&args_with_config(file.path())).unwrap_err();
        assert!(matches!(err, ExportError::Config { context: "parse", .. }), "{err:?}");
    }

    #[test]
    fn unknown_config_key_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpont = \"ws://typo\"").unwrap();

        assert!(Effective::new(&args_with_config(file.path())).is_err());
    }
}
