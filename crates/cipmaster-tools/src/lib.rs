use cipmaster_client::{available_config_files, resolve_config_path};
use clap::ValueEnum;
use std::path::PathBuf;

/// Output style shared by the reporting tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Splits a `FIELD=VALUE` argument. The value may itself contain `=`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FIELD=VALUE, got '{raw}'")),
    }
}

/// Renders two-column rows padded to the widest label.
pub fn render_rows<'a>(rows: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let rows: Vec<_> = rows.into_iter().collect();
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(label, value)| format!("{label:<width$}  {value}\n"))
        .collect()
}

/// Config directories searched when a bare file name is given: the working
/// directory first, then `config/`.
pub fn default_config_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("."), PathBuf::from("config")]
}

/// Resolves a config argument: an existing path is used as is, otherwise the
/// name is looked up in `extra_dirs` and then the default directories.
/// Unknown names come back unchanged so validation can report them.
pub fn locate_config(config: &str, extra_dirs: &[PathBuf]) -> PathBuf {
    let direct = PathBuf::from(config);
    if direct.exists() {
        return direct;
    }
    let mut dirs = extra_dirs.to_vec();
    dirs.extend(default_config_dirs());
    let available = available_config_files(&dirs);
    resolve_config_path(config, &available).unwrap_or(direct)
}
