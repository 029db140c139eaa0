//! Pieces shared by the `aclive` and `talhao` binaries.

use clap::ValueEnum;

use crate::params::OPERATING_RANKS;

/// `--log-level` values, spelled as the tools document them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// clap value parser for `--percentil`: one of [`OPERATING_RANKS`].
pub fn parse_percentile(s: &str) -> Result<u8, String> {
    let p: u8 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a percentile rank"))?;
    if OPERATING_RANKS.contains(&p) {
        Ok(p)
    } else {
        Err(format!("percentile must be one of {OPERATING_RANKS:?}"))
    }
}

/// Install env_logger at `level`, printing `LEVEL message` lines.
pub fn init_logging(level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(level.filter())
        .format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "{} {}", record.level(), record.args())
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_parser_accepts_operating_ranks_only() {
        assert_eq!(parse_percentile("80"), Ok(80));
        assert_eq!(parse_percentile(" 95 "), Ok(95));
        assert!(parse_percentile("50").is_err());
        assert!(parse_percentile("abc").is_err());
    }

    #[test]
    fn log_levels_parse_case_insensitively() {
        assert_eq!(LogLevel::from_str("WARNING", true), Ok(LogLevel::Warning));
        assert_eq!(LogLevel::from_str("debug", true), Ok(LogLevel::Debug));
        assert_eq!(LogLevel::Warning.filter(), log::LevelFilter::Warn);
        assert_eq!(LogLevel::Error.filter(), log::LevelFilter::Error);
    }
}
