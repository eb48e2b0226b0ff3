//! CLI enum types.

use clap::ValueEnum;

use crate::remote::ScanMode;

/// Scan mode a session starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ModeArg {
    /// Whole frame, the server finds the grid
    #[default]
    Auto,
    /// One selected region per scan
    Manual,
}

impl From<ModeArg> for ScanMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Auto => ScanMode::Auto,
            ModeArg::Manual => ScanMode::Manual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_arg_conversion() {
        assert_eq!(ScanMode::from(ModeArg::Auto), ScanMode::Auto);
        assert_eq!(ScanMode::from(ModeArg::Manual), ScanMode::Manual);
    }

    #[test]
    fn test_mode_arg_default() {
        assert_eq!(ModeArg::default(), ModeArg::Auto);
    }

    #[test]
    fn test_mode_arg_value_names() {
        let names: Vec<String> = ModeArg::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|p| p.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["auto", "manual"]);
    }
}
