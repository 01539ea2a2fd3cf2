//! BSD `sysexits(3)` exit codes used by the command-line tools.

/// The command was used incorrectly: wrong number of arguments, a bad
/// flag, bad syntax in a parameter.
pub const USAGE: i32 = 64;

/// The input data was incorrect in some way, e.g. an unparseable regular
/// expression. Only for user data, not system files.
pub const DATA_ERR: i32 = 65;

/// An input file did not exist or was not readable.
pub const NO_INPUT: i32 = 66;

/// A service is unavailable; here, the backing store cannot be reached.
pub const UNAVAILABLE: i32 = 69;

/// An internal software error has been detected.
pub const SOFTWARE: i32 = 70;

/// An error occurred while doing I/O on some file.
pub const IO_ERR: i32 = 74;

/// Something was found in an unconfigured or misconfigured state.
pub const CONFIG: i32 = 78;

/// Map an error chain onto an exit code.
pub fn code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<crate::config::FormatError>().is_some() {
            return CONFIG;
        }
        if cause.downcast_ref::<regex_syntax::Error>().is_some() {
            return DATA_ERR;
        }
        if cause.downcast_ref::<crate::store::ApiError>().is_some() {
            return UNAVAILABLE;
        }
        if cause.downcast_ref::<reqwest::Error>().is_some() {
            return UNAVAILABLE;
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::NotFound => NO_INPUT,
                _ => IO_ERR,
            };
        }
    }
    SOFTWARE
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn missing_input_maps_to_no_input() {
        let err = anyhow::Error::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        assert_eq!(code_for(&err), NO_INPUT);
    }

    #[test]
    fn config_errors_map_through_context() {
        let err = anyhow::Error::from(crate::config::parse("[broken").unwrap_err())
            .context("loading configuration");
        assert_eq!(code_for(&err), CONFIG);
    }

    #[test]
    fn bad_pattern_maps_to_data_err() {
        let err = anyhow::Error::from(crate::query::plan("(oops").unwrap_err());
        assert_eq!(code_for(&err), DATA_ERR);
    }

    #[test]
    fn unknown_errors_are_software() {
        assert_eq!(code_for(&anyhow!("something odd")), SOFTWARE);
    }
}
