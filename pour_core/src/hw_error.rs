//! Maps `Box<dyn Error>` from the `Bus` boundary to typed `PourError`.
//!
//! `pour_traits::Bus` returns boxed errors so any transport can plug in;
//! this module converts those to our typed error enum, with an optional
//! feature-gated path for `pour_hardware::HwError` downcasting.

use crate::error::PourError;

/// Map a trait-boundary error to a typed `PourError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> PourError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<pour_hardware::error::HwError>() {
            return match hw {
                pour_hardware::error::HwError::Timeout => PourError::Timeout,
                other => PourError::Transport(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        PourError::Timeout
    } else {
        PourError::Transport(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain(&'static str);
    impl std::fmt::Display for Plain {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }
    impl std::error::Error for Plain {}

    #[test]
    fn string_fallback() {
        assert_eq!(map_hw_error(&Plain("read timeout")), PourError::Timeout);
        assert_eq!(
            map_hw_error(&Plain("nack")),
            PourError::Transport("nack".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hardware_errors() {
        use pour_hardware::error::HwError;
        assert_eq!(map_hw_error(&HwError::Timeout), PourError::Timeout);
        assert_eq!(
            map_hw_error(&HwError::Nack { address: 0x26 }),
            PourError::Transport("no acknowledge from device 0x26".into())
        );
    }
}
