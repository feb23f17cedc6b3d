//! Common utilities for the osm2mif converter

pub mod error;

pub use error::{suggest_correction, Error, Result};

#[cfg(test)]
mod tests {
    use crate::error::suggest_correction;

    #[test]
    fn suggest_correction_returns_expected_key() {
        assert_eq!(
            suggest_correction("mif-type", &["iv", "ev", "mif_type", "style"]),
            Some("mif_type".to_string())
        );
    }
}
