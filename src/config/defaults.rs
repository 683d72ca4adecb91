//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [store] Section Defaults
// ============================================================================

pub mod store {
    use std::path::PathBuf;

    pub fn root() -> PathBuf {
        "lake".into()
    }

    pub fn ignore_prefixes() -> Vec<String> {
        vec![".".into()]
    }

    pub fn extension() -> String {
        "csv".into()
    }
}

// ============================================================================
// [format] Section Defaults
// ============================================================================

pub mod format {
    pub fn separator() -> char {
        ','
    }

    pub fn decimal() -> char {
        '.'
    }

    pub fn datetime() -> String {
        strata_table::codec::DATETIME_FORMAT.into()
    }
}

// ============================================================================
// [merge] Section Defaults
// ============================================================================

pub mod merge {
    use super::super::MergeMode;

    pub fn mode() -> MergeMode {
        MergeMode::default()
    }

    pub fn threshold() -> String {
        "50MB".into()
    }

    pub fn float_threshold() -> f64 {
        0.9
    }
}

// ============================================================================
// [reports.<name>] Section Defaults
// ============================================================================

pub mod report {
    use super::super::{Layout, SourceKind};

    pub fn resolution() -> String {
        "1h".into()
    }

    pub fn period() -> String {
        "1D".into()
    }

    pub fn timezone() -> String {
        "UTC".into()
    }

    pub fn potential_min() -> String {
        "2020-01-01".into()
    }

    pub fn layout() -> Layout {
        Layout::Report
    }

    pub fn source() -> SourceKind {
        SourceKind::Store
    }

    pub mod eligibility {
        pub fn extension() -> String {
            "csv".into()
        }
    }
}
