//! Utility functions and helpers for configuration

/// Default functions for serde
pub fn default_true() -> bool {
    true
}

pub fn default_false() -> bool {
    false
}

pub fn default_weight() -> f64 {
    1.0
}
